use anyhow::Result;
use chrono::NaiveDate;
use tracing::warn;

use crate::{
    config::Config,
    core::{aggregate::summarize_day, session::reconstruct_day},
    daemon::storage::{
        entities::ActivityEvent,
        event_store::{DayFileHandle, EventStore},
        summary_store::SummaryStore,
    },
    utils::{clock::Clock, time::local_date},
};

use super::module::EventProcessor;

/// Bridges [ProcessingModule](super::ProcessingModule) and [EventStore].
/// Keeps the append handle for the day currently being written; when an
/// event belongs to a new day the finished day is flushed, reconstructed and
/// its summary upserted into the cache.
pub struct EventWriter<S: EventStore> {
    store: S,
    current: Option<S::DayFile>,
    summaries: SummaryStore,
    config: Config,
    time_provider: Box<dyn Clock>,
}

impl<S: EventStore> EventWriter<S> {
    pub fn new(
        store: S,
        summaries: SummaryStore,
        config: Config,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            store,
            current: None,
            summaries,
            config,
            time_provider,
        }
    }

    async fn rotate_to(&mut self, date: NaiveDate) -> Result<()> {
        match self.current.as_ref() {
            Some(file) if file.date() == date => return Ok(()),
            _ => {}
        }

        if let Some(mut finished) = self.current.take() {
            finished.flush().await?;
            // A summary failure must not stall event writing.
            if let Err(e) = self.write_summary(finished.date()).await {
                warn!("Failed to cache summary for {}: {e:?}", finished.date());
            }
        }

        self.current = Some(self.store.open_day(date).await?);
        Ok(())
    }

    async fn write_summary(&self, date: NaiveDate) -> Result<()> {
        let events = self.store.events_for(date).await?;
        let day = reconstruct_day(date, &events, &self.config, self.time_provider.time());
        self.summaries
            .upsert(summarize_day(&day, self.config.goal_seconds()))
            .await
    }
}

impl<S: EventStore> EventProcessor for EventWriter<S> {
    async fn process_next(&mut self, event: ActivityEvent) -> Result<()> {
        self.rotate_to(local_date(event.timestamp)).await?;

        let file = self
            .current
            .as_mut()
            .expect("rotate_to always leaves an open handle");
        file.append(vec![event]).await?;

        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(file) = self.current.as_mut() {
            file.flush().await?;
            let date = file.date();
            if let Err(e) = self.write_summary(date).await {
                warn!("Failed to cache summary for {date}: {e:?}");
            }
        }
        Ok(())
    }
}

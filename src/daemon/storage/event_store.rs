use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use futures::{stream, Stream, StreamExt};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, error, warn};

use crate::utils::time::date_to_record_name;

use super::entities::ActivityEvent;

/// Interface for abstracting storage of the event log. Events are written
/// into one file per local day so a day query reads exactly one file.
pub trait EventStore {
    type DayFile: DayFileHandle;

    /// Opens or creates the append handle for a day's event file.
    fn open_day(&self, date: NaiveDate) -> impl Future<Output = Result<Self::DayFile>>;

    /// Ordered events recorded for a day. A day with no file is an empty,
    /// valid day, not an error.
    fn events_for(&self, date: NaiveDate)
    -> impl Future<Output = Result<Vec<ActivityEvent>>> + Send;
}

impl<T: Deref> EventStore for T
where
    T::Target: EventStore,
{
    type DayFile = <T::Target as EventStore>::DayFile;

    fn open_day(&self, date: NaiveDate) -> impl Future<Output = Result<Self::DayFile>> {
        self.deref().open_day(date)
    }

    fn events_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<ActivityEvent>>> + Send {
        self.deref().events_for(date)
    }
}

pub trait DayFileHandle {
    fn append(&mut self, events: Vec<ActivityEvent>) -> impl Future<Output = Result<()>>;
    fn date(&self) -> NaiveDate;
    fn flush(&mut self) -> impl Future<Output = Result<()>>;
}

/// The main realization of [EventStore], one JSON-lines file per day under
/// the application's `events` directory.
pub struct FsEventStore {
    event_dir: PathBuf,
}

impl FsEventStore {
    pub fn new(event_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&event_dir)?;

        Ok(Self { event_dir })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.event_dir.join(date_to_record_name(date))
    }

    async fn read_events(&self, path: &Path) -> Result<Vec<ActivityEvent>> {
        async fn extract(path: &Path) -> Result<Vec<ActivityEvent>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut events = vec![];
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<ActivityEvent>(&line) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        // ignore illegal values. Might happen after shutdowns
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &line
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(events)
        }

        match extract(path).await {
            Ok(events) => Ok(events),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e)?,
        }
    }
}

impl EventStore for FsEventStore {
    type DayFile = EventDayFile<File>;

    async fn open_day(&self, date: NaiveDate) -> Result<Self::DayFile> {
        let file = File::options()
            .append(true)
            .create(true)
            .open(self.day_path(date))
            .await?;

        Ok(EventDayFile::new(file, date))
    }

    async fn events_for(&self, date: NaiveDate) -> Result<Vec<ActivityEvent>> {
        self.read_events(&self.day_path(date)).await
    }
}

pub struct EventDayFile<F> {
    file: F,
    date: NaiveDate,
}

impl<F> EventDayFile<F> {
    fn new(file: F, date: NaiveDate) -> Self {
        Self { file, date }
    }
}

impl<F: tokio::io::AsyncWrite + fs4::tokio::AsyncFileExt + Unpin> DayFileHandle
    for EventDayFile<F>
{
    async fn append(&mut self, events: Vec<ActivityEvent>) -> Result<()> {
        let mut buffer = Vec::<u8>::new();
        for event in &events {
            serde_json::to_writer(&mut buffer, event)?;
            buffer.push(b'\n');
        }

        // Semi-safe acquire-release for a file
        self.file.lock_exclusive()?;
        let result = async {
            self.file.write_all(&buffer).await?;
            self.file.flush().await?;
            Ok(())
        }
        .await;
        self.file.unlock_async().await?;
        result
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

/// Events for each day between `start` and `end` (both inclusive), as a
/// stream of `(date, events)` pairs with a few day files read ahead.
pub fn events_between(
    storage: impl EventStore + Send + Sync + 'static,
    start: NaiveDate,
    end: NaiveDate,
) -> impl Stream<Item = (NaiveDate, Vec<ActivityEvent>)> {
    let storage = std::sync::Arc::new(storage);

    date_range(start, end)
        .map(move |day| {
            let storage = storage.clone();
            async move { (day, storage.events_for(day).await) }
        })
        .buffered(4)
        .map(|(day, result)| match result {
            Ok(events) => (day, events),
            Err(e) => {
                // A day that cannot be read reports as empty rather than
                // aborting the whole range.
                error!("Failed to read events for {day}: {e}");
                (day, vec![])
            }
        })
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold((start, end), |(current, end)| {
        std::future::ready({
            if current <= end {
                let next = current.succ_opt().expect("End of time should never happen");
                Some((current, (next, end)))
            } else {
                None
            }
        })
    })
}

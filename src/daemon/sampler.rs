use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    activity_api::ActivitySource,
    config::keywords::KeywordCache,
    core::classifier::detect_project,
    daemon::storage::entities::{ActivityEvent, EventKind},
    utils::clock::Clock,
};

/// The afk half of the sampler: compares sampled idle time against the
/// configured threshold and reports threshold crossings. Initial state is
/// active. State lives only in memory; the emitted events are the durable
/// record of transitions.
pub struct AfkTracker {
    threshold_seconds: f64,
    afk: bool,
}

impl AfkTracker {
    pub fn from_seconds(threshold_seconds: u32) -> Self {
        Self {
            threshold_seconds: threshold_seconds as f64,
            afk: false,
        }
    }

    pub fn is_afk(&self) -> bool {
        self.afk
    }

    /// Feeds one idle-time sample. Returns the transition event kind when the
    /// sample crosses the threshold, `None` while the state holds.
    pub fn observe(&mut self, idle_seconds: f64) -> Option<EventKind> {
        let beyond = idle_seconds > self.threshold_seconds;
        match (self.afk, beyond) {
            (false, true) => {
                self.afk = true;
                Some(EventKind::AfkStart)
            }
            (true, false) => {
                self.afk = false;
                Some(EventKind::AfkEnd)
            }
            _ => None,
        }
    }
}

/// Periodic sampling loop. Each tick queries the platform source, classifies
/// the sample and hands the resulting event to the processing module. A
/// failed tick is logged and abandoned; the next tick is independent.
pub struct SamplerModule {
    next: mpsc::Sender<ActivityEvent>,
    source: Box<dyn ActivitySource>,
    shutdown: CancellationToken,
    afk: AfkTracker,
    keywords: Arc<KeywordCache>,
    sampling_interval: Duration,
    time_provider: Box<dyn Clock>,
}

impl SamplerModule {
    pub fn new(
        next: mpsc::Sender<ActivityEvent>,
        source: Box<dyn ActivitySource>,
        shutdown: CancellationToken,
        afk: AfkTracker,
        keywords: Arc<KeywordCache>,
        sampling_interval: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            source,
            shutdown,
            afk,
            keywords,
            sampling_interval,
            time_provider,
        }
    }

    /// One tick. `None` means the tick legitimately produced nothing (the
    /// user is afk and no transition happened).
    fn sample_tick(&mut self) -> Result<Option<ActivityEvent>> {
        let idle_seconds = self.source.sample_idle_seconds()?;
        let timestamp = self.time_provider.time();

        if let Some(transition) = self.afk.observe(idle_seconds) {
            let event = match transition {
                EventKind::AfkStart => ActivityEvent::afk_start(timestamp),
                _ => ActivityEvent::afk_end(timestamp),
            };
            return Ok(Some(event));
        }

        if self.afk.is_afk() {
            return Ok(None);
        }

        let app = self.source.sample_foreground_app()?;
        let window_title = app.as_ref().map(|a| self.source.sample_window_title(a));
        let project = detect_project(
            window_title.as_deref(),
            app.as_ref().map(|a| &*a.name),
            &self.keywords.get(),
        );

        Ok(Some(ActivityEvent::activity(
            timestamp,
            app.map(|a| a.name),
            window_title,
            Some(project),
        )))
    }

    /// Executes the sampler event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.sampling_interval;

            match self.sample_tick() {
                Ok(Some(event)) => {
                    debug!("Sending event {:?}", event);
                    self.next
                        .send(event)
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                    info!("Successfully sent event")
                }
                Ok(None) => debug!("User afk, nothing sampled"),
                Err(e) => {
                    error!("Tick abandoned after sampling error {:?}", e)
                }
            }

            tokio::select! {
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop processing module.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::daemon::storage::entities::EventKind;

    use super::AfkTracker;

    #[test]
    fn starts_active() {
        let tracker = AfkTracker::from_seconds(180);
        assert!(!tracker.is_afk());
    }

    #[test]
    fn crossing_threshold_emits_afk_start_once() {
        let mut tracker = AfkTracker::from_seconds(180);
        assert_eq!(tracker.observe(10.0), None);
        assert_eq!(tracker.observe(181.0), Some(EventKind::AfkStart));
        // Staying idle does not re-emit.
        assert_eq!(tracker.observe(211.0), None);
        assert!(tracker.is_afk());
    }

    #[test]
    fn returning_emits_afk_end() {
        let mut tracker = AfkTracker::from_seconds(180);
        tracker.observe(200.0);
        assert_eq!(tracker.observe(2.0), Some(EventKind::AfkEnd));
        assert!(!tracker.is_afk());
        assert_eq!(tracker.observe(2.0), None);
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut tracker = AfkTracker::from_seconds(180);
        assert_eq!(tracker.observe(180.0), None);
        assert!(!tracker.is_afk());
    }
}

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use processing::{event_writer::EventWriter, ProcessingModule};
use sampler::{AfkTracker, SamplerModule};
use storage::{entities::ActivityEvent, event_store::FsEventStore, summary_store::SummaryStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    activity_api::{ActivitySource, GenericActivitySource},
    config::{self, keywords::KeywordCache, Config},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod processing;
pub mod sampler;
pub mod shutdown;
pub mod storage;

pub const EVENT_DIR_NAME: &str = "events";

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let config = config::load_config(&config::config_path(&dir))?;

    let (sender, receiver) = mpsc::channel::<ActivityEvent>(10);
    let source = GenericActivitySource::new()?;

    let shutdown_token = CancellationToken::new();

    let keywords = Arc::new(KeywordCache::new(config::config_path(&dir)));
    let collector = create_sampler(
        sender,
        source,
        &shutdown_token,
        &config,
        keywords,
        DefaultClock,
    );

    let processor = create_processor(&dir, receiver, config, DefaultClock)?;

    let (_, collection_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        collector.run(),
        processor.run(),
    );

    if let Err(collection_result) = collection_result {
        error!("Sampling module got an error {:?}", collection_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_sampler(
    sender: mpsc::Sender<ActivityEvent>,
    source: impl ActivitySource + 'static,
    shutdown_token: &CancellationToken,
    config: &Config,
    keywords: Arc<KeywordCache>,
    clock: impl Clock,
) -> SamplerModule {
    SamplerModule::new(
        sender,
        Box::new(source),
        shutdown_token.clone(),
        AfkTracker::from_seconds(config.afk_threshold_seconds),
        keywords,
        Duration::from_secs(config.tracking_interval_seconds as u64),
        Box::new(clock),
    )
}

fn create_processor(
    app_dir: &std::path::Path,
    receiver: mpsc::Receiver<ActivityEvent>,
    config: Config,
    clock: impl Clock,
) -> Result<ProcessingModule<EventWriter<FsEventStore>>, anyhow::Error> {
    let store = FsEventStore::new(app_dir.join(EVENT_DIR_NAME))?;
    let summaries = SummaryStore::new(app_dir);
    let writer = EventWriter::new(store, summaries, config, Box::new(clock));
    Ok(ProcessingModule::new(receiver, writer))
}

#[cfg(test)]
mod daemon_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::{sync::mpsc, time::Instant};
    use tokio_util::sync::CancellationToken;

    use crate::{
        activity_api::{ForegroundApp, MockActivitySource},
        config::{keywords::KeywordCache, Config},
        daemon::{
            create_processor, create_sampler,
            storage::{
                entities::{ActivityEvent, EventKind},
                event_store::{EventStore, FsEventStore},
            },
            EVENT_DIR_NAME,
        },
        utils::{clock::Clock, logging::TEST_LOGGING, time::local_date},
    };

    const TEST_START_DATE: NaiveDateTime = NaiveDateTime::new(
        NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(),
        NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
    );

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    /// Very simple smoke test to check if the application is working properly. It can be improved
    /// by warping time so that it takes 10 times less time, but for now we have what we have.
    #[tokio::test]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let mut source = MockActivitySource::new();
        source.expect_sample_idle_seconds().returning(|| Ok(0.0));
        let mut apps = ["Code", "Code", "Slack"].into_iter().cycle();
        source
            .expect_sample_foreground_app()
            .returning(move || {
                Ok(Some(ForegroundApp {
                    name: apps.next().unwrap().into(),
                }))
            })
            .times(..7);
        source
            .expect_sample_window_title()
            .returning(|_| Arc::from("myrepo - Visual Studio Code"));

        let shutdown_token = CancellationToken::new();

        let (sender, receiver) = mpsc::channel::<ActivityEvent>(10);
        let test_clock = TestClock {
            start_time: Utc.from_utc_datetime(&TEST_START_DATE),
            reference: Instant::now(),
        };

        let config = Config {
            tracking_interval_seconds: 1,
            ..Config::default()
        };

        let dir = tempdir()?;

        let keywords = Arc::new(KeywordCache::new(dir.path().join("config.json")));
        let collector = create_sampler(
            sender,
            source,
            &shutdown_token,
            &config,
            keywords,
            test_clock.clone(),
        );

        let processor = create_processor(dir.path(), receiver, config, test_clock.clone())?;

        let (_, collection_result, processing_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(5500)).await;
                shutdown_token.cancel()
            },
            collector.run(),
            processor.run(),
        );

        collection_result?;
        processing_result?;

        let storage = FsEventStore::new(dir.path().join(EVENT_DIR_NAME))?;
        let date = local_date(Utc.from_utc_datetime(&TEST_START_DATE));
        let events = storage.events_for(date).await?;

        assert!(events.len() >= 5, "expected at least 5 events, got {}", events.len());
        assert!(events.iter().all(|e| e.kind == EventKind::Activity));
        assert!(events.iter().all(|e| e.project.is_some()));

        Ok(())
    }
}

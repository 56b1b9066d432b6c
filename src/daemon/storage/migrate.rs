use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::{
    config::keywords::ProjectKeywordMap, core::classifier::detect_project,
    utils::time::local_date,
};

use super::{
    entities::ActivityEvent,
    event_store::{DayFileHandle, EventStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: usize,
}

/// One-shot import of a legacy flat-text log into the event store. The legacy
/// format is one sample per line: `<unix_ts>\t<app>\t<window title>`, the
/// title optionally absent. Unparsable lines are counted and skipped; one bad
/// line never aborts the migration.
pub async fn migrate_legacy_log(
    store: &impl EventStore,
    path: &Path,
    keywords: &ProjectKeywordMap,
) -> Result<MigrationReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read legacy log {path:?}"))?;

    let mut report = MigrationReport::default();
    let mut by_day: BTreeMap<NaiveDate, Vec<ActivityEvent>> = BTreeMap::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_legacy_line(line, keywords) {
            Some(event) => {
                by_day
                    .entry(local_date(event.timestamp))
                    .or_default()
                    .push(event);
                report.migrated += 1;
            }
            None => {
                warn!("Skipping unparsable legacy line: {line:?}");
                report.skipped += 1;
            }
        }
    }

    for (date, mut events) in by_day {
        // Legacy logs are not guaranteed chronological; day files are.
        events.sort_by_key(|e| e.timestamp);
        let mut handle = store.open_day(date).await?;
        handle.append(events).await?;
        handle.flush().await?;
    }

    info!(
        "Legacy migration finished: {} migrated, {} skipped",
        report.migrated, report.skipped
    );
    Ok(report)
}

fn parse_legacy_line(line: &str, keywords: &ProjectKeywordMap) -> Option<ActivityEvent> {
    let mut parts = line.splitn(3, '\t');
    let timestamp = parts.next()?.trim().parse::<i64>().ok()?;
    let timestamp = DateTime::<Utc>::from_timestamp(timestamp, 0)?;
    let app = parts.next()?.trim();
    if app.is_empty() {
        return None;
    }
    let title = parts.next().map(str::trim).filter(|t| !t.is_empty());

    let project = detect_project(title, Some(app), keywords);
    let app: Arc<str> = app.into();
    let title: Option<Arc<str>> = title.map(Into::into);
    Some(ActivityEvent::activity(
        timestamp,
        Some(app),
        title,
        Some(project),
    ))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{
        config::keywords::ProjectKeywordMap,
        daemon::storage::event_store::{EventStore, FsEventStore},
        utils::time::local_date,
    };

    use super::migrate_legacy_log;

    #[tokio::test]
    async fn migrates_good_lines_and_skips_bad_ones() -> Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("legacy.log");
        std::fs::write(
            &log_path,
            "1712307600\tCode\tmyrepo - Visual Studio Code\n\
             not a timestamp\tCode\ttitle\n\
             1712307630\tSlack\n\
             \n\
             1712307660\t\tmissing app\n",
        )?;

        let store = FsEventStore::new(dir.path().join("events"))?;
        let keywords = ProjectKeywordMap::default();
        let report = migrate_legacy_log(&store, &log_path, &keywords).await?;

        assert_eq!(report.migrated, 2);
        assert_eq!(report.skipped, 2);

        let date = local_date(chrono::DateTime::from_timestamp(1712307600, 0).unwrap());
        let events = store.events_for(date).await?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].app_name.as_deref(), Some("Code"));
        assert_eq!(events[0].project.as_deref(), Some("myrepo"));
        assert_eq!(events[1].app_name.as_deref(), Some("Slack"));
        assert!(events[1].window_title.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unordered_lines_are_written_in_timestamp_order() -> Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("legacy.log");
        std::fs::write(
            &log_path,
            "1712311200\tSlack\n\
             1712307600\tCode\tmyrepo - Visual Studio Code\n\
             1712309400\tTerminal\tbash ~/dev/myrepo\n",
        )?;

        let store = FsEventStore::new(dir.path().join("events"))?;
        let report = migrate_legacy_log(&store, &log_path, &ProjectKeywordMap::default()).await?;
        assert_eq!(report.migrated, 3);

        let date = local_date(chrono::DateTime::from_timestamp(1712307600, 0).unwrap());
        let events = store.events_for(date).await?;
        let timestamps: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
        assert_eq!(events[0].app_name.as_deref(), Some("Code"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_legacy_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FsEventStore::new(dir.path().join("events")).unwrap();
        let result = migrate_legacy_log(
            &store,
            &dir.path().join("nope.log"),
            &ProjectKeywordMap::default(),
        )
        .await;
        assert!(result.is_err());
    }
}

use std::{collections::BTreeMap, io::ErrorKind, path::PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::warn;

use super::entities::DailySummary;

pub const SUMMARY_FILE_NAME: &str = "summaries.json";

/// Cache of per-day aggregates, one JSON document keyed by date. Upserts are
/// read-merge-write under an exclusive file lock; last write wins, which is
/// acceptable for a single-user cache.
pub struct SummaryStore {
    path: PathBuf,
}

impl SummaryStore {
    pub fn new(app_dir: &std::path::Path) -> Self {
        Self {
            path: app_dir.join(SUMMARY_FILE_NAME),
        }
    }

    /// All cached summaries. A missing or unreadable cache is an empty cache:
    /// callers get zero-filled answers, never an error they must handle.
    pub async fn load_all(&self) -> BTreeMap<NaiveDate, DailySummary> {
        match self.read_map().await {
            Ok(map) => map,
            Err(e) => {
                warn!("Summary cache unreadable, treating as empty: {e}");
                BTreeMap::new()
            }
        }
    }

    pub async fn get(&self, date: NaiveDate) -> Option<DailySummary> {
        self.load_all().await.remove(&date)
    }

    /// Inserts or updates the row for `summary.date`. An existing row is
    /// merged via [DailySummary::merge_from] so enrichment fields survive
    /// recomputation.
    pub async fn upsert(&self, summary: DailySummary) -> Result<()> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;
        file.lock_exclusive()?;
        Self::upsert_locked(file, summary).await
    }

    async fn upsert_locked(mut file: File, summary: DailySummary) -> Result<()> {
        let mut raw = String::new();
        file.read_to_string(&mut raw).await?;

        let mut map: BTreeMap<NaiveDate, DailySummary> = if raw.trim().is_empty() {
            BTreeMap::new()
        } else {
            match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Summary cache corrupted, rebuilding from this write: {e}");
                    BTreeMap::new()
                }
            }
        };

        match map.get_mut(&summary.date) {
            Some(existing) => existing.merge_from(summary),
            None => {
                map.insert(summary.date, summary);
            }
        }

        let serialized = serde_json::to_string_pretty(&map)?;
        file.set_len(0).await?;
        file.seek(std::io::SeekFrom::Start(0)).await?;
        file.write_all(serialized.as_bytes()).await?;
        file.flush().await?;
        file.unlock_async().await?;
        Ok(())
    }

    async fn read_map(&self) -> Result<BTreeMap<NaiveDate, DailySummary>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use crate::daemon::storage::entities::DailySummary;

    use super::SummaryStore;

    const DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();

    fn summary(total: i64, productive: Option<i64>) -> DailySummary {
        DailySummary {
            date: DATE,
            total_work_seconds: total,
            goal_seconds: 28800,
            sessions_count: 1,
            productive_seconds: productive,
            projects_json: None,
        }
    }

    #[tokio::test]
    async fn empty_store_reads_empty() {
        let dir = tempdir().unwrap();
        let store = SummaryStore::new(dir.path());
        assert!(store.load_all().await.is_empty());
        assert!(store.get(DATE).await.is_none());
    }

    #[tokio::test]
    async fn upsert_then_get() -> Result<()> {
        let dir = tempdir()?;
        let store = SummaryStore::new(dir.path());
        store.upsert(summary(100, Some(90))).await?;

        let loaded = store.get(DATE).await.unwrap();
        assert_eq!(loaded.total_work_seconds, 100);
        assert_eq!(loaded.productive_seconds, Some(90));
        Ok(())
    }

    #[tokio::test]
    async fn recomputation_keeps_enrichment() -> Result<()> {
        let dir = tempdir()?;
        let store = SummaryStore::new(dir.path());
        store.upsert(summary(100, Some(90))).await?;
        // Second computation without productive_seconds must not wipe it.
        store.upsert(summary(250, None)).await?;

        let loaded = store.get(DATE).await.unwrap();
        assert_eq!(loaded.total_work_seconds, 250);
        assert_eq!(loaded.productive_seconds, Some(90));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_cache_degrades_to_empty() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("summaries.json"), "{broken")?;
        let store = SummaryStore::new(dir.path());
        assert!(store.load_all().await.is_empty());

        // And a write through the corruption rebuilds the document.
        store.upsert(summary(100, None)).await?;
        assert_eq!(store.get(DATE).await.unwrap().total_work_seconds, 100);
        Ok(())
    }
}

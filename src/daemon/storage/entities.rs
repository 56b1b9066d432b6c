use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One observation, stored as a JSON line in the day file it belongs to.
/// Activity samples carry the foreground app and the project label the
/// classifier assigned at sampling time; afk transitions carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Arc<str>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Activity,
    AfkStart,
    AfkEnd,
}

impl ActivityEvent {
    pub fn activity(
        timestamp: DateTime<Utc>,
        app_name: Option<Arc<str>>,
        window_title: Option<Arc<str>>,
        project: Option<Arc<str>>,
    ) -> Self {
        Self {
            timestamp,
            kind: EventKind::Activity,
            app_name,
            window_title,
            project,
        }
    }

    pub fn afk_start(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            kind: EventKind::AfkStart,
            app_name: None,
            window_title: None,
            project: None,
        }
    }

    pub fn afk_end(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            kind: EventKind::AfkEnd,
            app_name: None,
            window_title: None,
            project: None,
        }
    }
}

/// Cached per-date aggregate, one row per calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_work_seconds: i64,
    pub goal_seconds: i64,
    pub sessions_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productive_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_json: Option<serde_json::Value>,
}

impl DailySummary {
    pub fn goal_met(&self) -> bool {
        self.total_work_seconds >= self.goal_seconds
    }

    /// Merge-on-write: a recomputation overwrites the totals but must not
    /// zero out enrichment fields it didn't produce.
    pub fn merge_from(&mut self, newer: DailySummary) {
        self.total_work_seconds = newer.total_work_seconds;
        self.goal_seconds = newer.goal_seconds;
        self.sessions_count = newer.sessions_count;
        if newer.productive_seconds.is_some() {
            self.productive_seconds = newer.productive_seconds;
        }
        if newer.projects_json.is_some() {
            self.projects_json = newer.projects_json;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{ActivityEvent, DailySummary, EventKind};

    #[test]
    fn event_roundtrips_through_json() {
        let event = ActivityEvent::activity(
            Utc.with_ymd_and_hms(2024, 4, 5, 9, 0, 0).unwrap(),
            Some("Code".into()),
            Some("myrepo - Visual Studio Code".into()),
            Some("myrepo".into()),
        );
        let raw = serde_json::to_string(&event).unwrap();
        assert_eq!(serde_json::from_str::<ActivityEvent>(&raw).unwrap(), event);
    }

    #[test]
    fn afk_events_omit_activity_fields() {
        let raw =
            serde_json::to_string(&ActivityEvent::afk_start(Utc::now())).unwrap();
        assert!(!raw.contains("app_name"));
        assert!(!raw.contains("window_title"));
        assert!(!raw.contains("project"));
    }

    #[test]
    fn events_without_optional_fields_parse() {
        let raw = r#"{"timestamp":1712300400,"kind":"activity"}"#;
        let event: ActivityEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, EventKind::Activity);
        assert!(event.app_name.is_none());
    }

    #[test]
    fn summary_merge_preserves_enrichment() {
        let mut stored = DailySummary {
            date: NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(),
            total_work_seconds: 100,
            goal_seconds: 28800,
            sessions_count: 1,
            productive_seconds: Some(90),
            projects_json: Some(serde_json::json!({"alpha": 90})),
        };
        stored.merge_from(DailySummary {
            date: stored.date,
            total_work_seconds: 200,
            goal_seconds: 28800,
            sessions_count: 2,
            productive_seconds: None,
            projects_json: None,
        });
        assert_eq!(stored.total_work_seconds, 200);
        assert_eq!(stored.sessions_count, 2);
        assert_eq!(stored.productive_seconds, Some(90));
        assert!(stored.projects_json.is_some());
    }
}

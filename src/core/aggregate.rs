use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

use crate::{core::classifier::UNCATEGORIZED, daemon::storage::entities::DailySummary};

use super::session::WorkSession;

/// Upper bound on the streak walk. Protects against a corrupted summary
/// store producing an endless run of goal-met days.
const MAX_STREAK_DAYS: u32 = 365;

/// Minutes of work per local clock hour. Each session contributes its overlap
/// with every hour it touches; buckets round independently, so their sum may
/// drift a minute or two from the day total. That drift is intentional.
pub fn hourly_minutes(sessions: &[WorkSession]) -> [i64; 24] {
    let mut buckets_seconds = [0i64; 24];

    for session in sessions {
        let start = session.start.with_timezone(&Local).naive_local();
        let end = session.end.with_timezone(&Local).naive_local();
        distribute(&mut buckets_seconds, start, end);
    }

    let mut minutes = [0i64; 24];
    for (bucket, seconds) in minutes.iter_mut().zip(buckets_seconds) {
        *bucket = (seconds as f64 / 60.0).round() as i64;
    }
    minutes
}

fn distribute(buckets_seconds: &mut [i64; 24], start: NaiveDateTime, end: NaiveDateTime) {
    let mut cursor = start;
    while cursor < end {
        let hour = cursor.time().hour() as usize;
        let hour_end = NaiveDateTime::new(
            cursor.date(),
            NaiveTime::from_hms_opt(cursor.time().hour(), 0, 0).unwrap(),
        ) + Duration::hours(1);
        let slice_end = end.min(hour_end);
        buckets_seconds[hour] += (slice_end - cursor).num_seconds();
        cursor = slice_end;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GoalProgress {
    pub percentage: u32,
    pub remaining_seconds: i64,
    pub is_complete: bool,
}

pub fn goal_progress(total_work_seconds: i64, goal_seconds: i64) -> GoalProgress {
    if goal_seconds <= 0 {
        return GoalProgress {
            percentage: 100,
            remaining_seconds: 0,
            is_complete: true,
        };
    }
    let percentage =
        ((total_work_seconds as f64 / goal_seconds as f64) * 100.0).round() as u32;
    GoalProgress {
        percentage: percentage.min(100),
        remaining_seconds: (goal_seconds - total_work_seconds).max(0),
        is_complete: total_work_seconds >= goal_seconds,
    }
}

/// Consecutive goal-met days ending today, walked backward through the
/// summary cache. The walk stops at the first missing or failed day.
pub fn current_streak(
    summaries: &BTreeMap<NaiveDate, DailySummary>,
    today: NaiveDate,
) -> u32 {
    let mut streak = 0;
    let mut day = today;
    while streak < MAX_STREAK_DAYS {
        match summaries.get(&day) {
            Some(summary) if summary.goal_met() => streak += 1,
            _ => break,
        }
        let Some(previous) = day.pred_opt() else {
            break;
        };
        day = previous;
    }
    streak
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStat {
    pub project: Arc<str>,
    #[serde(with = "duration_seconds")]
    pub total: Duration,
    pub sessions_count: usize,
}

mod duration_seconds {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }
}

/// Per-project totals over any set of sessions, sorted descending by time.
/// Sessions without a label land under [UNCATEGORIZED].
pub fn project_stats<'a>(sessions: impl IntoIterator<Item = &'a WorkSession>) -> Vec<ProjectStat> {
    let mut map = HashMap::<Arc<str>, ProjectStat>::new();

    for session in sessions {
        let project: Arc<str> = if session.project.is_empty() {
            UNCATEGORIZED.into()
        } else {
            session.project.clone()
        };
        let stat = map.entry(project.clone()).or_insert_with(|| ProjectStat {
            project,
            total: Duration::zero(),
            sessions_count: 0,
        });
        stat.total += session.duration();
        stat.sessions_count += 1;
    }

    let mut stats = map.into_values().collect::<Vec<_>>();
    stats.sort_by(|a, b| b.total.cmp(&a.total));
    stats
}

/// Per-day summary snapshot taken from a reconstruction, ready for the cache.
pub fn summarize_day(
    day: &super::session::DaySessions,
    goal_seconds: i64,
) -> DailySummary {
    let stats = project_stats(&day.sessions);
    let projects_json = if stats.is_empty() {
        None
    } else {
        serde_json::to_value(&stats).ok()
    };
    DailySummary {
        date: day.date,
        total_work_seconds: day.total_work_seconds,
        goal_seconds,
        sessions_count: day.sessions_count(),
        productive_seconds: Some(day.total_work_seconds),
        projects_json,
    }
}

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::{
    config::Config,
    core::classifier::{is_productive, UNCATEGORIZED},
    daemon::storage::entities::{ActivityEvent, EventKind},
    utils::time::local_date,
};

/// A maximal contiguous interval of productive, non-afk activity. Derived,
/// never stored; reconstruction re-derives it from the event log on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSession {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Label captured when the session opened. Later samples inside the same
    /// session never rewrite it.
    pub project: Arc<str>,
}

impl WorkSession {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration().num_seconds()
    }
}

/// Result of reconstructing one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySessions {
    pub date: NaiveDate,
    pub sessions: Vec<WorkSession>,
    pub total_work_seconds: i64,
}

impl DaySessions {
    pub fn sessions_count(&self) -> u32 {
        self.sessions.len() as u32
    }
}

/// Replays one day's ordered events through the session state machine.
///
/// `now` is the evaluation instant: a session still open at the end of the
/// pass is clamped to `now` when `date` is the current local date, otherwise
/// to the last event timestamp of the day. Sessions that come out with
/// non-positive duration (duplicate or out-of-order timestamps) are dropped.
pub fn reconstruct_day(
    date: NaiveDate,
    events: &[ActivityEvent],
    config: &Config,
    now: DateTime<Utc>,
) -> DaySessions {
    let mut afk = false;
    let mut session_start: Option<(DateTime<Utc>, Arc<str>)> = None;
    let mut last_timestamp: Option<DateTime<Utc>> = None;
    let mut sessions: Vec<WorkSession> = vec![];

    let close_at = |open: &mut Option<(DateTime<Utc>, Arc<str>)>,
                    end: DateTime<Utc>,
                    sessions: &mut Vec<WorkSession>| {
        if let Some((start, project)) = open.take() {
            if end > start {
                sessions.push(WorkSession {
                    start,
                    end,
                    project,
                });
            }
        }
    };

    for event in events {
        match event.kind {
            EventKind::AfkStart => {
                close_at(&mut session_start, event.timestamp, &mut sessions);
                afk = true;
            }
            EventKind::AfkEnd => {
                // Tolerates an orphan AfkEnd from a truncated log. No session
                // opens here; the next productive sample does that.
                afk = false;
            }
            EventKind::Activity if afk => {}
            EventKind::Activity => {
                let productive = is_productive(
                    event.app_name.as_deref(),
                    event.window_title.as_deref(),
                    &config.productive_apps,
                    &config.productive_websites,
                );
                match (productive, session_start.is_some()) {
                    (true, false) => {
                        let project = event
                            .project
                            .clone()
                            .unwrap_or_else(|| UNCATEGORIZED.into());
                        session_start = Some((event.timestamp, project));
                    }
                    (false, true) => {
                        close_at(&mut session_start, event.timestamp, &mut sessions);
                    }
                    // Productive while open: session continues under the
                    // project it started with. Non-productive while closed:
                    // nothing to do.
                    (true, true) | (false, false) => {}
                }
            }
        }
        last_timestamp = Some(event.timestamp);
    }

    if session_start.is_some() && !afk {
        let end = if local_date(now) == date {
            now
        } else {
            // Past day with no terminating event: clamp to the last thing we
            // saw that day.
            last_timestamp.unwrap_or(now)
        };
        close_at(&mut session_start, end, &mut sessions);
    }

    let total_work_seconds = sessions.iter().map(WorkSession::duration_seconds).sum();
    DaySessions {
        date,
        sessions,
        total_work_seconds,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::{
        config::Config,
        daemon::storage::entities::ActivityEvent,
        utils::time::local_date,
    };

    use super::{reconstruct_day, DaySessions};

    const DAY: NaiveDate = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();

    fn at(h: u32, m: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 5, h, m, 0).unwrap()
    }

    fn config() -> Config {
        Config {
            productive_apps: vec!["VSCode".into()],
            productive_websites: vec![],
            ..Config::default()
        }
    }

    fn activity(ts: chrono::DateTime<Utc>, app: &str) -> ActivityEvent {
        ActivityEvent::activity(ts, Some(app.into()), None, Some("demo".into()))
    }

    /// Past date well away from the wall clock so the "today" clamp never
    /// applies unless a test passes a matching `now`.
    fn reconstruct_past(events: &[ActivityEvent]) -> DaySessions {
        reconstruct_day(DAY, events, &config(), Utc::now())
    }

    #[test]
    fn empty_day_is_zero() {
        let result = reconstruct_past(&[]);
        assert_eq!(result.total_work_seconds, 0);
        assert_eq!(result.sessions_count(), 0);
        assert!(result.sessions.is_empty());
    }

    #[test]
    fn productive_run_spans_first_to_last_event() {
        let events = vec![
            activity(at(9, 0), "VSCode"),
            activity(at(9, 30), "VSCode"),
            activity(at(10, 0), "VSCode"),
        ];
        let result = reconstruct_past(&events);
        assert_eq!(result.sessions_count(), 1);
        assert_eq!(result.total_work_seconds, 3600);
        assert_eq!(result.sessions[0].start, at(9, 0));
        assert_eq!(result.sessions[0].end, at(10, 0));
    }

    #[test]
    fn nonproductive_app_splits_sessions() {
        // The scenario from the observable contract: VSCode productive, Slack
        // not, querying a past day.
        let events = vec![
            activity(at(9, 0), "VSCode"),
            activity(at(9, 30), "VSCode"),
            activity(at(10, 0), "VSCode"),
            activity(at(10, 30), "Slack"),
            activity(at(11, 0), "VSCode"),
        ];
        let result = reconstruct_past(&events);
        assert_eq!(result.sessions_count(), 1);
        assert_eq!(result.sessions[0].start, at(9, 0));
        assert_eq!(result.sessions[0].end, at(10, 30));
        // The 11:00 reopen has no later event; it clamps to last_timestamp =
        // 11:00 and is dropped as zero-length.
        assert_eq!(result.total_work_seconds, 5400);
    }

    #[test]
    fn open_session_clamps_to_now_for_today() {
        let events = vec![
            activity(at(9, 0), "VSCode"),
            activity(at(10, 0), "VSCode"),
            activity(at(10, 30), "Slack"),
            activity(at(11, 0), "VSCode"),
        ];
        let now = at(11, 45);
        // Evaluate as if 2024-04-05 11:45 local were the wall clock.
        let result = reconstruct_day(local_date(now), &events, &config(), now);
        if local_date(now) == DAY {
            assert_eq!(result.sessions_count(), 2);
            assert_eq!(result.sessions[1].end, now);
            assert_eq!(result.total_work_seconds, 5400 + 2700);
        }
    }

    #[test]
    fn afk_gap_is_excluded() {
        let events = vec![
            activity(at(9, 30), "VSCode"),
            ActivityEvent::afk_start(at(10, 0)),
            ActivityEvent::afk_end(at(10, 30)),
            activity(at(11, 0), "VSCode"),
            activity(at(11, 30), "VSCode"),
        ];
        let result = reconstruct_past(&events);
        assert_eq!(result.sessions_count(), 2);
        assert_eq!(result.sessions[0].start, at(9, 30));
        assert_eq!(result.sessions[0].end, at(10, 0));
        assert_eq!(result.sessions[1].start, at(11, 0));
        assert_eq!(result.sessions[1].end, at(11, 30));
        // The 30 afk minutes between 10:00 and 10:30 plus the dead half hour
        // before 11:00 contribute nothing.
        assert_eq!(result.total_work_seconds, 1800 + 1800);
    }

    #[test]
    fn afk_pair_inside_run_preserves_outside_duration() {
        let uninterrupted = vec![
            activity(at(9, 0), "VSCode"),
            activity(at(12, 0), "VSCode"),
        ];
        let split = vec![
            activity(at(9, 0), "VSCode"),
            ActivityEvent::afk_start(at(10, 0)),
            ActivityEvent::afk_end(at(10, 30)),
            activity(at(10, 30), "VSCode"),
            activity(at(12, 0), "VSCode"),
        ];
        let whole = reconstruct_past(&uninterrupted);
        let parts = reconstruct_past(&split);
        assert_eq!(parts.sessions_count(), 2);
        assert_eq!(
            parts.total_work_seconds,
            whole.total_work_seconds - 30 * 60
        );
    }

    #[test]
    fn activity_while_afk_is_ignored() {
        let events = vec![
            ActivityEvent::afk_start(at(9, 0)),
            activity(at(9, 30), "VSCode"),
            ActivityEvent::afk_end(at(10, 0)),
        ];
        let result = reconstruct_past(&events);
        assert_eq!(result.sessions_count(), 0);
    }

    #[test]
    fn duplicate_afk_start_is_idempotent() {
        let events = vec![
            activity(at(9, 0), "VSCode"),
            ActivityEvent::afk_start(at(9, 30)),
            ActivityEvent::afk_start(at(9, 45)),
            ActivityEvent::afk_end(at(10, 0)),
            activity(at(10, 15), "VSCode"),
            activity(at(10, 45), "VSCode"),
        ];
        let result = reconstruct_past(&events);
        assert_eq!(result.sessions_count(), 2);
        assert_eq!(result.total_work_seconds, 1800 + 1800);
    }

    #[test]
    fn orphan_afk_end_is_tolerated() {
        let events = vec![
            ActivityEvent::afk_end(at(9, 0)),
            activity(at(9, 15), "VSCode"),
            activity(at(9, 45), "VSCode"),
        ];
        let result = reconstruct_past(&events);
        assert_eq!(result.sessions_count(), 1);
        assert_eq!(result.total_work_seconds, 1800);
    }

    #[test]
    fn zero_length_sessions_are_dropped() {
        let events = vec![
            activity(at(9, 0), "VSCode"),
            activity(at(9, 0), "Slack"),
        ];
        let result = reconstruct_past(&events);
        assert_eq!(result.sessions_count(), 0);
        assert_eq!(result.total_work_seconds, 0);
    }

    #[test]
    fn project_is_frozen_at_session_open() {
        let events = vec![
            ActivityEvent::activity(at(9, 0), Some("VSCode".into()), None, Some("alpha".into())),
            ActivityEvent::activity(at(9, 30), Some("VSCode".into()), None, Some("beta".into())),
            ActivityEvent::activity(at(10, 0), Some("Slack".into()), None, None),
        ];
        let result = reconstruct_past(&events);
        assert_eq!(result.sessions_count(), 1);
        assert_eq!(&*result.sessions[0].project, "alpha");
    }

    #[test]
    fn reconstruction_is_idempotent() {
        let events = vec![
            activity(at(9, 0), "VSCode"),
            ActivityEvent::afk_start(at(10, 0)),
            ActivityEvent::afk_end(at(10, 30)),
            activity(at(11, 0), "VSCode"),
            activity(at(11, 30), "Slack"),
        ];
        assert_eq!(reconstruct_past(&events), reconstruct_past(&events));
    }

    #[test]
    fn totals_never_negative() {
        // Out-of-order timestamps produce a non-positive session; it must be
        // dropped rather than pulled into the sum.
        let events = vec![
            activity(at(10, 0), "VSCode"),
            activity(at(9, 0), "Slack"),
            activity(at(9, 30), "VSCode"),
            activity(at(9, 45), "Slack"),
        ];
        let result = reconstruct_past(&events);
        assert!(result.total_work_seconds >= 0);
        assert!(result.sessions.iter().all(|s| s.duration_seconds() > 0));
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::ValueEnum;
use serde::Serialize;

use crate::{
    config::Config,
    core::{
        aggregate::{goal_progress, project_stats, GoalProgress, ProjectStat},
        session::DaySessions,
    },
    utils::time::format_duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}

const CSV_HEADER: &str = "Date,Start Time,End Time,Duration (minutes),Duration,Project";

pub fn render_csv(days: &[DaySessions]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for day in days {
        for session in &day.sessions {
            let start = session.start.with_timezone(&Local);
            let end = session.end.with_timezone(&Local);
            out.push_str(&format!(
                "{},{},{},{},{},{}\n",
                day.date.format("%Y-%m-%d"),
                start.format("%H:%M:%S"),
                end.format("%H:%M:%S"),
                session.duration().num_minutes(),
                format_duration(session.duration()),
                csv_field(&session.project),
            ));
        }
    }
    out
}

/// Project labels come from window titles, so commas and quotes do occur.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    exported_at: DateTime<Utc>,
    range: ExportRange,
    summary: ExportSummary,
    days: Vec<ExportDay>,
    sessions: Vec<ExportSession<'a>>,
    projects: Vec<ProjectStat>,
}

#[derive(Serialize)]
struct ExportRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Serialize)]
struct ExportSummary {
    total_work_seconds: i64,
    sessions_count: usize,
    goal_seconds: i64,
}

#[derive(Serialize)]
struct ExportDay {
    date: NaiveDate,
    total_work_seconds: i64,
    sessions_count: u32,
    goal: GoalProgress,
}

#[derive(Serialize)]
struct ExportSession<'a> {
    date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration_seconds: i64,
    project: &'a str,
}

pub fn render_json(days: &[DaySessions], config: &Config, exported_at: DateTime<Utc>) -> Result<String> {
    let goal_seconds = config.goal_seconds();
    let (Some(first), Some(last)) = (days.first(), days.last()) else {
        anyhow::bail!("Nothing to export: empty date range");
    };

    let document = ExportDocument {
        exported_at,
        range: ExportRange {
            start: first.date,
            end: last.date,
        },
        summary: ExportSummary {
            total_work_seconds: days.iter().map(|d| d.total_work_seconds).sum(),
            sessions_count: days.iter().map(|d| d.sessions.len()).sum(),
            goal_seconds,
        },
        days: days
            .iter()
            .map(|day| ExportDay {
                date: day.date,
                total_work_seconds: day.total_work_seconds,
                sessions_count: day.sessions_count(),
                goal: goal_progress(day.total_work_seconds, goal_seconds),
            })
            .collect(),
        sessions: days
            .iter()
            .flat_map(|day| {
                day.sessions.iter().map(|session| ExportSession {
                    date: day.date,
                    start: session.start,
                    end: session.end,
                    duration_seconds: session.duration_seconds(),
                    project: &session.project,
                })
            })
            .collect(),
        projects: project_stats(days.iter().flat_map(|d| d.sessions.iter())),
    };

    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn write_export(
    days: &[DaySessions],
    config: &Config,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let rendered = match format {
        ExportFormat::Csv => render_csv(days),
        ExportFormat::Json => render_json(days, config, Utc::now())?,
    };

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write export to {path:?}"))?;
            println!("Exported to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::{
        config::Config,
        core::session::{DaySessions, WorkSession},
    };

    use super::{render_csv, render_json};

    fn day_with_sessions() -> DaySessions {
        let date = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 4, 5, 9, 0, 0).unwrap();
        let sessions = vec![
            WorkSession {
                start,
                end: start + chrono::Duration::minutes(90),
                project: "myrepo".into(),
            },
            WorkSession {
                start: start + chrono::Duration::hours(2),
                end: start + chrono::Duration::hours(2) + chrono::Duration::minutes(30),
                project: "a,b".into(),
            },
        ];
        let total = sessions.iter().map(|s| s.duration_seconds()).sum();
        DaySessions {
            date,
            sessions,
            total_work_seconds: total,
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_session() {
        let csv = render_csv(&[day_with_sessions()]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Date,Start Time,End Time,Duration (minutes),Duration,Project"
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2024-04-05,"));
        assert!(lines[1].contains(",90,1h30m0s,myrepo"));
        // Comma in the label forces quoting.
        assert!(lines[2].ends_with(",\"a,b\""));
    }

    #[test]
    fn json_includes_summary_and_sessions() {
        let day = day_with_sessions();
        let json = render_json(&[day], &Config::default(), Utc::now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["summary"]["total_work_seconds"], 7200);
        assert_eq!(value["summary"]["sessions_count"], 2);
        assert_eq!(value["range"]["start"], "2024-04-05");
        assert_eq!(value["days"][0]["sessions_count"], 2);
        assert_eq!(value["sessions"][0]["project"], "myrepo");
        assert_eq!(value["sessions"][0]["duration_seconds"], 5400);
        assert_eq!(value["projects"][0]["project"], "myrepo");
    }

    #[test]
    fn json_export_of_empty_range_is_an_error() {
        assert!(render_json(&[], &Config::default(), Utc::now()).is_err());
    }
}

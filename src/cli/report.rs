use anyhow::Result;
use chrono::{Duration, Local, NaiveDate, Utc};
use futures::StreamExt;

use crate::{
    config::Config,
    core::{
        aggregate::{
            current_streak, goal_progress, hourly_minutes, project_stats, summarize_day,
        },
        session::{reconstruct_day, DaySessions},
    },
    daemon::storage::{
        event_store::{events_between, EventStore},
        summary_store::SummaryStore,
    },
    utils::time::format_duration,
};

/// Reconstructs every day in the range. Days without events come back as
/// empty, zero-filled results.
pub async fn collect_range(
    store: impl EventStore + Send + Sync + 'static,
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DaySessions> {
    let now = Utc::now();
    events_between(store, start, end)
        .map(|(date, events)| reconstruct_day(date, &events, config, now))
        .collect()
        .await
}

pub async fn show_today(
    store: impl EventStore + Send + Sync + 'static,
    summaries: &SummaryStore,
    config: &Config,
) -> Result<()> {
    let date = Local::now().date_naive();
    let events = store.events_for(date).await?;
    let day = reconstruct_day(date, &events, config, Utc::now());

    println!("Today ({})", date.format("%Y-%m-%d"));
    println!();
    for session in &day.sessions {
        println!(
            "{} - {}\t{}\t{}",
            session.start.with_timezone(&Local).format("%H:%M:%S"),
            session.end.with_timezone(&Local).format("%H:%M:%S"),
            format_duration(session.duration()),
            session.project,
        );
    }
    if day.sessions.is_empty() {
        println!("No work sessions recorded yet.");
    }

    let progress = goal_progress(day.total_work_seconds, config.goal_seconds());
    println!();
    println!(
        "Total: {} of {} ({}%){}",
        format_duration(Duration::seconds(day.total_work_seconds)),
        format_duration(Duration::seconds(config.goal_seconds())),
        progress.percentage,
        if progress.is_complete { ", goal met" } else { "" },
    );

    print_histogram(&hourly_minutes(&day.sessions));

    // Keep the cache fresh so the streak query sees today.
    summaries
        .upsert(summarize_day(&day, config.goal_seconds()))
        .await?;
    Ok(())
}

pub async fn show_stats(
    store: impl EventStore + Send + Sync + 'static,
    summaries: &SummaryStore,
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<()> {
    let days = collect_range(store, config, start, end).await;

    for day in &days {
        let progress = goal_progress(day.total_work_seconds, config.goal_seconds());
        println!(
            "{}\t{}\t{} sessions\t{}%",
            day.date.format("%Y-%m-%d"),
            format_duration(Duration::seconds(day.total_work_seconds)),
            day.sessions_count(),
            progress.percentage,
        );
        summaries
            .upsert(summarize_day(day, config.goal_seconds()))
            .await?;
    }

    let cached = summaries.load_all().await;
    let streak = current_streak(&cached, Local::now().date_naive());
    println!();
    println!("Current streak: {streak} day(s)");
    Ok(())
}

pub async fn show_projects(
    store: impl EventStore + Send + Sync + 'static,
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<()> {
    let days = collect_range(store, config, start, end).await;
    let sessions = days.iter().flat_map(|d| d.sessions.iter());
    let stats = project_stats(sessions);

    if stats.is_empty() {
        println!("No work sessions in range.");
        return Ok(());
    }

    for stat in stats {
        println!(
            "{}\t{}\t{} session(s)",
            format_duration(stat.total),
            stat.project,
            stat.sessions_count,
        );
    }
    Ok(())
}

fn print_histogram(minutes: &[i64; 24]) {
    if minutes.iter().all(|&m| m == 0) {
        return;
    }
    println!();
    for (hour, &m) in minutes.iter().enumerate() {
        if m == 0 {
            continue;
        }
        // One bar segment per five minutes, at least one for a nonempty hour.
        let bars = "#".repeat(((m + 4) / 5).max(1) as usize);
        println!("{hour:02}:00 {bars} {m}m");
    }
}

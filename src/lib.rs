//! Personal productivity monitor. A daemon samples the foreground window on a
//! fixed interval, tags each sample with a project label, and appends it to a
//! per-day event log. The cli reconstructs work sessions from those logs and
//! reports totals, goal progress, streaks and project breakdowns.

pub mod activity_api;
pub mod cli;
pub mod config;
pub mod core;
pub mod daemon;
pub mod utils;

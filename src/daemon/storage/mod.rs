//!  Storage is organized as an append-only event log plus a summary cache:
//!   - `events/` holds one JSON-lines file per local calendar day.
//!   - Each line is one [entities::ActivityEvent], written in sample order.
//!   - `summaries.json` caches per-day aggregates, upserted by date.

pub mod entities;
pub mod event_store;
pub mod migrate;
pub mod summary_store;

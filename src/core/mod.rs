//! The reconstruction core: pure functions from stored events to sessions,
//! totals and breakdowns. Nothing here touches the filesystem or the clock;
//! callers pass the event list and the evaluation instant in.

pub mod aggregate;
pub mod classifier;
pub mod session;

//! Scheduler module
//!
//! Background work that runs independently of any single pipeline:
//! reclaiming expired job workspaces and registry entries.

mod reaper;

pub use reaper::{ExpirationReaper, ExpiryTrigger, sweep};

//! Core domain types
//!
//! These types describe a synchronization job as the engine records it.
//! The runner mutates them through its registry; front ends only read snapshots.

pub mod artifact;
pub mod job;
pub mod log;
pub mod stage;

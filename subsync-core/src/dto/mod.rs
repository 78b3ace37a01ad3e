//! Data Transfer Objects
//!
//! Read-only views of a job handed to the transport layer.

pub mod job;

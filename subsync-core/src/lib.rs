//! Subsync Core
//!
//! Core types shared by the subtitle synchronization engine and its front ends.
//!
//! This crate contains:
//! - Domain types: job state, pipeline stages, step logs and artifacts
//! - DTOs: the status and result views handed to callers polling a job

pub mod domain;
pub mod dto;

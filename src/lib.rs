//! heartwatch - Heartbeat Monitoring
//!
//! Tracks checks that are expected to ping on a schedule, records every
//! status transition, and reports downtime. Jobs ping in; a background
//! sweeper marks the ones that went quiet as down.

pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod monitor;
pub mod notify;
pub mod ratelimit;
pub mod schedule;
pub mod scheduler;

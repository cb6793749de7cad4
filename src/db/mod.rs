//! Database module for heartwatch.
//!
//! Provides SQLite storage for checks, flips and rate-limit buckets.

mod models;
mod store;

pub use models::*;
pub use store::*;

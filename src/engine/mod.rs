//! The liveness engine.
//!
//! Pure functions over a check's stored fields and an injected "now":
//! status computation, transition decisions, signal handling and downtime
//! aggregation. Nothing here touches the database; [`crate::monitor`] runs
//! these inside a per-check transaction and commits the result.

mod downtime;
mod flips;
mod signal;
mod status;
mod summary;

pub use downtime::*;
pub use flips::*;
pub use signal::*;
pub use status::*;
pub use summary::*;

//! Schedule evaluation.
//!
//! Given a check's scheduling parameters and its last ping, predict when the
//! next ping is due and when the grace window after it closes. Everything
//! here is a pure function of the check's fields.

mod config;
mod cron;

pub use config::*;
pub use cron::*;

use crate::db::{Check, CheckKind, Status};

use chrono::{DateTime, Utc};

/// When the next ping is expected after `after`.
///
/// Cron schedules are validated when they are configured, so `None` only
/// comes back for a schedule that cannot fire, which callers treat as
/// "no expectation".
pub fn next_ping_after(check: &Check, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match check.kind {
        CheckKind::Simple => after.checked_add_signed(check.timeout),
        CheckKind::Cron => check.schedule.next_after(after, &check.tz),
    }
}

/// When the next ping is expected. `None` if the check has never pinged.
pub fn next_ping(check: &Check) -> Option<DateTime<Utc>> {
    check
        .last_ping
        .and_then(|last_ping| next_ping_after(check, last_ping))
}

/// End of the grace window following the next expected ping.
pub fn grace_end(check: &Check) -> Option<DateTime<Utc>> {
    next_ping(check).and_then(|next| next.checked_add_signed(check.grace))
}

/// When the check goes down if nothing else is heard from it.
///
/// The grace window opens at the next expected ping for a check that is up,
/// or when an unfinished run started, whichever comes first. New and paused
/// checks only go down through an unfinished run; a down check is already
/// down.
pub fn down_after(check: &Check) -> Option<DateTime<Utc>> {
    if check.status == Status::Down {
        return None;
    }

    let expected = match check.status {
        Status::Up | Status::Grace => next_ping(check),
        _ => None,
    };

    let running = crate::engine::start_in_flight(check);

    let grace_start = match (expected, running) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    grace_start.and_then(|start| start.checked_add_signed(check.grace))
}

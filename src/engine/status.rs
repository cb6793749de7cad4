//! Status computation.

use crate::db::{Check, Status};
use crate::schedule;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Status as shown to users.
///
/// Adds the transient `Started` overlay to the stored statuses. Never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    New,
    Up,
    Grace,
    Down,
    Paused,
    Started,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStatus::New => "new",
            DisplayStatus::Up => "up",
            DisplayStatus::Grace => "grace",
            DisplayStatus::Down => "down",
            DisplayStatus::Paused => "paused",
            DisplayStatus::Started => "started",
        }
    }
}

impl From<Status> for DisplayStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::New => DisplayStatus::New,
            Status::Up => DisplayStatus::Up,
            Status::Grace => DisplayStatus::Grace,
            Status::Down => DisplayStatus::Down,
            Status::Paused => DisplayStatus::Paused,
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start time of a run that has not reported completion yet.
pub fn start_in_flight(check: &Check) -> Option<DateTime<Utc>> {
    let start = check.last_start?;
    match check.last_ping {
        Some(ping) if ping >= start => None,
        _ => Some(start),
    }
}

/// Compute the status of `check` at `now`.
///
/// Precedence, first match wins:
///
/// 1. A run in flight for longer than the grace period is `Down`, whatever
///    the stored status (paused included).
/// 2. A run in flight within the grace period is `Started` when
///    `with_started` is set.
/// 3. Stored `New`, `Paused` and `Down` are reported as stored. A down check
///    only comes back up through a ping.
/// 4. Stored `Up` (or `Grace`) is re-evaluated against the schedule.
pub fn compute_status(check: &Check, now: DateTime<Utc>, with_started: bool) -> DisplayStatus {
    if let Some(start) = start_in_flight(check) {
        if now >= start + check.grace {
            return DisplayStatus::Down;
        }
        if with_started {
            return DisplayStatus::Started;
        }
    }

    match check.status {
        Status::New | Status::Paused | Status::Down => check.status.into(),
        Status::Up | Status::Grace => live_status(check, now),
    }
}

fn live_status(check: &Check, now: DateTime<Utc>) -> DisplayStatus {
    let Some(next) = schedule::next_ping(check) else {
        return DisplayStatus::Up;
    };

    if now < next {
        DisplayStatus::Up
    } else if now < next + check.grace {
        DisplayStatus::Grace
    } else {
        DisplayStatus::Down
    }
}

/// The stored status a passive re-evaluation at `now` settles on.
///
/// Only the move to `Down` is persisted; the grace window is always derived
/// live.
pub fn settled_status(check: &Check, now: DateTime<Utc>) -> Status {
    match compute_status(check, now, false) {
        DisplayStatus::Down => Status::Down,
        _ => check.status,
    }
}

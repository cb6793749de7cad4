//! Inbound ping signals and their effect on a check's liveness fields.

use crate::db::{Check, Status};

use chrono::{DateTime, Utc};
use std::str::FromStr;

/// What a ping reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Success,
    /// A run has begun; completion is reported by a later success or failure.
    Start,
    Failure,
}

impl Signal {
    /// Map a job's exit status: zero is success, anything else failure.
    pub fn from_exit_status(code: i32) -> Self {
        if code == 0 {
            Signal::Success
        } else {
            Signal::Failure
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "success" => Ok(Signal::Success),
            "start" => Ok(Signal::Start),
            "fail" | "failure" => Ok(Signal::Failure),
            other => Err(format!("unknown signal: {}", other)),
        }
    }
}

/// Apply `signal` received at `at` to the check's liveness fields.
///
/// Returns the stored status the signal asks for, or `None` when the signal
/// is ignored (the check is paused and waits for a manual resume). The
/// caller records the flip and writes the status.
pub fn apply_signal(check: &mut Check, signal: Signal, at: DateTime<Utc>) -> Option<Status> {
    if check.status == Status::Paused && check.manual_resume {
        return None;
    }

    check.n_pings += 1;

    match signal {
        Signal::Start => {
            // last_ping stays as it was
            check.last_start = Some(at);
            Some(check.status)
        }
        Signal::Success | Signal::Failure => {
            check.last_duration = check
                .last_start
                .take()
                .filter(|start| *start <= at)
                .map(|start| at - start);
            check.last_ping = Some(at);

            Some(if signal == Signal::Failure {
                Status::Down
            } else {
                Status::Up
            })
        }
    }
}

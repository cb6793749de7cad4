//! Overall status of a group of checks, as shown on status badges.

use super::DisplayStatus;

use serde::Serialize;

/// Rolled-up status of several checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Up,
    Late,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub status: OverallStatus,
    pub total: usize,
    pub grace: usize,
    pub down: usize,
}

/// Any down check makes the group down. Otherwise any check in its grace
/// window makes it late, if `with_late` is set.
pub fn summarize<I>(statuses: I, with_late: bool) -> Summary
where
    I: IntoIterator<Item = DisplayStatus>,
{
    let mut summary = Summary {
        status: OverallStatus::Up,
        total: 0,
        grace: 0,
        down: 0,
    };

    for status in statuses {
        summary.total += 1;
        match status {
            DisplayStatus::Down => {
                summary.down += 1;
                summary.status = OverallStatus::Down;
            }
            DisplayStatus::Grace => {
                summary.grace += 1;
                if with_late && summary.status == OverallStatus::Up {
                    summary.status = OverallStatus::Late;
                }
            }
            _ => {}
        }
    }

    summary
}

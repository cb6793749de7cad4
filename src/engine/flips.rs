//! Transition recording.

use crate::db::{PendingFlip, Status};

use chrono::{DateTime, Utc};

/// Decide the flip to append for a status change.
///
/// Returns `None` when nothing changed. Flip timestamps never go backwards
/// for a check: an `at` earlier than the last recorded flip is clamped to
/// that flip's timestamp, and insertion order breaks the tie.
pub fn record_transition(
    last_flip_at: Option<DateTime<Utc>>,
    old_status: Status,
    new_status: Status,
    at: DateTime<Utc>,
) -> Option<PendingFlip> {
    if old_status == new_status {
        return None;
    }

    let created = match last_flip_at {
        Some(last) if at < last => {
            tracing::warn!(
                "Flip {} -> {} at {} predates last flip at {}, clamping",
                old_status,
                new_status,
                at,
                last
            );
            last
        }
        _ => at,
    };

    Some(PendingFlip {
        created,
        old_status,
        new_status,
    })
}

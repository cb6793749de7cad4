//! Monthly downtime aggregation.
//!
//! Walks the flip history backwards from `now`, splitting it at calendar
//! month boundaries (UTC), and adds up the time spent down in each month.

use crate::db::{Flip, Status};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Serialize, Serializer};

/// Downtime totals for one calendar month.
///
/// `downtime` and `outages` are `None` for months before the check existed,
/// which is different from existing and never being down.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyDowntime {
    pub month_start: DateTime<Utc>,
    #[serde(serialize_with = "serialize_secs")]
    pub downtime: Option<Duration>,
    pub outages: Option<u32>,
}

fn serialize_secs<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_some(&d.num_seconds()),
        None => s.serialize_none(),
    }
}

/// Longest history a downtime report covers, in months.
pub const MAX_MONTHS: u32 = 1200;

/// Start of each of the last `months` calendar months, oldest first, ending
/// with the month containing `now`. `months` is capped at [`MAX_MONTHS`].
pub fn month_boundaries(months: u32, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let months = months.min(MAX_MONTHS);
    let (mut year, mut month) = (now.year(), now.month());
    let mut boundaries = Vec::with_capacity(months as usize);

    for _ in 0..months {
        if let Some(start) = NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.and_hms_opt(0, 0, 0)) {
            boundaries.push(Utc.from_utc_datetime(&start));
        }
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }

    boundaries.reverse();
    boundaries
}

fn month_key(dt: DateTime<Utc>) -> (i32, u32) {
    (dt.year(), dt.month())
}

/// Total downtime and number of outages for each of the last `months`
/// months.
///
/// `flips` must be ordered by creation time (ties in insertion order).
/// `status` is the check's current stored status. Flips recorded after `now`
/// are ignored, so the result only depends on history up to `now`. Down time
/// before `created` is not counted.
pub fn downtimes(
    created: DateTime<Utc>,
    status: Status,
    flips: &[Flip],
    months: u32,
    now: DateTime<Utc>,
) -> Vec<MonthlyDowntime> {
    let boundaries = month_boundaries(months, now);
    let Some(&earliest) = boundaries.first() else {
        return Vec::new();
    };

    // Status in effect at `now`
    let mut status = flips
        .iter()
        .find(|f| f.created > now)
        .map(|f| f.old_status)
        .unwrap_or(status);

    // Boundaries go first so that, walking backwards, flips at the same
    // instant are undone before the boundary is crossed
    let mut events: Vec<(DateTime<Utc>, Option<Status>)> =
        boundaries.iter().map(|b| (*b, None)).collect();
    events.extend(
        flips
            .iter()
            .filter(|f| f.created > earliest && f.created <= now)
            .map(|f| (f.created, Some(f.old_status))),
    );
    events.sort_by_key(|(at, _)| *at);

    let mut totals = vec![(Duration::zero(), 0u32); boundaries.len()];
    let mut cursor = now;

    for (at, old_status) in events.iter().rev() {
        if status == Status::Down {
            let from = (*at).max(created);
            if cursor > from {
                let idx = boundaries.partition_point(|b| b <= at) - 1;
                totals[idx].0 = totals[idx].0 + (cursor - from);
                totals[idx].1 += 1;
            }
        }

        cursor = *at;
        if let Some(old_status) = old_status {
            status = *old_status;
        }
    }

    let created_key = month_key(created);
    boundaries
        .into_iter()
        .zip(totals)
        .map(|(month_start, (downtime, outages))| {
            if month_key(month_start) < created_key {
                MonthlyDowntime {
                    month_start,
                    downtime: None,
                    outages: None,
                }
            } else {
                MonthlyDowntime {
                    month_start,
                    downtime: Some(downtime),
                    outages: Some(outages),
                }
            }
        })
        .collect()
}

//! Five-field cron expressions.
//!
//! Expressions are matched against local wall-clock time in the check's
//! timezone. Each field is kept as a bitset, so finding the next firing is a
//! walk over days with an inner scan of the hour and minute bits.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How far ahead to look for a firing. Any satisfiable day/month combination
/// (including Feb 29) recurs well within this span.
const SEARCH_DAYS: u32 = 366 * 9;

/// Wider than any DST shift in the tz database.
fn fold_window() -> Duration {
    Duration::hours(2)
}

/// Cron parse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid {field} field: {reason}")]
    Field { field: &'static str, reason: String },
    #[error("schedule never fires")]
    NeverFires,
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &["JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC"],
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
};

impl FieldSpec {
    fn error(&self, reason: impl Into<String>) -> CronError {
        CronError::Field {
            field: self.name,
            reason: reason.into(),
        }
    }

    fn value(&self, token: &str) -> Result<u32, CronError> {
        if let Ok(v) = token.parse::<u32>() {
            if v < self.min || v > self.max {
                return Err(self.error(format!(
                    "{} is outside {}-{}",
                    v, self.min, self.max
                )));
            }
            return Ok(v);
        }

        let upper = token.to_ascii_uppercase();
        self.names
            .iter()
            .position(|n| *n == upper)
            .map(|i| self.min + i as u32)
            .ok_or_else(|| self.error(format!("unknown value '{}'", token)))
    }

    fn parse(&self, text: &str) -> Result<u64, CronError> {
        let mut bits = 0u64;

        for item in text.split(',') {
            if item.is_empty() {
                return Err(self.error("empty list item"));
            }

            let (range, step) = match item.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step
                        .parse()
                        .map_err(|_| self.error(format!("bad step '{}'", step)))?;
                    if step == 0 {
                        return Err(self.error("step must be positive"));
                    }
                    (range, Some(step))
                }
                None => (item, None),
            };

            let (lo, hi) = if range == "*" {
                (self.min, self.max)
            } else if let Some((a, b)) = range.split_once('-') {
                let (lo, hi) = (self.value(a)?, self.value(b)?);
                if lo > hi {
                    return Err(self.error(format!("range {} is reversed", range)));
                }
                (lo, hi)
            } else {
                let v = self.value(range)?;
                // "N/step" runs from N to the end of the field
                if step.is_some() {
                    (v, self.max)
                } else {
                    (v, v)
                }
            };

            let step = step.unwrap_or(1);
            let mut v = lo;
            while v <= hi {
                bits |= 1u64 << v;
                v += step;
            }
        }

        Ok(bits)
    }
}

/// A parsed and validated cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    source: String,
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    /// Bit 0 is Sunday.
    weekdays: u64,
    days_restricted: bool,
    weekdays_restricted: bool,
}

impl CronSchedule {
    /// Parse an expression without checking that it ever fires.
    fn parse_fields(source: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = source.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        let mut weekdays = DAY_OF_WEEK.parse(fields[4])?;
        if weekdays & (1u64 << 7) != 0 {
            weekdays = (weekdays | 1) & !(1u64 << 7);
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: MINUTE.parse(fields[0])?,
            hours: HOUR.parse(fields[1])?,
            days: DAY_OF_MONTH.parse(fields[2])?,
            months: MONTH.parse(fields[3])?,
            weekdays,
            days_restricted: !fields[2].starts_with('*'),
            weekdays_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The expression as written (whitespace normalized).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if self.months & (1u64 << date.month()) == 0 {
            return false;
        }

        let dom = self.days & (1u64 << date.day()) != 0;
        let dow = self.weekdays & (1u64 << date.weekday().num_days_from_sunday()) != 0;

        // Vixie cron: when both day fields are restricted either one may match
        if self.days_restricted && self.weekdays_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// The first matching local minute at or after `from`.
    fn next_local(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut date = from.date();
        let (mut from_hour, mut from_minute) = (from.hour(), from.minute());

        for _ in 0..SEARCH_DAYS {
            if self.day_matches(date) {
                for hour in from_hour..24 {
                    if self.hours & (1u64 << hour) == 0 {
                        continue;
                    }
                    let first_minute = if hour == from_hour { from_minute } else { 0 };
                    for minute in first_minute..60 {
                        if self.minutes & (1u64 << minute) != 0 {
                            return date.and_hms_opt(hour, minute, 0);
                        }
                    }
                }
            }

            date = date.succ_opt()?;
            from_hour = 0;
            from_minute = 0;
        }

        None
    }

    /// The earliest firing strictly after `after`, evaluated in `tz`.
    ///
    /// Local times inside a DST gap do not exist and are skipped. A local
    /// time in a DST fold fires at both of its instants, so local order and
    /// UTC order can disagree there; the search keeps going for the width of
    /// a fold past the first hit and returns the smallest instant.
    pub fn next_after(&self, after: DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(tz).naive_local();
        // Back up past any DST fold: a local time just behind `after` may
        // still come round again. Candidates not after `after` are dropped.
        let mut cursor = local.with_second(0)?.with_nanosecond(0)? - fold_window();

        let mut best: Option<DateTime<Utc>> = None;
        let mut horizon: Option<NaiveDateTime> = None;

        while let Some(naive) = self.next_local(cursor) {
            if horizon.is_some_and(|h| naive > h) {
                break;
            }

            for instant in local_instants(tz, naive) {
                if instant > after && best.map_or(true, |b| instant < b) {
                    best = Some(instant);
                    horizon.get_or_insert(naive + fold_window());
                }
            }

            cursor = naive + Duration::minutes(1);
        }

        best
    }
}

/// Every UTC instant a local wall-clock time maps to: none in a gap, two in
/// a fold.
fn local_instants(tz: &Tz, naive: NaiveDateTime) -> Vec<DateTime<Utc>> {
    let instants = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => vec![dt],
        LocalResult::Ambiguous(early, late) => vec![early, late],
        LocalResult::None => vec![],
    };

    instants.into_iter().map(|dt| dt.with_timezone(&Utc)).collect()
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let schedule = Self::parse_fields(s)?;

        let reference = DateTime::<Utc>::from_timestamp(946_684_800, 0).ok_or(CronError::NeverFires)?;
        if schedule.next_after(reference, &chrono_tz::UTC).is_none() {
            return Err(CronError::NeverFires);
        }

        Ok(schedule)
    }
}

impl Default for CronSchedule {
    /// Every minute.
    fn default() -> Self {
        Self {
            source: "* * * * *".to_string(),
            minutes: (1u64 << 60) - 1,
            hours: (1u64 << 24) - 1,
            days: ((1u64 << 32) - 1) & !1,
            months: ((1u64 << 13) - 1) & !1,
            weekdays: (1u64 << 7) - 1,
            days_restricted: false,
            weekdays_restricted: false,
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

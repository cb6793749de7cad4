//! Check scheduling configuration and its validation.
//!
//! Bad schedules are rejected here, when they are set, so the evaluator only
//! ever sees well-formed input.

use super::{CronError, CronSchedule};
use crate::db::{Check, CheckKind};

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest allowed timeout or grace period, in seconds.
pub const MIN_PERIOD_SECS: i64 = 60;
/// Longest allowed timeout or grace period, in seconds (365 days).
pub const MAX_PERIOD_SECS: i64 = 31_536_000;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {source}")]
    InvalidCron {
        expr: String,
        #[source]
        source: CronError,
    },
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("timeout of {0}s is outside 60-31536000s")]
    TimeoutOutOfRange(i64),
    #[error("grace of {0}s is outside 60-31536000s")]
    GraceOutOfRange(i64),
}

/// Scheduling parameters as supplied by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub name: String,
    pub kind: CheckKind,
    pub timeout: i64,
    pub grace: i64,
    pub schedule: String,
    pub tz: String,
    pub manual_resume: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: CheckKind::Simple,
            timeout: 86400,
            grace: 3600,
            schedule: "* * * * *".to_string(),
            tz: "UTC".to_string(),
            manual_resume: false,
        }
    }
}

impl CheckConfig {
    /// Check every field and produce typed values.
    pub fn validate(&self) -> Result<ValidConfig, ScheduleError> {
        if !(MIN_PERIOD_SECS..=MAX_PERIOD_SECS).contains(&self.timeout) {
            return Err(ScheduleError::TimeoutOutOfRange(self.timeout));
        }
        if !(MIN_PERIOD_SECS..=MAX_PERIOD_SECS).contains(&self.grace) {
            return Err(ScheduleError::GraceOutOfRange(self.grace));
        }

        let schedule: CronSchedule =
            self.schedule
                .parse()
                .map_err(|source| ScheduleError::InvalidCron {
                    expr: self.schedule.clone(),
                    source,
                })?;

        Ok(ValidConfig {
            name: self.name.clone(),
            kind: self.kind,
            timeout: Duration::seconds(self.timeout),
            grace: Duration::seconds(self.grace),
            schedule,
            tz: parse_timezone(&self.tz)?,
            manual_resume: self.manual_resume,
        })
    }
}

/// Look up an IANA timezone by name.
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))
}

/// A configuration that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidConfig {
    pub name: String,
    pub kind: CheckKind,
    pub timeout: Duration,
    pub grace: Duration,
    pub schedule: CronSchedule,
    pub tz: Tz,
    pub manual_resume: bool,
}

impl ValidConfig {
    /// Copy the configuration onto a check. Liveness fields are untouched.
    pub fn apply(self, check: &mut Check) {
        check.name = self.name;
        check.kind = self.kind;
        check.timeout = self.timeout;
        check.grace = self.grace;
        check.schedule = self.schedule;
        check.tz = self.tz;
        check.manual_resume = self.manual_resume;
    }
}

//! Database model types.

use crate::schedule::CronSchedule;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stored liveness status of a check.
///
/// `New` and `Paused` are only left through a ping or an explicit resume.
/// `Grace` is never written by the engine; a stored `Grace` is evaluated
/// exactly like `Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    New,
    Up,
    Grace,
    Down,
    Paused,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Up => "up",
            Status::Grace => "grace",
            Status::Down => "down",
            Status::Paused => "paused",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Status::New),
            "up" => Ok(Status::Up),
            "grace" => Ok(Status::Grace),
            "down" => Ok(Status::Down),
            "paused" => Ok(Status::Paused),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// How the next ping is predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Every `timeout` after the last ping.
    Simple,
    /// Whenever the cron `schedule` fires in `tz`.
    Cron,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Simple => "simple",
            CheckKind::Cron => "cron",
        }
    }
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(CheckKind::Simple),
            "cron" => Ok(CheckKind::Cron),
            other => Err(format!("unknown check kind: {}", other)),
        }
    }
}

/// A monitored target expecting periodic pings.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub code: Uuid,
    pub name: String,
    pub kind: CheckKind,
    pub timeout: Duration,
    pub grace: Duration,
    pub schedule: CronSchedule,
    pub tz: Tz,
    pub status: Status,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_start: Option<DateTime<Utc>>,
    pub last_duration: Option<Duration>,
    pub manual_resume: bool,
    /// When the check goes down unless it hears from the client first.
    pub alert_after: Option<DateTime<Utc>>,
    pub n_pings: i64,
    pub created: DateTime<Utc>,
}

impl Check {
    /// A fresh check with default scheduling: a ping a day, one hour of grace.
    pub fn new(created: DateTime<Utc>) -> Self {
        Self {
            code: Uuid::new_v4(),
            name: String::new(),
            kind: CheckKind::Simple,
            timeout: Duration::days(1),
            grace: Duration::hours(1),
            schedule: CronSchedule::default(),
            tz: chrono_tz::UTC,
            status: Status::New,
            last_ping: None,
            last_start: None,
            last_duration: None,
            manual_resume: false,
            alert_after: None,
            n_pings: 0,
            created,
        }
    }
}

/// An immutable record of a status transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flip {
    pub id: i64,
    pub check_code: Uuid,
    pub created: DateTime<Utc>,
    pub old_status: Status,
    pub new_status: Status,
    /// When the flip was claimed for notification.
    pub processed: Option<DateTime<Utc>>,
}

impl Flip {
    /// Whether this transition warrants an alert.
    ///
    /// Coming up for the first time or after a pause is not news.
    pub fn is_alertable(&self) -> bool {
        match self.new_status {
            Status::Down => true,
            Status::Up => !matches!(self.old_status, Status::New | Status::Paused),
            _ => false,
        }
    }
}

/// A flip about to be appended, not yet assigned an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFlip {
    pub created: DateTime<Utc>,
    pub old_status: Status,
    pub new_status: Status,
}

/// Persisted rate-limit budget for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    pub value: String,
    pub tokens: f64,
    pub updated: DateTime<Utc>,
}

/// Range restriction when listing flips.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlipFilter {
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: Option<DateTime<Utc>>,
}

impl FlipFilter {
    /// Flips from the last `seconds` before `now`.
    pub fn last(seconds: i64, now: DateTime<Utc>) -> Self {
        Self {
            start: Some(now - Duration::seconds(seconds)),
            end: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [Status::New, Status::Up, Status::Grace, Status::Down, Status::Paused] {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
        assert!("started".parse::<Status>().is_err());
    }

    #[test]
    fn test_new_check_defaults() {
        let created = Utc::now();
        let check = Check::new(created);
        assert_eq!(check.status, Status::New);
        assert_eq!(check.kind, CheckKind::Simple);
        assert_eq!(check.timeout, Duration::days(1));
        assert_eq!(check.grace, Duration::hours(1));
        assert_eq!(check.schedule.as_str(), "* * * * *");
        assert_eq!(check.tz, chrono_tz::UTC);
        assert_eq!(check.created, created);
    }

    #[test]
    fn test_flip_alertable() {
        let flip = |old_status, new_status| Flip {
            id: 1,
            check_code: Uuid::nil(),
            created: Utc::now(),
            old_status,
            new_status,
            processed: None,
        };

        assert!(flip(Status::Up, Status::Down).is_alertable());
        assert!(flip(Status::Paused, Status::Down).is_alertable());
        assert!(flip(Status::Down, Status::Up).is_alertable());
        assert!(!flip(Status::New, Status::Up).is_alertable());
        assert!(!flip(Status::Paused, Status::Up).is_alertable());
        assert!(!flip(Status::Up, Status::Paused).is_alertable());
        assert!(!flip(Status::Paused, Status::New).is_alertable());
    }
}

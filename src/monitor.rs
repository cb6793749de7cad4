//! The monitoring facade.
//!
//! Every state change of a check goes through here. Each operation loads the
//! check inside an immediate transaction, runs the pure engine functions on
//! it and commits the new state together with any flip, so concurrent pings
//! and sweeps never record the same transition twice.

use crate::clock::Clock;
use crate::db::{Check, DbError, Flip, FlipFilter, Status, Store};
use crate::engine::{self, DisplayStatus, MonthlyDowntime, Signal, Summary};
use crate::ratelimit::{BucketPolicy, RateLimiter};
use crate::schedule::{self, CheckConfig, ScheduleError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ScheduleError),
}

/// Result of an operation that may change a check's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Stored status after the operation.
    pub status: Status,
    /// Whether a flip was recorded.
    pub flipped: bool,
}

impl Outcome {
    fn unchanged(status: Status) -> Self {
        Self {
            status,
            flipped: false,
        }
    }
}

pub struct Monitor {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
}

impl Monitor {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        let limiter = RateLimiter::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            limiter,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // --- Configuration ---

    /// Create a check from user-supplied configuration.
    pub fn create_check(&self, config: &CheckConfig) -> Result<Check, MonitorError> {
        let valid = config.validate()?;

        let mut check = Check::new(self.clock.now());
        valid.apply(&mut check);
        check.alert_after = schedule::down_after(&check);

        self.store.insert_check(&check)?;
        tracing::info!("Created check {} ({})", check.code, check.name);
        Ok(check)
    }

    /// Replace a check's configuration. The status is left alone; only the
    /// time at which it goes down is recomputed.
    pub fn update_check(&self, code: Uuid, config: &CheckConfig) -> Result<Check, MonitorError> {
        let valid = config.validate()?;

        self.store.with_check(code, |check, _| {
            valid.apply(check);
            check.alert_after = schedule::down_after(check);
            Ok((check.clone(), None))
        })
    }

    pub fn get_check(&self, code: Uuid) -> Result<Check, MonitorError> {
        Ok(self.store.get_check(code)?)
    }

    pub fn delete_check(&self, code: Uuid) -> Result<(), MonitorError> {
        self.store.delete_check(code)?;
        tracing::info!("Deleted check {}", code);
        Ok(())
    }

    // --- Status changes ---

    /// Handle a ping received at `at`.
    pub fn on_ping_received(
        &self,
        code: Uuid,
        signal: Signal,
        at: DateTime<Utc>,
    ) -> Result<Outcome, MonitorError> {
        self.store.with_check(code, |check, last_flip_at| {
            let old = check.status;

            let Some(new) = engine::apply_signal(check, signal, at) else {
                tracing::warn!("Ignoring {:?} ping for paused check {}", signal, code);
                return Ok((Outcome::unchanged(old), None));
            };

            let flip = engine::record_transition(last_flip_at, old, new, at);
            check.status = new;
            check.alert_after = schedule::down_after(check);

            tracing::debug!("Check {} pinged ({:?}): {} -> {}", code, signal, old, new);
            Ok((
                Outcome {
                    status: new,
                    flipped: flip.is_some(),
                },
                flip,
            ))
        })
    }

    /// Re-evaluate a check on behalf of the sweeper.
    ///
    /// The only change a sweep persists is the move to `Down`, stamped with
    /// the instant the grace window closed. A ping that landed since the
    /// check was found due is seen here and wins.
    pub fn on_sweep_tick(&self, code: Uuid, now: DateTime<Utc>) -> Result<Outcome, MonitorError> {
        self.store.with_check(code, |check, last_flip_at| {
            let old = check.status;
            let deadline = schedule::down_after(check);

            if engine::settled_status(check, now) != Status::Down || old == Status::Down {
                check.alert_after = deadline;
                return Ok((Outcome::unchanged(old), None));
            }

            let at = deadline.filter(|d| *d <= now).unwrap_or(now);
            let flip = engine::record_transition(last_flip_at, old, Status::Down, at);
            check.status = Status::Down;
            check.alert_after = None;

            tracing::info!("Check {} went down at {}", code, at);
            Ok((
                Outcome {
                    status: Status::Down,
                    flipped: flip.is_some(),
                },
                flip,
            ))
        })
    }

    /// Stop monitoring a check until it is resumed or, unless it requires a
    /// manual resume, pinged again.
    pub fn pause(&self, code: Uuid) -> Result<Outcome, MonitorError> {
        let now = self.clock.now();

        self.store.with_check(code, |check, last_flip_at| {
            let old = check.status;
            check.status = Status::Paused;
            check.last_start = None;
            check.alert_after = None;

            let flip = engine::record_transition(last_flip_at, old, Status::Paused, now);
            if flip.is_some() {
                tracing::info!("Paused check {}", code);
            }
            Ok((
                Outcome {
                    status: Status::Paused,
                    flipped: flip.is_some(),
                },
                flip,
            ))
        })
    }

    /// Take a paused check back to `New`. Checks that are not paused are left
    /// as they are.
    pub fn resume(&self, code: Uuid) -> Result<Outcome, MonitorError> {
        let now = self.clock.now();

        self.store.with_check(code, |check, last_flip_at| {
            let old = check.status;
            if old != Status::Paused {
                return Ok((Outcome::unchanged(old), None));
            }

            check.status = Status::New;
            check.last_ping = None;
            check.last_start = None;
            check.alert_after = None;

            let flip = engine::record_transition(last_flip_at, old, Status::New, now);
            tracing::info!("Resumed check {}", code);
            Ok((
                Outcome {
                    status: Status::New,
                    flipped: flip.is_some(),
                },
                flip,
            ))
        })
    }

    // --- Views ---

    pub fn compute_status(&self, check: &Check, now: DateTime<Utc>, with_started: bool) -> DisplayStatus {
        engine::compute_status(check, now, with_started)
    }

    /// Overall status of a group of checks at `now`.
    pub fn summarize(&self, checks: &[Check], now: DateTime<Utc>, with_late: bool) -> Summary {
        engine::summarize(
            checks.iter().map(|c| engine::compute_status(c, now, false)),
            with_late,
        )
    }

    /// Downtime per month for the last `months` months, as of `now`.
    pub fn downtimes(
        &self,
        code: Uuid,
        months: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<MonthlyDowntime>, MonitorError> {
        let check = self.store.get_check(code)?;

        let boundaries = engine::month_boundaries(months, now);
        let filter = FlipFilter {
            start: boundaries.first().copied(),
            end: None,
        };
        let flips = self.store.get_flips(code, &filter)?;

        Ok(engine::downtimes(check.created, check.status, &flips, months, now))
    }

    pub fn flips(&self, code: Uuid, filter: &FlipFilter) -> Result<Vec<Flip>, MonitorError> {
        Ok(self.store.get_flips(code, filter)?)
    }

    pub fn due_checks(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, MonitorError> {
        Ok(self.store.due_checks(now)?)
    }

    // --- Rate limiting ---

    pub fn rate_limit_allow(&self, key: &str, policy: &BucketPolicy) -> Result<bool, MonitorError> {
        Ok(self.limiter.allow(key, policy)?)
    }
}

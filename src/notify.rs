//! Delivery of flip notifications.

use crate::db::{Check, Flip, Status};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Something that tells people a check changed state.
pub trait Notifier: Send + Sync {
    fn notify(&self, check: &Check, flip: &Flip) -> Result<(), NotifyError>;
}

/// What a notification says about a flip.
#[derive(Debug, Clone, Serialize)]
pub struct FlipEvent<'a> {
    pub check: Uuid,
    pub name: &'a str,
    pub old_status: Status,
    pub new_status: Status,
    pub at: DateTime<Utc>,
    pub n_pings: i64,
    pub last_ping: Option<DateTime<Utc>>,
}

impl<'a> FlipEvent<'a> {
    pub fn new(check: &'a Check, flip: &Flip) -> Self {
        Self {
            check: check.code,
            name: &check.name,
            old_status: flip.old_status,
            new_status: flip.new_status,
            at: flip.created,
            n_pings: check.n_pings,
            last_ping: check.last_ping,
        }
    }
}

/// Writes each notification to the log as JSON.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, check: &Check, flip: &Flip) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&FlipEvent::new(check, flip))?;
        tracing::info!(check = %check.code, status = %flip.new_status, "{}", payload);
        Ok(())
    }
}

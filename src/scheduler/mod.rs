//! Background sweeper.
//!
//! Periodically finds checks whose deadline has passed, lets the monitor
//! mark them down, and hands freshly recorded flips to a notifier.

use crate::db::{DbError, Flip};
use crate::monitor::{Monitor, MonitorError};
use crate::notify::Notifier;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Flips handed to the notifier per sweep.
const NOTIFY_BATCH: u32 = 100;

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub due: usize,
    pub went_down: usize,
    pub notified: usize,
}

/// Runs [`sweep_once`] on an interval until stopped.
pub struct Sweeper {
    monitor: Arc<Monitor>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    stop: broadcast::Sender<()>,
}

impl Sweeper {
    pub fn new(monitor: Arc<Monitor>, notifier: Arc<dyn Notifier>, interval: Duration) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            monitor,
            notifier,
            interval,
            stop,
        }
    }

    /// Start the sweeper background task.
    pub fn start(&self) -> JoinHandle<()> {
        let monitor = self.monitor.clone();
        let notifier = self.notifier.clone();
        let period = self.interval;
        let mut rx = self.stop.subscribe();

        tokio::spawn(async move {
            // Add jitter so several instances don't sweep in lockstep
            let jitter = rand::random::<u64>() % 250;
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            tracing::info!("Sweeper started, interval {:?}", period);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        let now = monitor.now();
                        let stats = sweep_once(&monitor, notifier.as_ref(), now);
                        if stats.went_down > 0 || stats.notified > 0 {
                            tracing::debug!("Sweep at {}: {:?}", now, stats);
                        }
                    }
                }
            }

            tracing::info!("Sweeper stopped");
        })
    }

    /// Stop the sweeper.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

/// Sweep all due checks, then deliver pending notifications.
///
/// Failures are logged and skipped so one bad check cannot stall the rest.
pub fn sweep_once(monitor: &Monitor, notifier: &dyn Notifier, now: DateTime<Utc>) -> SweepStats {
    let mut stats = SweepStats::default();

    let due = match monitor.due_checks(now) {
        Ok(codes) => codes,
        Err(e) => {
            tracing::error!("Sweeper: Failed to get due checks: {}", e);
            return stats;
        }
    };
    stats.due = due.len();

    for code in due {
        match monitor.on_sweep_tick(code, now) {
            Ok(outcome) if outcome.flipped => stats.went_down += 1,
            Ok(_) => {}
            // Deleted since it was found due
            Err(MonitorError::Db(DbError::NotFound)) => {}
            Err(e) => tracing::error!("Sweeper: Failed to sweep check {}: {}", code, e),
        }
    }

    stats.notified = notify_pending(monitor, notifier, now);
    stats
}

fn notify_pending(monitor: &Monitor, notifier: &dyn Notifier, now: DateTime<Utc>) -> usize {
    let store = monitor.store();

    let flips = match store.unprocessed_flips(NOTIFY_BATCH) {
        Ok(flips) => flips,
        Err(e) => {
            tracing::error!("Sweeper: Failed to get pending flips: {}", e);
            return 0;
        }
    };

    let mut notified = 0;
    for flip in flips {
        match store.claim_flip(flip.id, now) {
            Ok(true) => {}
            // Another sweeper has it
            Ok(false) => continue,
            Err(e) => {
                tracing::error!("Sweeper: Failed to claim flip {}: {}", flip.id, e);
                continue;
            }
        }

        if !flip.is_alertable() {
            continue;
        }

        if deliver(monitor, notifier, &flip) {
            notified += 1;
        }
    }
    notified
}

fn deliver(monitor: &Monitor, notifier: &dyn Notifier, flip: &Flip) -> bool {
    let check = match monitor.get_check(flip.check_code) {
        Ok(check) => check,
        Err(e) => {
            tracing::warn!("Sweeper: Dropping flip {} for check {}: {}", flip.id, flip.check_code, e);
            return false;
        }
    };

    match notifier.notify(&check, flip) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Sweeper: Failed to notify for check {}: {}", check.code, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::db::{Check, Status, Store};
    use crate::engine::Signal;
    use crate::notify::NotifyError;
    use crate::schedule::CheckConfig;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;
    use tempfile::NamedTempFile;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Uuid, Status, Status)>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, check: &Check, flip: &Flip) -> Result<(), NotifyError> {
            self.seen
                .lock()
                .unwrap()
                .push((check.code, flip.old_status, flip.new_status));
            Ok(())
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    fn setup(tmp: &NamedTempFile) -> (Arc<Monitor>, Uuid) {
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let clock = Arc::new(FixedClock::new(start() + ChronoDuration::hours(2)));
        let monitor = Arc::new(Monitor::new(store, clock));

        let config = CheckConfig {
            timeout: 3600,
            grace: 600,
            ..Default::default()
        };
        let code = monitor.create_check(&config).unwrap().code;
        monitor.on_ping_received(code, Signal::Success, start()).unwrap();
        (monitor, code)
    }

    #[test]
    fn test_sweep_once() {
        let tmp = NamedTempFile::new().unwrap();
        let (monitor, code) = setup(&tmp);
        let recorder = Recorder::default();

        let stats = sweep_once(&monitor, &recorder, monitor.now());
        assert_eq!(stats, SweepStats { due: 1, went_down: 1, notified: 1 });

        // new -> up is not news, up -> down is
        assert_eq!(*recorder.seen.lock().unwrap(), vec![(code, Status::Up, Status::Down)]);
        assert!(monitor.store().unprocessed_flips(10).unwrap().is_empty());

        let stats = sweep_once(&monitor, &recorder, monitor.now());
        assert_eq!(stats, SweepStats::default());
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_skips_deleted_checks() {
        let tmp = NamedTempFile::new().unwrap();
        let (monitor, code) = setup(&tmp);
        monitor.delete_check(code).unwrap();

        let recorder = Recorder::default();
        let stats = sweep_once(&monitor, &recorder, monitor.now());
        assert_eq!(stats, SweepStats::default());
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_runs_until_stopped() {
        let tmp = NamedTempFile::new().unwrap();
        let (monitor, code) = setup(&tmp);
        let recorder = Arc::new(Recorder::default());

        let sweeper = Sweeper::new(monitor.clone(), recorder.clone(), Duration::from_millis(10));
        let handle = sweeper.start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        sweeper.stop();
        handle.await.unwrap();

        assert_eq!(monitor.get_check(code).unwrap().status, Status::Down);
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }
}

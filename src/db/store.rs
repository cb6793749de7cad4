//! SQLite database store implementation.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row, TransactionBehavior};
use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use super::models::*;
use crate::schedule::CronSchedule;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const CHECK_COLUMNS: &str = "code, name, kind, timeout, grace, schedule, tz, status, last_ping, \
     last_start, last_duration_ms, manual_resume, alert_after, n_pings, created";

const FLIP_COLUMNS: &str = "id, check_code, created, old_status, new_status, processed";

/// Thread-safe database store.
///
/// Every read-modify-write runs in a `BEGIN IMMEDIATE` transaction, which
/// takes SQLite's write lock up front. That serializes writers across
/// connections and processes sharing the file, not just across threads.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Run migrations inline (embedded SQL)
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    // --- Check CRUD ---

    /// Insert a new check.
    pub fn insert_check(&self, check: &Check) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO checks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                CHECK_COLUMNS
            ),
            params![
                check.code.to_string(),
                check.name,
                check.kind.as_str(),
                check.timeout.num_seconds(),
                check.grace.num_seconds(),
                check.schedule.as_str(),
                check.tz.name(),
                check.status.as_str(),
                check.last_ping.as_ref().map(format_db_time),
                check.last_start.as_ref().map(format_db_time),
                check.last_duration.map(|d| d.num_milliseconds()),
                check.manual_resume,
                check.alert_after.as_ref().map(format_db_time),
                check.n_pings,
                format_db_time(&check.created),
            ],
        )?;
        Ok(())
    }

    /// Get a check by code.
    pub fn get_check(&self, code: Uuid) -> Result<Check, DbError> {
        let conn = self.conn.lock().unwrap();
        select_check(&conn, code)
    }

    /// Get all checks, oldest first.
    pub fn get_checks(&self) -> Result<Vec<Check>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM checks ORDER BY created, code",
            CHECK_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], CheckRow::from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        rows.into_iter().map(CheckRow::into_check).collect()
    }

    /// Delete a check. Its flips go with it.
    pub fn delete_check(&self, code: Uuid) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM checks WHERE code = ?1", params![code.to_string()])?;
        if deleted == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Run a read-modify-write on one check inside an immediate transaction.
    ///
    /// `f` gets the current row and the timestamp of the check's latest flip.
    /// It mutates the check in place and may return a flip to append. The
    /// row (if changed) and the flip are committed together; if `f` fails,
    /// nothing is written.
    pub fn with_check<R, E, F>(&self, code: Uuid, f: F) -> Result<R, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut Check, Option<DateTime<Utc>>) -> Result<(R, Option<PendingFlip>), E>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DbError::from)?;

        let mut check = select_check(&tx, code)?;
        let before = check.clone();
        let last_flip_at = last_flip_time(&tx, code)?;

        let (result, flip) = f(&mut check, last_flip_at)?;

        if check != before {
            update_check_row(&tx, &check)?;
        }
        if let Some(flip) = flip {
            insert_flip(&tx, code, &flip)?;
        }

        tx.commit().map_err(DbError::from)?;
        Ok(result)
    }

    /// Codes of checks that are not down and whose `alert_after` is at or
    /// before `now`, most overdue first.
    pub fn due_checks(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT code FROM checks WHERE status != 'down' AND alert_after IS NOT NULL AND alert_after <= ?1 ORDER BY alert_after",
        )?;

        let codes = stmt
            .query_map(params![format_db_time(&now)], |row| row.get::<_, String>(0))?
            .collect::<SqlResult<Vec<_>>>()?;

        codes.iter().map(|code| decode_uuid(code)).collect()
    }

    // --- Flips ---

    /// Flips of one check, ordered by time with ties in insertion order.
    pub fn get_flips(&self, code: Uuid, filter: &FlipFilter) -> Result<Vec<Flip>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM flips WHERE check_code = ?1 AND (?2 IS NULL OR created >= ?2) AND (?3 IS NULL OR created < ?3) ORDER BY created, id",
            FLIP_COLUMNS
        ))?;

        let rows = stmt
            .query_map(
                params![
                    code.to_string(),
                    filter.start.as_ref().map(format_db_time),
                    filter.end.as_ref().map(format_db_time),
                ],
                FlipRow::from_row,
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        rows.into_iter().map(FlipRow::into_flip).collect()
    }

    /// Oldest flips not yet handed to the notifier.
    pub fn unprocessed_flips(&self, limit: u32) -> Result<Vec<Flip>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM flips WHERE processed IS NULL ORDER BY id LIMIT ?1",
            FLIP_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit], FlipRow::from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        rows.into_iter().map(FlipRow::into_flip).collect()
    }

    /// Mark a flip processed. Returns `false` if someone else got there
    /// first.
    pub fn claim_flip(&self, id: i64, now: DateTime<Utc>) -> Result<bool, DbError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE flips SET processed = ?1 WHERE id = ?2 AND processed IS NULL",
            params![format_db_time(&now), id],
        )?;
        Ok(updated == 1)
    }

    // --- Token buckets ---

    /// Get a bucket by key.
    pub fn get_bucket(&self, value: &str) -> Result<Option<TokenBucket>, DbError> {
        let conn = self.conn.lock().unwrap();
        select_bucket(&conn, value)
    }

    /// Run a read-modify-write on one bucket inside an immediate transaction.
    ///
    /// `f` gets the stored bucket, if any, and returns the bucket to store.
    pub fn with_bucket<R, F>(&self, value: &str, f: F) -> Result<R, DbError>
    where
        F: FnOnce(Option<TokenBucket>) -> (TokenBucket, R),
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = select_bucket(&tx, value)?;
        let (bucket, result) = f(current);

        tx.execute(
            "INSERT INTO token_buckets (value, tokens, updated) VALUES (?1, ?2, ?3)
             ON CONFLICT (value) DO UPDATE SET tokens = excluded.tokens, updated = excluded.updated",
            params![bucket.value, bucket.tokens, format_db_time(&bucket.updated)],
        )?;

        tx.commit()?;
        Ok(result)
    }
}

fn select_check(conn: &Connection, code: Uuid) -> Result<Check, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM checks WHERE code = ?1", CHECK_COLUMNS),
            params![code.to_string()],
            CheckRow::from_row,
        )
        .optional()?;

    row.ok_or(DbError::NotFound)?.into_check()
}

fn update_check_row(conn: &Connection, check: &Check) -> Result<(), DbError> {
    conn.execute(
        "UPDATE checks SET name=?1, kind=?2, timeout=?3, grace=?4, schedule=?5, tz=?6, status=?7, last_ping=?8, last_start=?9, last_duration_ms=?10, manual_resume=?11, alert_after=?12, n_pings=?13 WHERE code=?14",
        params![
            check.name,
            check.kind.as_str(),
            check.timeout.num_seconds(),
            check.grace.num_seconds(),
            check.schedule.as_str(),
            check.tz.name(),
            check.status.as_str(),
            check.last_ping.as_ref().map(format_db_time),
            check.last_start.as_ref().map(format_db_time),
            check.last_duration.map(|d| d.num_milliseconds()),
            check.manual_resume,
            check.alert_after.as_ref().map(format_db_time),
            check.n_pings,
            check.code.to_string(),
        ],
    )?;
    Ok(())
}

fn last_flip_time(conn: &Connection, code: Uuid) -> Result<Option<DateTime<Utc>>, DbError> {
    let result: Option<String> = conn.query_row(
        "SELECT MAX(created) FROM flips WHERE check_code = ?1",
        params![code.to_string()],
        |row| row.get(0),
    )?;
    result.map(|s| decode_time("flips.created", &s)).transpose()
}

fn insert_flip(conn: &Connection, code: Uuid, flip: &PendingFlip) -> Result<i64, DbError> {
    conn.execute(
        "INSERT INTO flips (check_code, created, old_status, new_status) VALUES (?1, ?2, ?3, ?4)",
        params![
            code.to_string(),
            format_db_time(&flip.created),
            flip.old_status.as_str(),
            flip.new_status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn select_bucket(conn: &Connection, value: &str) -> Result<Option<TokenBucket>, DbError> {
    let row: Option<(String, f64, String)> = conn
        .query_row(
            "SELECT value, tokens, updated FROM token_buckets WHERE value = ?1",
            params![value],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    row.map(|(value, tokens, updated)| {
        Ok(TokenBucket {
            value,
            tokens,
            updated: decode_time("token_buckets.updated", &updated)?,
        })
    })
    .transpose()
}

/// A `checks` row as stored, before decoding.
struct CheckRow {
    code: String,
    name: String,
    kind: String,
    timeout: i64,
    grace: i64,
    schedule: String,
    tz: String,
    status: String,
    last_ping: Option<String>,
    last_start: Option<String>,
    last_duration_ms: Option<i64>,
    manual_resume: bool,
    alert_after: Option<String>,
    n_pings: i64,
    created: String,
}

impl CheckRow {
    fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            code: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            timeout: row.get(3)?,
            grace: row.get(4)?,
            schedule: row.get(5)?,
            tz: row.get(6)?,
            status: row.get(7)?,
            last_ping: row.get(8)?,
            last_start: row.get(9)?,
            last_duration_ms: row.get(10)?,
            manual_resume: row.get(11)?,
            alert_after: row.get(12)?,
            n_pings: row.get(13)?,
            created: row.get(14)?,
        })
    }

    fn into_check(self) -> Result<Check, DbError> {
        let schedule: CronSchedule = self
            .schedule
            .parse()
            .map_err(|e| corrupt("checks.schedule", &self.schedule, e))?;
        let tz: Tz = self.tz.parse().map_err(|e| corrupt("checks.tz", &self.tz, e))?;

        Ok(Check {
            code: decode_uuid(&self.code)?,
            name: self.name,
            kind: self.kind.parse().map_err(|e| corrupt("checks.kind", &self.kind, e))?,
            timeout: Duration::seconds(self.timeout),
            grace: Duration::seconds(self.grace),
            schedule,
            tz,
            status: self
                .status
                .parse()
                .map_err(|e| corrupt("checks.status", &self.status, e))?,
            last_ping: decode_opt_time("checks.last_ping", self.last_ping)?,
            last_start: decode_opt_time("checks.last_start", self.last_start)?,
            last_duration: self.last_duration_ms.map(Duration::milliseconds),
            manual_resume: self.manual_resume,
            alert_after: decode_opt_time("checks.alert_after", self.alert_after)?,
            n_pings: self.n_pings,
            created: decode_time("checks.created", &self.created)?,
        })
    }
}

/// A `flips` row as stored, before decoding.
struct FlipRow {
    id: i64,
    check_code: String,
    created: String,
    old_status: String,
    new_status: String,
    processed: Option<String>,
}

impl FlipRow {
    fn from_row(row: &Row<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: row.get(0)?,
            check_code: row.get(1)?,
            created: row.get(2)?,
            old_status: row.get(3)?,
            new_status: row.get(4)?,
            processed: row.get(5)?,
        })
    }

    fn into_flip(self) -> Result<Flip, DbError> {
        Ok(Flip {
            id: self.id,
            check_code: decode_uuid(&self.check_code)?,
            created: decode_time("flips.created", &self.created)?,
            old_status: self
                .old_status
                .parse()
                .map_err(|e| corrupt("flips.old_status", &self.old_status, e))?,
            new_status: self
                .new_status
                .parse()
                .map_err(|e| corrupt("flips.new_status", &self.new_status, e))?,
            processed: decode_opt_time("flips.processed", self.processed)?,
        })
    }
}

fn corrupt(column: &str, value: &str, err: impl Display) -> DbError {
    DbError::Corrupt(format!("{} = '{}': {}", column, value, err))
}

fn decode_uuid(s: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(s).map_err(|e| corrupt("code", s, e))
}

fn decode_time(column: &str, s: &str) -> Result<DateTime<Utc>, DbError> {
    parse_db_time(s).ok_or_else(|| corrupt(column, s, "not a timestamp"))
}

fn decode_opt_time(column: &str, s: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    s.map(|s| decode_time(column, &s)).transpose()
}

/// Fixed-width UTC text, so that lexical order is chronological.
fn format_db_time(t: &DateTime<Utc>) -> String {
    t.format(DB_TIME_FORMAT).to_string()
}

fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    // Try various formats
    let formats = [
        DB_TIME_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    // Try ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 15, h, 0, 0).unwrap()
    }

    fn flip(created: DateTime<Utc>, old_status: Status, new_status: Status) -> PendingFlip {
        PendingFlip {
            created,
            old_status,
            new_status,
        }
    }

    fn open() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_check_crud() {
        let (_tmp, store) = open();

        // Create
        let mut check = Check::new(at(0));
        check.name = "Backups".to_string();
        check.kind = CheckKind::Cron;
        check.schedule = "30 2 * * 1-5".parse().unwrap();
        check.tz = chrono_tz::Europe::Riga;
        check.last_ping = Some(at(1));
        check.last_duration = Some(Duration::milliseconds(1500));
        check.alert_after = Some(at(5));
        store.insert_check(&check).unwrap();

        // Read
        let fetched = store.get_check(check.code).unwrap();
        assert_eq!(fetched, check);
        assert_eq!(store.get_checks().unwrap(), vec![check.clone()]);

        // Update
        store
            .with_check::<_, DbError, _>(check.code, |c, _| {
                c.name = "Nightly backups".to_string();
                Ok(((), None))
            })
            .unwrap();
        assert_eq!(store.get_check(check.code).unwrap().name, "Nightly backups");

        // Delete
        store.delete_check(check.code).unwrap();
        assert!(matches!(store.get_check(check.code), Err(DbError::NotFound)));
        assert!(matches!(store.delete_check(check.code), Err(DbError::NotFound)));
    }

    #[test]
    fn test_with_check_commits_status_and_flip_together() {
        let (_tmp, store) = open();
        let check = Check::new(at(0));
        store.insert_check(&check).unwrap();

        let last = store
            .with_check::<_, DbError, _>(check.code, |c, last_flip_at| {
                c.status = Status::Up;
                Ok((last_flip_at, Some(flip(at(1), Status::New, Status::Up))))
            })
            .unwrap();
        assert_eq!(last, None);

        let last = store
            .with_check::<_, DbError, _>(check.code, |_, last_flip_at| Ok((last_flip_at, None)))
            .unwrap();
        assert_eq!(last, Some(at(1)));

        assert_eq!(store.get_check(check.code).unwrap().status, Status::Up);
        let flips = store.get_flips(check.code, &FlipFilter::default()).unwrap();
        assert_eq!(flips.len(), 1);
        assert_eq!(flips[0].check_code, check.code);
        assert_eq!(flips[0].created, at(1));
        assert_eq!((flips[0].old_status, flips[0].new_status), (Status::New, Status::Up));
        assert_eq!(flips[0].processed, None);
    }

    #[test]
    fn test_with_check_rolls_back_on_error() {
        let (_tmp, store) = open();
        let check = Check::new(at(0));
        store.insert_check(&check).unwrap();

        let result = store.with_check::<(), DbError, _>(check.code, |c, _| {
            c.status = Status::Down;
            Err(DbError::Corrupt("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.get_check(check.code).unwrap().status, Status::New);

        let missing = store.with_check::<(), DbError, _>(Uuid::new_v4(), |_, _| Ok(((), None)));
        assert!(matches!(missing, Err(DbError::NotFound)));
    }

    #[test]
    fn test_due_checks() {
        let (_tmp, store) = open();

        let mut overdue = Check::new(at(0));
        overdue.status = Status::Up;
        overdue.alert_after = Some(at(2));
        let mut on_time = Check::new(at(0));
        on_time.status = Status::Up;
        on_time.alert_after = Some(at(3));
        let mut later = Check::new(at(0));
        later.status = Status::Up;
        later.alert_after = Some(at(4));
        let mut down = Check::new(at(0));
        down.status = Status::Down;
        down.alert_after = Some(at(1));
        let idle = Check::new(at(0));

        for check in [&overdue, &on_time, &later, &down, &idle] {
            store.insert_check(check).unwrap();
        }

        assert_eq!(store.due_checks(at(3)).unwrap(), vec![overdue.code, on_time.code]);
    }

    #[test]
    fn test_flips_filter_and_order() {
        let (_tmp, store) = open();
        let check = Check::new(at(0));
        store.insert_check(&check).unwrap();

        let pending = [
            flip(at(1), Status::New, Status::Up),
            flip(at(2), Status::Up, Status::Down),
            // Same instant; insertion order decides
            flip(at(2), Status::Down, Status::Up),
            flip(at(4), Status::Up, Status::Paused),
        ];
        for p in pending {
            store
                .with_check::<_, DbError, _>(check.code, |_, _| Ok(((), Some(p))))
                .unwrap();
        }

        let all = store.get_flips(check.code, &FlipFilter::default()).unwrap();
        let statuses: Vec<_> = all.iter().map(|f| f.new_status).collect();
        assert_eq!(statuses, vec![Status::Up, Status::Down, Status::Up, Status::Paused]);
        assert!(all[1].id < all[2].id);

        let window = FlipFilter {
            start: Some(at(2)),
            end: Some(at(4)),
        };
        assert_eq!(store.get_flips(check.code, &window).unwrap().len(), 2);
        assert_eq!(store.get_flips(check.code, &FlipFilter::last(3600, at(4))).unwrap().len(), 1);
    }

    #[test]
    fn test_claim_flip_once() {
        let (_tmp, store) = open();
        let check = Check::new(at(0));
        store.insert_check(&check).unwrap();
        store
            .with_check::<_, DbError, _>(check.code, |_, _| {
                Ok(((), Some(flip(at(1), Status::Up, Status::Down))))
            })
            .unwrap();

        let pending = store.unprocessed_flips(10).unwrap();
        assert_eq!(pending.len(), 1);

        assert!(store.claim_flip(pending[0].id, at(2)).unwrap());
        assert!(!store.claim_flip(pending[0].id, at(3)).unwrap());
        assert!(store.unprocessed_flips(10).unwrap().is_empty());

        let flips = store.get_flips(check.code, &FlipFilter::default()).unwrap();
        assert_eq!(flips[0].processed, Some(at(2)));
    }

    #[test]
    fn test_deleting_check_removes_flips() {
        let (_tmp, store) = open();
        let check = Check::new(at(0));
        store.insert_check(&check).unwrap();
        store
            .with_check::<_, DbError, _>(check.code, |_, _| {
                Ok(((), Some(flip(at(1), Status::New, Status::Up))))
            })
            .unwrap();

        store.delete_check(check.code).unwrap();
        assert!(store.unprocessed_flips(10).unwrap().is_empty());
    }

    #[test]
    fn test_bucket_upsert() {
        let (_tmp, store) = open();
        assert_eq!(store.get_bucket("k").unwrap(), None);

        let seen = store
            .with_bucket("k", |current| {
                let bucket = TokenBucket {
                    value: "k".to_string(),
                    tokens: 2.5,
                    updated: at(1),
                };
                (bucket, current.is_some())
            })
            .unwrap();
        assert!(!seen);

        let seen = store
            .with_bucket("k", |current| {
                let mut bucket = current.clone().unwrap();
                bucket.tokens -= 1.0;
                (bucket, current.is_some())
            })
            .unwrap();
        assert!(seen);

        let bucket = store.get_bucket("k").unwrap().unwrap();
        assert_eq!(bucket.tokens, 1.5);
        assert_eq!(bucket.updated, at(1));
    }

    #[test]
    fn test_corrupt_row_is_an_error() {
        let (_tmp, store) = open();
        let check = Check::new(at(0));
        store.insert_check(&check).unwrap();

        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE checks SET schedule = 'not a cron'", []).unwrap();
        }

        assert!(matches!(store.get_check(check.code), Err(DbError::Corrupt(_))));
    }

    #[test]
    fn test_db_time_is_sortable_text() {
        let early = Utc.with_ymd_and_hms(2020, 1, 15, 9, 0, 0).unwrap();
        let late = early + Duration::nanoseconds(1);
        assert!(format_db_time(&early) < format_db_time(&late));
        assert_eq!(parse_db_time(&format_db_time(&late)), Some(late));
        assert_eq!(parse_db_time("2020-01-15T09:00:00Z"), Some(early));
        assert_eq!(parse_db_time("yesterday"), None);
    }
}

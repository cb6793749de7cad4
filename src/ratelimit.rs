//! Token-bucket rate limiting for abuse-prone actions.
//!
//! Buckets live in the database and are never cached in process, so several
//! instances sharing a database enforce one limit. Each decision is a single
//! read-modify-write transaction on the bucket row.

use crate::clock::Clock;
use crate::db::{DbError, Store, TokenBucket};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;

/// Capacity and refill time for one category of bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketPolicy {
    /// Tokens in a full bucket.
    pub capacity: u32,
    /// Time for an empty bucket to fill up again.
    pub refill: Duration,
}

impl BucketPolicy {
    pub fn new(capacity: u32, refill_secs: i64) -> Self {
        Self {
            capacity,
            refill: Duration::seconds(refill_secs),
        }
    }
}

impl FromStr for BucketPolicy {
    type Err = String;

    /// Parse `"<capacity>/<refill seconds>"`, e.g. `"20/3600"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (capacity, refill) = s
            .split_once('/')
            .ok_or_else(|| format!("expected <capacity>/<seconds>, got '{}'", s))?;
        let capacity: u32 = capacity
            .trim()
            .parse()
            .map_err(|_| format!("bad capacity '{}'", capacity))?;
        let refill: i64 = refill
            .trim()
            .parse()
            .map_err(|_| format!("bad refill time '{}'", refill))?;
        if capacity == 0 || refill <= 0 {
            return Err(format!("policy '{}' must be positive", s));
        }
        Ok(Self::new(capacity, refill))
    }
}

/// Policies for each guarded action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimits {
    /// Signup and login attempts from one IP address.
    pub auth_ip: BucketPolicy,
    /// Login links sent to one email address.
    pub login_email: BucketPolicy,
    /// Password attempts for one account.
    pub password: BucketPolicy,
    /// Invitations sent by one user.
    pub invite: BucketPolicy,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            auth_ip: BucketPolicy::new(20, 3600),
            login_email: BucketPolicy::new(20, 3600),
            password: BucketPolicy::new(20, 86400),
            invite: BucketPolicy::new(20, 86400),
        }
    }
}

impl TokenBucket {
    /// A full bucket.
    pub fn full(value: &str, policy: &BucketPolicy, now: DateTime<Utc>) -> Self {
        Self {
            value: value.to_string(),
            tokens: f64::from(policy.capacity),
            updated: now,
        }
    }

    /// Top the bucket up for the time elapsed since it was last updated.
    pub fn refill(&mut self, policy: &BucketPolicy, now: DateTime<Utc>) {
        let capacity = f64::from(policy.capacity);
        let elapsed = (now - self.updated).num_milliseconds() as f64 / 1000.0;
        let refill = policy.refill.num_milliseconds() as f64 / 1000.0;

        if elapsed > 0.0 {
            // A zero refill time divides to infinity and fills the bucket
            self.tokens += elapsed / refill * capacity;
            self.updated = now;
        }
        self.tokens = self.tokens.min(capacity);
    }

    /// Refill, then spend one token if there is one.
    pub fn try_take(&mut self, policy: &BucketPolicy, now: DateTime<Utc>) -> bool {
        self.refill(policy, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

fn salted_digest(value: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical form of an email address for rate limiting: lowercased, with
/// dots and `+suffix` removed from the mailbox, so aliases share one bucket.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim().to_lowercase();
    let Some((mailbox, domain)) = email.rsplit_once('@') else {
        return email;
    };

    let mailbox = mailbox.replace('.', "");
    let mailbox = mailbox.split('+').next().unwrap_or_default();
    format!("{}@{}", mailbox, domain)
}

/// Bucket key for signup/login attempts from one IP address.
pub fn auth_ip(ip: &str) -> String {
    // X-Forwarded-For may carry a chain; the client is first
    let ip = ip.split(',').next().unwrap_or_default().trim();
    format!("auth-ip-{}", ip)
}

/// Bucket key for login links sent to one email address.
pub fn login_email(email: &str, secret: &str) -> String {
    format!("em-{}", salted_digest(&normalize_email(email), secret))
}

/// Bucket key for password attempts against one account.
pub fn login_password(email: &str, secret: &str) -> String {
    format!("pw-{}", salted_digest(email, secret))
}

/// Bucket key for invitations sent by one user.
pub fn invite(user_id: i64) -> String {
    format!("invite-{}", user_id)
}

/// Keyed, persisted token-bucket limiter.
pub struct RateLimiter {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Spend one token from the bucket at `key`.
    ///
    /// Returns `true` if the action is permitted. A new key starts with a
    /// full bucket. Key namespacing is the caller's job.
    pub fn allow(&self, key: &str, policy: &BucketPolicy) -> Result<bool, DbError> {
        let now = self.clock.now();

        let allowed = self.store.with_bucket(key, |bucket| {
            let mut bucket = bucket.unwrap_or_else(|| TokenBucket::full(key, policy, now));
            let allowed = bucket.try_take(policy, now);
            (bucket, allowed)
        })?;

        if !allowed {
            tracing::warn!("Rate limit exceeded for {}", key);
        }
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 15, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_bucket_allows_capacity_then_denies() {
        let policy = BucketPolicy::new(5, 3600);
        let mut bucket = TokenBucket::full("k", &policy, now());
        for _ in 0..5 {
            assert!(bucket.try_take(&policy, now()));
        }
        assert!(!bucket.try_take(&policy, now()));
        assert!(!bucket.try_take(&policy, now()));
    }

    #[test]
    fn test_refills_linearly_up_to_capacity() {
        let policy = BucketPolicy::new(4, 3600);
        let mut bucket = TokenBucket {
            value: "k".to_string(),
            tokens: 0.0,
            updated: now(),
        };

        // A quarter of the refill time buys one token
        assert!(bucket.try_take(&policy, now() + Duration::minutes(15)));
        assert!(!bucket.try_take(&policy, now() + Duration::minutes(15)));

        bucket.refill(&policy, now() + Duration::days(7));
        assert_eq!(bucket.tokens, 4.0);
    }

    #[test]
    fn test_denial_keeps_refreshed_tokens() {
        let policy = BucketPolicy::new(2, 3600);
        let mut bucket = TokenBucket {
            value: "k".to_string(),
            tokens: 0.0,
            updated: now(),
        };
        let later = now() + Duration::minutes(15);
        assert!(!bucket.try_take(&policy, later));
        assert_eq!(bucket.tokens, 0.5);
        assert_eq!(bucket.updated, later);
    }

    #[test]
    fn test_clock_going_backwards_adds_nothing() {
        let policy = BucketPolicy::new(2, 3600);
        let mut bucket = TokenBucket {
            value: "k".to_string(),
            tokens: 0.0,
            updated: now(),
        };
        bucket.refill(&policy, now() - Duration::hours(1));
        assert_eq!(bucket.tokens, 0.0);
        assert_eq!(bucket.updated, now());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("20/3600".parse::<BucketPolicy>(), Ok(BucketPolicy::new(20, 3600)));
        assert!("20".parse::<BucketPolicy>().is_err());
        assert!("0/3600".parse::<BucketPolicy>().is_err());
        assert!("x/3600".parse::<BucketPolicy>().is_err());
    }

    #[test]
    fn test_keys() {
        assert_eq!(normalize_email("john.smith+alerts@example.org"), "johnsmith@example.org");
        assert_eq!(normalize_email(" Foo@X.com "), "foo@x.com");
        assert_eq!(auth_ip("10.0.0.1, 192.168.1.1"), "auth-ip-10.0.0.1");
        assert_eq!(invite(42), "invite-42");

        let a = login_email("john.smith+x@example.org", "secret");
        let b = login_email("johnsmith@example.org", "secret");
        assert_eq!(a, b);
        assert!(a.starts_with("em-"));
        assert_eq!(a.len(), 3 + 64);
        assert_ne!(a, login_email("johnsmith@example.org", "other"));
        assert_eq!(login_email("John.Smith@Example.ORG", "secret"), b);

        assert!(login_password("alice@example.org", "secret").starts_with("pw-"));
    }

    #[test]
    fn test_limiter_persists_buckets() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let clock = Arc::new(FixedClock::new(now()));
        let limiter = RateLimiter::new(store.clone(), clock.clone());
        let policy = BucketPolicy::new(3, 3600);

        for _ in 0..3 {
            assert!(limiter.allow("auth-ip-10.0.0.1", &policy).unwrap());
        }
        assert!(!limiter.allow("auth-ip-10.0.0.1", &policy).unwrap());

        // Other keys are independent
        assert!(limiter.allow("auth-ip-10.0.0.2", &policy).unwrap());

        clock.advance(Duration::hours(1));
        for _ in 0..3 {
            assert!(limiter.allow("auth-ip-10.0.0.1", &policy).unwrap());
        }
        assert!(!limiter.allow("auth-ip-10.0.0.1", &policy).unwrap());

        let bucket = store.get_bucket("auth-ip-10.0.0.1").unwrap().unwrap();
        assert!(bucket.tokens < 1.0);
        assert_eq!(bucket.updated, clock.now());
    }

    #[test]
    fn test_concurrent_callers_share_one_budget() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now()));
        let limiter = Arc::new(RateLimiter::new(store, clock));
        let policy = BucketPolicy::new(10, 3600);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..5)
                        .filter(|_| limiter.allow("em-shared", &policy).unwrap())
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 10);
    }
}

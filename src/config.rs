//! Configuration module for heartwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::ratelimit::{BucketPolicy, RateLimits};

use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the SQLite database file (default: "heartwatch.db")
    pub db_path: String,
    /// How often the sweeper looks for overdue checks (default: 2s)
    pub sweep_interval: Duration,
    /// Salt for hashed rate-limit keys
    pub secret_key: String,
    pub rate_limits: RateLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: "heartwatch.db".to_string(),
            sweep_interval: Duration::from_secs(2),
            secret_key: String::new(),
            rate_limits: RateLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HEARTWATCH_DB_PATH`: Database file path (default: "heartwatch.db")
    /// - `HEARTWATCH_SWEEP_INTERVAL_SECS`: Sweep interval (default: 2)
    /// - `HEARTWATCH_SECRET_KEY`: Salt for hashed rate-limit keys
    /// - `HEARTWATCH_RATE_AUTH_IP`, `HEARTWATCH_RATE_LOGIN_EMAIL`,
    ///   `HEARTWATCH_RATE_PASSWORD`, `HEARTWATCH_RATE_INVITE`: bucket
    ///   policies as `<capacity>/<refill seconds>`
    ///
    /// Values that fail to parse are ignored.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(db_path) = lookup("HEARTWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(secs) = lookup("HEARTWATCH_SWEEP_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => cfg.sweep_interval = Duration::from_secs(secs),
                _ => tracing::warn!("Ignoring invalid HEARTWATCH_SWEEP_INTERVAL_SECS: {}", secs),
            }
        }

        if let Some(secret) = lookup("HEARTWATCH_SECRET_KEY") {
            cfg.secret_key = secret;
        }

        let policies = [
            ("HEARTWATCH_RATE_AUTH_IP", &mut cfg.rate_limits.auth_ip),
            ("HEARTWATCH_RATE_LOGIN_EMAIL", &mut cfg.rate_limits.login_email),
            ("HEARTWATCH_RATE_PASSWORD", &mut cfg.rate_limits.password),
            ("HEARTWATCH_RATE_INVITE", &mut cfg.rate_limits.invite),
        ];
        for (key, policy) in policies {
            if let Some(value) = lookup(key) {
                match value.parse::<BucketPolicy>() {
                    Ok(parsed) => *policy = parsed,
                    Err(e) => tracing::warn!("Ignoring invalid {}: {}", key, e),
                }
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.db_path, "heartwatch.db");
        assert_eq!(cfg.sweep_interval, Duration::from_secs(2));
        assert_eq!(cfg.rate_limits.password, BucketPolicy::new(20, 86400));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("HEARTWATCH_DB_PATH", "/var/lib/heartwatch.db"),
            ("HEARTWATCH_SWEEP_INTERVAL_SECS", "0"),
            ("HEARTWATCH_SECRET_KEY", "s3cret"),
            ("HEARTWATCH_RATE_INVITE", "5/60"),
            ("HEARTWATCH_RATE_AUTH_IP", "lots"),
        ]
        .into_iter()
        .collect();

        let cfg = ServerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(cfg.db_path, "/var/lib/heartwatch.db");
        assert_eq!(cfg.sweep_interval, Duration::from_secs(2));
        assert_eq!(cfg.secret_key, "s3cret");
        assert_eq!(cfg.rate_limits.invite, BucketPolicy::new(5, 60));
        assert_eq!(cfg.rate_limits.auth_ip, BucketPolicy::new(20, 3600));
    }
}

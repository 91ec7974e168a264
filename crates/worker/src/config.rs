use std::str::FromStr;
use std::time::Duration;

/// Errors raised while reading worker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("CHECK_TIMEOUT_SECS ({check_secs}) must be shorter than LEASE_DURATION_SECS ({lease_secs})")]
    TimeoutExceedsLease { check_secs: u64, lease_secs: u64 },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Identity stamped into `locked_by` and `executed_by`.
    pub worker_id: String,
    /// Sleep after an empty dequeue.
    pub poll_interval: Duration,
    /// Sleep after a failed dequeue.
    pub error_backoff: Duration,
    /// Upper bound on a single plugin invocation; always below `lease_duration`.
    pub check_timeout: Duration,
    /// Age after which a processing row may be reclaimed.
    pub lease_duration: Duration,
    pub db_max_connections: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default             |
    /// |-----------------------|---------------------|
    /// | `DATABASE_URL`        | required            |
    /// | `WORKER_ID`           | `worker-<uuid v4>`  |
    /// | `POLL_INTERVAL_MS`    | `1000`              |
    /// | `ERROR_BACKOFF_SECS`  | `5`                 |
    /// | `CHECK_TIMEOUT_SECS`  | `240`               |
    /// | `LEASE_DURATION_SECS` | `300`               |
    /// | `DB_MAX_CONNECTIONS`  | `10`                |
    ///
    /// The check timeout must be shorter than the lease, otherwise a check
    /// still running at lease expiry is reclaimed and run a second time.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let worker_id = lookup("WORKER_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()));

        let check_secs: u64 = parse(&lookup, "CHECK_TIMEOUT_SECS", 240)?;
        let lease_secs: u64 = parse(&lookup, "LEASE_DURATION_SECS", 300)?;
        if check_secs >= lease_secs {
            return Err(ConfigError::TimeoutExceedsLease { check_secs, lease_secs });
        }

        Ok(Self {
            database_url,
            worker_id,
            poll_interval: Duration::from_millis(parse(&lookup, "POLL_INTERVAL_MS", 1000)?),
            error_backoff: Duration::from_secs(parse(&lookup, "ERROR_BACKOFF_SECS", 5)?),
            check_timeout: Duration::from_secs(check_secs),
            lease_duration: Duration::from_secs(lease_secs),
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 10)?,
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

//! Configuration management for the server.

use ferry_engine::{AdvancePolicy, SchedulerConfig, Timestamp};
use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL URL of the store being replicated
    pub source_database_url: String,
    /// PostgreSQL URL of the replica; defaults to the source URL
    pub target_database_url: String,
    pub source_table: String,
    pub target_table: String,
    /// Page size for the bootstrap copy
    pub batch_size: u64,
    pub sync_interval: Duration,
    pub retry_max_attempts: u32,
    pub watermark_policy: AdvancePolicy,
    /// Skip the bootstrap and continue delta sync from this watermark.
    pub resume_from: Option<Timestamp>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, one variable at a time.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let source_database_url =
            lookup("SOURCE_DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;
        let target_database_url =
            lookup("TARGET_DATABASE_URL").unwrap_or_else(|| source_database_url.clone());

        let source_table = table_name(
            lookup("SOURCE_TABLE").unwrap_or_else(|| "source_records".to_string()),
        )?;
        let target_table = table_name(
            lookup("TARGET_TABLE").unwrap_or_else(|| "target_records".to_string()),
        )?;
        if source_table == target_table && source_database_url == target_database_url {
            return Err(ConfigError::SameTable(source_table));
        }

        let batch_size = parse_or(&lookup, "BATCH_SIZE", 10u64)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        let sync_interval = Duration::from_millis(parse_or(&lookup, "SYNC_INTERVAL_MS", 1000u64)?);
        let retry_max_attempts = parse_or(&lookup, "RETRY_MAX_ATTEMPTS", 3u32)?;

        let watermark_policy = match lookup("WATERMARK_POLICY") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "WATERMARK_POLICY",
                value: raw,
            })?,
            None => AdvancePolicy::default(),
        };

        let resume_from = match lookup("RESUME_FROM") {
            Some(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "RESUME_FROM",
                value: raw,
            })?),
            None => None,
        };

        Ok(Self {
            host,
            port,
            source_database_url,
            target_database_url,
            source_table,
            target_table,
            batch_size,
            sync_interval,
            retry_max_attempts,
            watermark_policy,
            resume_from,
        })
    }

    /// Scheduler settings derived from this configuration.
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.batch_size, self.sync_interval)
    }

    /// Whether source and target live in the same database.
    pub fn shares_database(&self) -> bool {
        self.source_database_url == self.target_database_url
    }

    /// Warning for watermark policies that read the engine clock.
    ///
    /// The engine clock is this host's wall clock, while PostgreSQL stamps
    /// `updated_at` with its own `clock_timestamp()`. Any skew between the two
    /// can move the watermark past writes that have not been read yet.
    pub fn policy_warning(&self) -> Option<String> {
        match self.watermark_policy {
            AdvancePolicy::MaxObserved => None,
            policy => Some(format!(
                "WATERMARK_POLICY={policy} compares the app host clock with the \
                 database clock; clock skew can skip records, prefer max-observed"
            )),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

/// Accept only plain SQL identifiers, since table names are spliced into queries.
fn table_name(name: String) -> Result<String, ConfigError> {
    let mut chars = name.chars();
    let valid = name.len() <= 63
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(name)
    } else {
        Err(ConfigError::InvalidTableName(name))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SOURCE_DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {key} value: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Source and target both point at table {0}")]
    SameTable(String),
}

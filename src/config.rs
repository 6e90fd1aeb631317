//! Run configuration
//!
//! `IngestConfig` controls decoding, enrichment and batch writing for one run.
//! `CosmosConfig` carries the document-store connection settings. Both can be
//! read from the environment; CLI flags override what the environment provides.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PARTITION_KEY_COLUMN: &str = "timestamp";
pub const DEFAULT_PARTITION_KEY: &str = "default";
pub const DEFAULT_PARTITION_KEY_FIELD: &str = "TimestampID";
pub const DEFAULT_FAILURE_LOG_LIMIT: usize = 3;

/// How record identifiers are generated
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Fresh UUID v4 per record; re-running a blob inserts duplicates
    #[default]
    Random,
    /// UUID v5 over blob name, line number and row values; re-runs collide
    Deterministic,
}

impl std::str::FromStr for IdStrategy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(IdStrategy::Random),
            "deterministic" => Ok(IdStrategy::Deterministic),
            other => Err(IngestError::Config(format!("unknown id strategy '{}'", other))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub batch_size: usize,
    /// Source column whose value becomes the partition key
    pub partition_key_column: String,
    /// Partition key used when the source column is absent or empty
    pub partition_key_default: String,
    /// Document field that carries the partition key
    pub partition_key_field: String,
    pub id_strategy: IdStrategy,
    /// Number of batches written concurrently; 1 keeps strict batch order
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Detailed failure log lines per batch
    pub failure_log_limit: usize,
    /// Stop the run when an entire batch fails with the store unreachable
    pub abort_on_outage: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            partition_key_column: DEFAULT_PARTITION_KEY_COLUMN.to_string(),
            partition_key_default: DEFAULT_PARTITION_KEY.to_string(),
            partition_key_field: DEFAULT_PARTITION_KEY_FIELD.to_string(),
            id_strategy: IdStrategy::Random,
            max_concurrency: 1,
            max_retries: 0,
            retry_backoff_ms: 200,
            failure_log_limit: DEFAULT_FAILURE_LOG_LIMIT,
            abort_on_outage: false,
        }
    }
}

impl IngestConfig {
    /// Defaults overlaid with `INGEST_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_opt("INGEST_BATCH_SIZE") {
            config.batch_size = parse_env("INGEST_BATCH_SIZE", &v)?;
        }
        if let Some(v) = env_opt("INGEST_PARTITION_KEY_COLUMN") {
            config.partition_key_column = v;
        }
        if let Some(v) = env_opt("INGEST_PARTITION_KEY_DEFAULT") {
            config.partition_key_default = v;
        }
        if let Some(v) = env_opt("INGEST_PARTITION_KEY_FIELD") {
            config.partition_key_field = v;
        }
        if let Some(v) = env_opt("INGEST_ID_STRATEGY") {
            config.id_strategy = v.parse()?;
        }
        if let Some(v) = env_opt("INGEST_MAX_CONCURRENCY") {
            config.max_concurrency = parse_env("INGEST_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = env_opt("INGEST_MAX_RETRIES") {
            config.max_retries = parse_env("INGEST_MAX_RETRIES", &v)?;
        }
        if let Some(v) = env_opt("INGEST_RETRY_BACKOFF_MS") {
            config.retry_backoff_ms = parse_env("INGEST_RETRY_BACKOFF_MS", &v)?;
        }
        if let Some(v) = env_opt("INGEST_ABORT_ON_OUTAGE") {
            config.abort_on_outage = parse_env("INGEST_ABORT_ON_OUTAGE", &v)?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(IngestError::Config("max_concurrency must be at least 1".to_string()));
        }
        if self.partition_key_column.trim().is_empty() {
            return Err(IngestError::Config("partition_key_column is empty".to_string()));
        }
        if self.partition_key_field.trim().is_empty() {
            return Err(IngestError::Config("partition_key_field is empty".to_string()));
        }
        if self.partition_key_field == "id" {
            return Err(IngestError::Config(
                "partition_key_field cannot be 'id'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Cosmos DB account and target container
#[derive(Clone, Serialize, Deserialize)]
pub struct CosmosConfig {
    pub endpoint: String,
    pub key: String,
    pub database: String,
    pub container: String,
}

impl std::fmt::Debug for CosmosConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("database", &self.database)
            .field("container", &self.container)
            .finish()
    }
}

impl CosmosConfig {
    /// Read `COSMOS_DB_URI`, `COSMOS_DB_KEY`, `COSMOS_DB_DATABASE` and `COSMOS_DB_CONTAINER`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; every value is required
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| -> Result<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| IngestError::Config(format!("missing required setting {}", name)))
        };

        Ok(Self {
            endpoint: require("COSMOS_DB_URI")?,
            key: require("COSMOS_DB_KEY")?,
            database: require("COSMOS_DB_DATABASE")?,
            container: require("COSMOS_DB_CONTAINER")?,
        })
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| IngestError::Config(format!("invalid value '{}' for {}", value, name)))
}

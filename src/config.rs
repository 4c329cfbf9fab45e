use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docpipe service.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores document vectors.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding one vector per document.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// SQLite database URL backing the metadata store and work queue.
    pub database_url: String,
    /// Optional S3-compatible endpoint override (MinIO, LocalStack).
    pub aws_endpoint: Option<String>,
    /// Bucket receiving raw uploaded documents.
    pub aws_bucket: String,
    /// Region used for request signing.
    pub aws_region: String,
    /// Access key id for blob storage.
    pub aws_access_key_id: String,
    /// Secret access key for blob storage.
    pub aws_secret_access_key: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Time-to-live applied to cached search results.
    pub cache_ttl: Duration,
    /// Number of hits returned by a search.
    pub search_top_k: usize,
    /// Maximum number of characters extracted from a document before embedding.
    pub extract_max_chars: usize,
    /// Maximum number of characters stored as the document preview.
    pub preview_max_chars: usize,
    /// Bounded retry attempts for transient failures inside the worker.
    pub worker_max_attempts: u32,
    /// Base delay for the worker's exponential backoff.
    pub worker_backoff: Duration,
    /// Time before an unacknowledged queue message becomes visible again.
    pub queue_visibility: Duration,
    /// Age past which an UPLOADED document is considered stalled and re-queued.
    pub sweep_grace: Duration,
    /// Interval between recovery sweep runs.
    pub sweep_interval: Duration,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            database_url: load_env("DATABASE_URL")?,
            aws_endpoint: load_env_optional("AWS_ENDPOINT"),
            aws_bucket: load_env("AWS_BUCKET")?,
            aws_region: load_env_optional("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            aws_access_key_id: load_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: load_env("AWS_SECRET_ACCESS_KEY")?,
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", 384)?,
            cache_ttl: Duration::from_secs(parse_or("CACHE_TTL_SECONDS", 300)?),
            search_top_k: parse_or("SEARCH_TOP_K", 3)?,
            extract_max_chars: parse_or("EXTRACT_MAX_CHARS", 500)?,
            preview_max_chars: parse_or("PREVIEW_MAX_CHARS", 200)?,
            worker_max_attempts: parse_or("WORKER_MAX_ATTEMPTS", 3)?,
            worker_backoff: Duration::from_millis(parse_or("WORKER_BACKOFF_MS", 200)?),
            queue_visibility: Duration::from_secs(parse_or("QUEUE_VISIBILITY_SECONDS", 30)?),
            sweep_grace: Duration::from_secs(parse_or("SWEEP_GRACE_SECONDS", 300)?),
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL_SECONDS", 60)?),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        bucket = %config.aws_bucket,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_to_default() {
        assert_eq!(parse_or::<usize>("DOCPIPE_UNSET_KNOB", 42).unwrap(), 42);
    }

    #[test]
    fn parse_or_rejects_garbage() {
        // Safety: test-local variable, no other test reads it.
        unsafe { env::set_var("DOCPIPE_BAD_KNOB", "not-a-number") };
        assert!(parse_or::<usize>("DOCPIPE_BAD_KNOB", 1).is_err());
        unsafe { env::remove_var("DOCPIPE_BAD_KNOB") };
    }
}

//! Environment-driven configuration, one sub-config per component.
//! Mirrors the load-then-validate-in-production shape used throughout this
//! codebase's other services.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: std::env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingRequired("DATABASE_URL".into()))?,
            max_connections: env_or("DB_MAX_CONNECTIONS", 20),
            acquire_timeout: Duration::from_secs(env_or("DB_ACQUIRE_TIMEOUT_SECS", 30)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub path: String,
    pub collection_name: String,
}

impl VectorStoreConfig {
    pub fn from_env() -> Self {
        Self {
            path: std::env::var("VECTOR_STORE_PATH").unwrap_or_else(|_| "./data/vectors".to_string()),
            collection_name: std::env::var("VECTOR_STORE_COLLECTION")
                .unwrap_or_else(|_| "news_articles".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub key_prefix: String,
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            redis_url: std::env::var("REDIS_URL")
                .map_err(|_| ConfigError::MissingRequired("REDIS_URL".into()))?,
            key_prefix: std::env::var("CACHE_KEY_PREFIX").unwrap_or_else(|_| "news:".to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderProvider {
    Remote,
    Local,
}

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub provider: EmbedderProvider,
    pub model_name: String,
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub max_workers: usize,
}

impl EmbedderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match std::env::var("EMBEDDER_PROVIDER").unwrap_or_default().to_lowercase().as_str() {
            "remote" => EmbedderProvider::Remote,
            _ => EmbedderProvider::Local,
        };
        let model_name = std::env::var("EMBEDDER_MODEL").unwrap_or_else(|_| "BAAI/bge-small-en-v1.5".to_string());
        if provider == EmbedderProvider::Remote && std::env::var("EMBEDDER_API_KEY").is_err() {
            return Err(ConfigError::MissingRequired("EMBEDDER_API_KEY".into()));
        }
        Ok(Self {
            provider,
            model_name,
            api_key: std::env::var("EMBEDDER_API_KEY").ok(),
            host: std::env::var("EMBEDDER_HOST").ok(),
            max_workers: env_or("EMBEDDER_MAX_WORKERS", 10),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub tag: String,
    pub fresh_interval_secs: u64,
    pub fetch_concurrency: usize,
}

impl SourceConfig {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fresh_interval_secs: 15,
            fetch_concurrency: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: i32,
    pub min_content_chars: usize,
}

impl RetryConfig {
    pub fn from_env() -> Self {
        Self {
            max_retries: env_or("MAX_RETRIES", 3),
            min_content_chars: env_or("MIN_CONTENT_CHARS", 50),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub claim_batch_size: i64,
    pub poll_interval_secs: u64,
    pub idle_backoff_cap_secs: u64,
    pub idle_threshold: u32,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        Self {
            claim_batch_size: env_or("DISPATCHER_CLAIM_BATCH_SIZE", 20),
            poll_interval_secs: env_or("DISPATCHER_POLL_INTERVAL_SECS", 30),
            idle_backoff_cap_secs: env_or("DISPATCHER_IDLE_BACKOFF_CAP_SECS", 480),
            idle_threshold: env_or("DISPATCHER_IDLE_THRESHOLD", 3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingSchedulerConfig {
    pub claim_batch_size: i64,
    pub poll_interval_secs: u64,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub backoff_max_attempts: u32,
}

impl EmbeddingSchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            claim_batch_size: env_or("EMBEDDING_CLAIM_BATCH_SIZE", 50),
            poll_interval_secs: env_or("EMBEDDING_POLL_INTERVAL_SECS", 30),
            backoff_base_secs: env_or("EMBEDDING_BACKOFF_BASE_SECS", 2),
            backoff_cap_secs: env_or("EMBEDDING_BACKOFF_CAP_SECS", 10),
            backoff_max_attempts: env_or("EMBEDDING_BACKOFF_MAX_ATTEMPTS", 5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoricalConfig {
    pub batch_days: i64,
    pub day_workers: usize,
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            batch_days: env_or("HISTORICAL_BATCH_DAYS", 10),
            day_workers: env_or("HISTORICAL_DAY_WORKERS", 4),
        }
    }
}

/// Top-level configuration, composed from env-var-driven sub-configs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub vector_store: VectorStoreConfig,
    pub cache: CacheConfig,
    pub embedder: EmbedderConfig,
    pub retry: RetryConfig,
    pub dispatcher: DispatcherConfig,
    pub embedding_scheduler: EmbeddingSchedulerConfig,
    pub historical: HistoricalConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        let config = Self {
            environment,
            database: DatabaseConfig::from_env()?,
            vector_store: VectorStoreConfig::from_env(),
            cache: CacheConfig::from_env()?,
            embedder: EmbedderConfig::from_env()?,
            retry: RetryConfig::from_env(),
            dispatcher: DispatcherConfig::from_env(),
            embedding_scheduler: EmbeddingSchedulerConfig::from_env(),
            historical: HistoricalConfig::default(),
        };
        if environment.is_production() {
            config.validate_production()?;
        }
        Ok(config)
    }

    fn validate_production(&self) -> Result<(), ConfigError> {
        if self.database.url.contains("localhost") || self.database.url.contains("127.0.0.1") {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_URL".to_string(),
                message: "production must not use a localhost database".to_string(),
            });
        }
        if self.cache.redis_url.contains("localhost") || self.cache.redis_url.contains("127.0.0.1") {
            return Err(ConfigError::InvalidValue {
                key: "REDIS_URL".to_string(),
                message: "production must not use a localhost cache".to_string(),
            });
        }
        Ok(())
    }
}

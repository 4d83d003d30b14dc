//! Database configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{DbError, DbResult};

/// Connection settings for PostgreSQL and the Redis credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Redis URL used for every write
    pub redis_url: String,
    /// Optional read-replica URL; reads go to the writer when unset
    pub redis_reader_url: Option<String>,
    /// Maximum Redis connections per pool
    pub redis_pool_size: usize,
    /// Maximum PostgreSQL connections
    pub pg_max_connections: u32,
    /// Minimum PostgreSQL connections
    pub pg_min_connections: u32,
    /// Connection acquire timeout in seconds
    pub pg_acquire_timeout_secs: u64,
    /// Upper bound for a single key-value store call
    #[serde(with = "humantime_serde")]
    pub kv_timeout: Duration,
    /// Prefix prepended to every key written by this deployment
    pub kv_namespace: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/warden".to_string()),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            redis_reader_url: std::env::var("REDIS_READER_URL").ok(),
            redis_pool_size: 16,
            pg_max_connections: 20,
            pg_min_connections: 2,
            pg_acquire_timeout_secs: 30,
            kv_timeout: Duration::from_secs(2),
            kv_namespace: String::new(),
        }
    }
}

impl DatabaseConfig {
    /// Create config from environment variables
    pub fn from_env() -> DbResult<Self> {
        let postgres_url = std::env::var("DATABASE_URL")
            .map_err(|_| DbError::Config("DATABASE_URL must be set".to_string()))?;
        let redis_url = std::env::var("REDIS_URL")
            .map_err(|_| DbError::Config("REDIS_URL must be set".to_string()))?;

        let kv_timeout = match std::env::var("WARDEN_KV_TIMEOUT") {
            Ok(raw) => humantime::parse_duration(&raw)
                .map_err(|e| DbError::Config(format!("WARDEN_KV_TIMEOUT: {}", e)))?,
            Err(_) => Duration::from_secs(2),
        };

        Ok(Self {
            postgres_url,
            redis_url,
            redis_reader_url: std::env::var("REDIS_READER_URL").ok(),
            redis_pool_size: env_parse("REDIS_POOL_SIZE").unwrap_or(16),
            pg_max_connections: env_parse("PG_MAX_CONNECTIONS").unwrap_or(20),
            pg_min_connections: env_parse("PG_MIN_CONNECTIONS").unwrap_or(2),
            pg_acquire_timeout_secs: env_parse("PG_ACQUIRE_TIMEOUT").unwrap_or(30),
            kv_timeout,
            kv_namespace: std::env::var("WARDEN_KV_NAMESPACE").unwrap_or_default(),
        })
    }

    /// Mask sensitive parts of the PostgreSQL URL for logging
    pub fn postgres_url_masked(&self) -> String {
        mask_url(&self.postgres_url)
    }

    /// Mask sensitive parts of the Redis URL for logging
    pub fn redis_url_masked(&self) -> String {
        mask_url(&self.redis_url)
    }

    /// Reader URL, falling back to the writer
    pub fn redis_reader_url(&self) -> &str {
        self.redis_reader_url.as_deref().unwrap_or(&self.redis_url)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

pub(crate) fn mask_url(url: &str) -> String {
    // user:pass@ -> user:***@
    if let (Some(at_pos), Some(scheme_end)) = (url.find('@'), url.find("://")) {
        let scheme = &url[..scheme_end + 3];
        let after_at = &url[at_pos..];
        let user_pass = &url[scheme_end + 3..at_pos];
        if let Some(colon_pos) = user_pass.find(':') {
            let user = &user_pass[..colon_pos];
            return format!("{}{}:***{}", scheme, user, after_at);
        }
    }
    url.to_string()
}

//! Warden Database Layer
//!
//! Persistence for the credential lifecycle.
//!
//! # Architecture
//!
//! - **Redis** ([`kv`]): bearer tokens, login-throttle counters and session
//!   payloads. Split into writer and reader handles so reads can be served
//!   by a replica. Every call is bounded by a timeout.
//! - **PostgreSQL** ([`repos`]): users, password hashes and one-time auth
//!   tokens. Token issue and token consumption are transactional.
//!
//! Consumers depend on the [`KvStore`], [`UserRepository`] and
//! [`ResetTokenRepository`] traits; the in-memory implementations behind the
//! `mock` feature make every flow testable without external services.

pub mod clock;
pub mod config;
pub mod error;
pub mod kv;
pub mod models;
pub mod repos;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;

pub use clock::{Clock, SystemClock};
pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use kv::{CredentialStore, KvStore, MemoryKvStore, RedisKvStore};
pub use models::*;
pub use repos::*;

#[cfg(any(test, feature = "mock"))]
pub use clock::MockClock;

/// PostgreSQL pool and credential store
pub struct Database {
    /// PostgreSQL connection pool
    pub pg: PgPool,
    /// Redis writer/reader handles
    pub kv: CredentialStore,
}

impl Database {
    /// Connect to PostgreSQL and Redis
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.postgres_url_masked());

        let pg = PgPoolOptions::new()
            .max_connections(config.pg_max_connections)
            .min_connections(config.pg_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.pg_acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await
            .map_err(|e| DbError::Connection(format!("PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");

        info!("Connecting to Redis: {}", config.redis_url_masked());

        let writer: Arc<dyn KvStore> = Arc::new(RedisKvStore::connect(
            &config.redis_url,
            config.redis_pool_size,
            config.kv_timeout,
        )?);
        let reader: Arc<dyn KvStore> = match &config.redis_reader_url {
            Some(url) => {
                info!("Using Redis read replica: {}", config::mask_url(url));
                Arc::new(RedisKvStore::connect(url, config.redis_pool_size, config.kv_timeout)?)
            }
            None => writer.clone(),
        };

        writer
            .ping()
            .await
            .map_err(|e| DbError::Connection(format!("Redis ping: {}", e)))?;

        info!("Connected to Redis");

        let kv = CredentialStore::new(writer, reader).with_namespace(config.kv_namespace.clone());

        Ok(Self { pg, kv })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pg)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Health check for both stores
    pub async fn health_check(&self) -> HealthStatus {
        let pg_ok = sqlx::query("SELECT 1").fetch_one(&self.pg).await.is_ok();
        let (writer_ok, reader_ok) = self.kv.health().await;

        HealthStatus {
            postgres: pg_ok,
            kv_writer: writer_ok,
            kv_reader: reader_ok,
            healthy: pg_ok && writer_ok && reader_ok,
        }
    }

    pub fn user_repo(&self) -> UserRepo {
        UserRepo::new(self.pg.clone())
    }

    pub fn reset_token_repo(&self) -> ResetTokenRepo {
        ResetTokenRepo::new(self.pg.clone())
    }

    pub fn credential_store(&self) -> CredentialStore {
        self.kv.clone()
    }
}

/// Health status of database connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct HealthStatus {
    pub postgres: bool,
    pub kv_writer: bool,
    pub kv_reader: bool,
    pub healthy: bool,
}

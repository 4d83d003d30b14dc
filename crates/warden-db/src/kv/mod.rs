//! Credential store: a TTL-capable key-value store behind writer/reader handles
//!
//! Bearer tokens, throttle counters and session payloads all live here.
//! Writes always go to the writer handle. Reads that tolerate replica lag
//! (token and session lookups) use the reader handle; reads that must see
//! the latest write (throttle state) use [`CredentialStore::get_primary`].

mod memory;
mod redis;

pub use self::memory::MemoryKvStore;
pub use self::redis::RedisKvStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::DbResult;

/// Key prefixes, one per key family sharing the store
pub mod keys {
    pub const ACCESS_TOKEN: &str = "AT:";
    pub const REFRESH_TOKEN: &str = "RT:";
    pub const THROTTLE_COUNT: &str = "LT:";
    pub const THROTTLE_WAIT: &str = "LW:";
    pub const SESSION: &str = "SS:";
}

/// Primitive operations every backend provides
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Set a value that expires after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()>;

    /// Returns whether the key existed
    async fn delete(&self, key: &str) -> DbResult<bool>;

    /// Atomically increment an integer key and (re)arm its expiry, returning the new value
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> DbResult<i64>;

    async fn ping(&self) -> DbResult<()>;
}

/// Writer/reader pair plus key namespacing
#[derive(Clone)]
pub struct CredentialStore {
    writer: Arc<dyn KvStore>,
    reader: Arc<dyn KvStore>,
    namespace: String,
}

impl CredentialStore {
    pub fn new(writer: Arc<dyn KvStore>, reader: Arc<dyn KvStore>) -> Self {
        Self {
            writer,
            reader,
            namespace: String::new(),
        }
    }

    /// Use one backend for both reads and writes
    pub fn single(store: Arc<dyn KvStore>) -> Self {
        Self::new(store.clone(), store)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Build a fully qualified key: `<namespace><prefix><id>`
    pub fn key(&self, prefix: &str, id: &str) -> String {
        format!("{}{}{}", self.namespace, prefix, id)
    }

    // =========================================================================
    // Raw access
    // =========================================================================

    /// Read through the reader handle
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        self.reader.get(key).await
    }

    /// Read through the writer handle
    pub async fn get_primary(&self, key: &str) -> DbResult<Option<String>> {
        self.writer.get(key).await
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        self.writer.set_ex(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        self.writer.delete(key).await
    }

    pub async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> DbResult<i64> {
        self.writer.incr_with_ttl(key, ttl).await
    }

    // =========================================================================
    // JSON records
    // =========================================================================

    /// Serialize and store a record with expiry
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> DbResult<()> {
        let json = serde_json::to_string(value)?;
        self.writer.set_ex(key, &json, ttl).await
    }

    /// Load a record through the reader handle.
    ///
    /// A payload that does not deserialize is reported as
    /// [`DbError::Serialization`](crate::DbError::Serialization), never as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        match self.reader.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Load a record through the writer handle
    pub async fn get_json_primary<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        match self.writer.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Ping both handles
    pub async fn health(&self) -> (bool, bool) {
        let writer = self.writer.ping().await.is_ok();
        let reader = self.reader.ping().await.is_ok();
        (writer, reader)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

//! In-process backend for tests and single-node development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::KvStore;
use crate::clock::{Clock, SystemClock};
use crate::{DbError, DbResult};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Map-backed store with lazy expiry against an injected clock
#[derive(Clone)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKvStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        self.clock.now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: self.expiry(ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        let now = self.clock.now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| !e.is_expired(now)))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> DbResult<i64> {
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.write().await;

        let current = match entries.get(key) {
            Some(e) if !e.is_expired(now) => e
                .value
                .parse::<i64>()
                .map_err(|_| DbError::Redis(format!("value at {} is not an integer", key)))?,
            _ => 0,
        };
        let next = current + 1;

        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;

    fn store() -> (MemoryKvStore, MockClock) {
        let clock = MockClock::default();
        (MemoryKvStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_entries_expire_with_the_clock() {
        let (store, clock) = store();
        store.set_ex("a", "1", Duration::from_secs(30)).await.unwrap();

        clock.advance(Duration::from_secs(29));
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_restarts_after_expiry() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(600);

        assert_eq!(store.incr_with_ttl("c", ttl).await.unwrap(), 1);
        assert_eq!(store.incr_with_ttl("c", ttl).await.unwrap(), 2);

        clock.advance(Duration::from_secs(601));
        assert_eq!(store.incr_with_ttl("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_rearms_expiry() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(600);

        store.incr_with_ttl("c", ttl).await.unwrap();
        clock.advance(Duration::from_secs(500));
        store.incr_with_ttl("c", ttl).await.unwrap();
        clock.advance(Duration::from_secs(500));

        assert_eq!(store.get("c").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let (store, _clock) = store();
        let ttl = Duration::from_secs(60);

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.incr_with_ttl("race", ttl).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get("race").await.unwrap(), Some("32".to_string()));
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let (store, _clock) = store();
        store.set_ex("a", "1", Duration::from_secs(30)).await.unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.is_empty().await);
    }
}

//! Shared fixtures for unit tests

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use warden_db::{
    Clock, CredentialStore, DbError, DbResult, InMemoryDirectory, KvStore, MemoryKvStore, MockClock,
    UserRecord,
};

use crate::config::PasswordConfig;
use crate::password::PasswordService;

pub(crate) struct Fixture {
    pub clock: MockClock,
    pub kv: Arc<MemoryKvStore>,
    pub store: CredentialStore,
    pub directory: InMemoryDirectory,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = MockClock::default();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let kv = Arc::new(MemoryKvStore::new(shared.clone()));
        Self {
            store: CredentialStore::single(kv.clone()),
            directory: InMemoryDirectory::new(shared),
            kv,
            clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }

    /// Insert a user, hashing `password` when given
    pub async fn user(&self, id: i64, username: &str, password: Option<&str>) -> UserRecord {
        let user = UserRecord::new(id, username, format!("{}@example.com", username));
        let hash = password.map(|p| passwords().hash_password(p).unwrap());
        self.directory.insert_user(user.clone(), hash.as_deref()).await;
        user
    }
}

/// Cheap Argon2 parameters
pub(crate) fn password_config() -> PasswordConfig {
    PasswordConfig {
        memory_cost: 4096,
        time_cost: 1,
        ..PasswordConfig::default()
    }
}

pub(crate) fn passwords() -> PasswordService {
    PasswordService::new(password_config())
}

/// Backend whose every call times out
pub(crate) struct FailingKv;

#[async_trait]
impl KvStore for FailingKv {
    async fn get(&self, _key: &str) -> DbResult<Option<String>> {
        Err(DbError::Timeout(Duration::from_secs(2)))
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> DbResult<()> {
        Err(DbError::Timeout(Duration::from_secs(2)))
    }

    async fn delete(&self, _key: &str) -> DbResult<bool> {
        Err(DbError::Timeout(Duration::from_secs(2)))
    }

    async fn incr_with_ttl(&self, _key: &str, _ttl: Duration) -> DbResult<i64> {
        Err(DbError::Timeout(Duration::from_secs(2)))
    }

    async fn ping(&self) -> DbResult<()> {
        Err(DbError::Timeout(Duration::from_secs(2)))
    }
}

pub(crate) fn failing_store() -> CredentialStore {
    CredentialStore::single(Arc::new(FailingKv))
}

//! Application state shared across handlers

use std::sync::Arc;
use warden_auth::AuthService;
use warden_db::{CredentialStore, Database};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Credential managers
    pub auth: Arc<AuthService>,
    /// Key-value store behind the managers, for health checks
    pub store: CredentialStore,
    /// Relational pool; absent when running on in-memory backends
    pub db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, store: CredentialStore) -> Self {
        Self { auth, store, db: None }
    }

    /// State backed by PostgreSQL and Redis
    pub fn with_database(auth: Arc<AuthService>, db: Arc<Database>) -> Self {
        Self {
            auth,
            store: db.credential_store(),
            db: Some(db),
        }
    }
}

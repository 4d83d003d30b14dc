//! Repository seams and their implementations
//!
//! The credential managers only see the traits; PostgreSQL backs them in
//! production and [`InMemoryDirectory`] (feature `mock`) in tests.

mod reset_token;
mod user;

#[cfg(any(test, feature = "mock"))]
mod memory;

pub use reset_token::ResetTokenRepo;
pub use user::UserRepo;

#[cfg(any(test, feature = "mock"))]
pub use memory::InMemoryDirectory;

use async_trait::async_trait;

use crate::{DbResult, NewResetToken, ResetToken, UserRecord};

/// User and password lookups
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> DbResult<Option<UserRecord>>;

    /// Match on username or email
    async fn find_by_identifier(&self, identifier: &str) -> DbResult<Option<UserRecord>>;

    async fn find_password_hash(&self, user_id: i64) -> DbResult<Option<String>>;
}

/// One-time token persistence
#[async_trait]
pub trait ResetTokenRepository: Send + Sync {
    /// Insert a token after invalidating every still-valid token of the same
    /// type for the same user, in one transaction. Concurrent calls for one
    /// user both succeed and leave exactly one valid token.
    async fn issue(&self, token: NewResetToken) -> DbResult<ResetToken>;

    async fn find(&self, user_id: i64, token_type: &str, token: &str) -> DbResult<Option<ResetToken>>;

    /// Delete the token row and write the new password hash in one transaction.
    /// Returns `false`, changing nothing, if the token was no longer valid.
    async fn consume_with_password(
        &self,
        token_id: i64,
        user_id: i64,
        password_hash: &str,
    ) -> DbResult<bool>;
}

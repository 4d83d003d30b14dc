//! In-memory users, passwords and auth tokens for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ResetTokenRepository, UserRepository};
use crate::clock::{Clock, SystemClock};
use crate::{DbError, DbResult, NewResetToken, ResetToken, UserRecord};

#[derive(Default)]
struct DirectoryState {
    users: HashMap<i64, UserRecord>,
    passwords: HashMap<i64, String>,
    tokens: Vec<ResetToken>,
    next_token_id: i64,
}

/// Implements both repository traits over a single lock, so token
/// consumption and the password write are atomic like the SQL transaction.
#[derive(Clone)]
pub struct InMemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDirectory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(DirectoryState::default())),
            clock,
        }
    }

    pub async fn insert_user(&self, user: UserRecord, password_hash: Option<&str>) {
        let mut state = self.state.write().await;
        if let Some(hash) = password_hash {
            state.passwords.insert(user.id, hash.to_string());
        }
        state.users.insert(user.id, user);
    }

    pub async fn set_blocked(&self, user_id: i64, blocked: bool) -> DbResult<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| DbError::NotFound(format!("user {}", user_id)))?;
        user.blocked = blocked;
        Ok(())
    }

    /// Every stored token for a user, newest last
    pub async fn tokens_for(&self, user_id: i64) -> Vec<ResetToken> {
        self.state
            .read()
            .await
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl UserRepository for InMemoryDirectory {
    async fn find_by_id(&self, id: i64) -> DbResult<Option<UserRecord>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> DbResult<Option<UserRecord>> {
        let state = self.state.read().await;
        let by_email = state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(identifier));
        Ok(by_email
            .or_else(|| state.users.values().find(|u| u.username == identifier))
            .cloned())
    }

    async fn find_password_hash(&self, user_id: i64) -> DbResult<Option<String>> {
        Ok(self.state.read().await.passwords.get(&user_id).cloned())
    }
}

#[async_trait]
impl ResetTokenRepository for InMemoryDirectory {
    async fn issue(&self, new: NewResetToken) -> DbResult<ResetToken> {
        let now = self.clock.now();
        let mut state = self.state.write().await;

        for token in state
            .tokens
            .iter_mut()
            .filter(|t| t.user_id == new.user_id && t.token_type == new.token_type && t.is_valid)
        {
            token.is_valid = false;
            token.updated_at = now;
        }

        state.next_token_id += 1;
        let token = ResetToken {
            id: state.next_token_id,
            user_id: new.user_id,
            provider_user_id: new.provider_user_id,
            token_provider_id: new.token_provider_id,
            token_type: new.token_type,
            token: new.token,
            is_valid: true,
            redirect_url: new.redirect_url,
            created_at: now,
            updated_at: now,
        };
        state.tokens.push(token.clone());

        Ok(token)
    }

    async fn find(&self, user_id: i64, token_type: &str, token: &str) -> DbResult<Option<ResetToken>> {
        Ok(self
            .state
            .read()
            .await
            .tokens
            .iter()
            .find(|t| t.user_id == user_id && t.token_type == token_type && t.token == token)
            .cloned())
    }

    async fn consume_with_password(
        &self,
        token_id: i64,
        user_id: i64,
        password_hash: &str,
    ) -> DbResult<bool> {
        let mut state = self.state.write().await;

        let Some(pos) = state
            .tokens
            .iter()
            .position(|t| t.id == token_id && t.user_id == user_id && t.is_valid)
        else {
            return Ok(false);
        };

        state.tokens.remove(pos);
        state.passwords.insert(user_id, password_hash.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_invalidates_previous_tokens_of_same_type() {
        let dir = InMemoryDirectory::default();

        let first = dir.issue(NewResetToken::new(1, "resetPassword", "a")).await.unwrap();
        let other_type = dir.issue(NewResetToken::new(1, "emailConfirm", "b")).await.unwrap();
        let second = dir.issue(NewResetToken::new(1, "resetPassword", "c")).await.unwrap();

        let first = dir.find(1, "resetPassword", &first.token).await.unwrap().unwrap();
        let other_type = dir.find(1, "emailConfirm", &other_type.token).await.unwrap().unwrap();

        assert!(!first.is_valid);
        assert!(other_type.is_valid);
        assert!(second.is_valid);
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let dir = InMemoryDirectory::default();
        dir.insert_user(UserRecord::new(1, "bob", "bob@example.com"), Some("old")).await;
        let token = dir.issue(NewResetToken::new(1, "resetPassword", "a")).await.unwrap();

        assert!(dir.consume_with_password(token.id, 1, "new").await.unwrap());
        assert!(!dir.consume_with_password(token.id, 1, "newer").await.unwrap());

        assert_eq!(dir.find_password_hash(1).await.unwrap().as_deref(), Some("new"));
        assert!(dir.find(1, "resetPassword", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_identifier_prefers_email() {
        let dir = InMemoryDirectory::default();
        dir.insert_user(UserRecord::new(1, "alice@example.com", "other@example.com"), None).await;
        dir.insert_user(UserRecord::new(2, "alice", "Alice@Example.com"), None).await;

        let found = dir.find_by_identifier("alice@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, 2);

        let found = dir.find_by_identifier("alice").await.unwrap().unwrap();
        assert_eq!(found.id, 2);
    }
}

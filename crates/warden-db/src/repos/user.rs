//! User repository

use async_trait::async_trait;
use sqlx::PgPool;

use super::UserRepository;
use crate::{DbResult, UserRecord};

/// PostgreSQL user and password lookups
#[derive(Clone)]
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for UserRepo {
    async fn find_by_id(&self, id: i64) -> DbResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, display_name, active, blocked, roles, created_at, updated_at
            FROM users
            WHERE id = $1
            "#
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_identifier(&self, identifier: &str) -> DbResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, display_name, active, blocked, roles, created_at, updated_at
            FROM users
            WHERE lower(email) = lower($1) OR username = $1
            ORDER BY (lower(email) = lower($1)) DESC
            LIMIT 1
            "#
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_password_hash(&self, user_id: i64) -> DbResult<Option<String>> {
        let hash: Option<(String,)> = sqlx::query_as("SELECT password FROM passwords WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(hash.map(|(h,)| h))
    }
}

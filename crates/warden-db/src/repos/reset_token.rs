//! Reset token repository (`authtokens` table)

use async_trait::async_trait;
use sqlx::PgPool;

use super::ResetTokenRepository;
use crate::{DbResult, NewResetToken, ResetToken};

#[derive(Clone)]
pub struct ResetTokenRepo {
    pool: PgPool,
}

impl ResetTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenRepository for ResetTokenRepo {
    /// Concurrent issues for the same user queue on the user row lock, so the
    /// later one always sees and invalidates the earlier token instead of
    /// tripping `authtokens_one_valid_per_type`.
    async fn issue(&self, new: NewResetToken) -> DbResult<ResetToken> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(new.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let invalidated = sqlx::query(
            r#"
            UPDATE authtokens
            SET is_valid = FALSE, updated_at = NOW()
            WHERE user_id = $1 AND token_type = $2 AND is_valid
            "#
        )
        .bind(new.user_id)
        .bind(&new.token_type)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let token = sqlx::query_as::<_, ResetToken>(
            r#"
            INSERT INTO authtokens
                (user_id, provider_user_id, token_provider_id, token_type, token, is_valid, redirect_url)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6)
            RETURNING
                id, user_id, provider_user_id, token_provider_id, token_type, token,
                is_valid, redirect_url, created_at, updated_at
            "#
        )
        .bind(new.user_id)
        .bind(&new.provider_user_id)
        .bind(&new.token_provider_id)
        .bind(&new.token_type)
        .bind(&new.token)
        .bind(&new.redirect_url)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if invalidated > 0 {
            tracing::debug!(
                user_id = new.user_id,
                token_type = %new.token_type,
                invalidated,
                "Invalidated superseded auth tokens"
            );
        }

        Ok(token)
    }

    async fn find(&self, user_id: i64, token_type: &str, token: &str) -> DbResult<Option<ResetToken>> {
        let row = sqlx::query_as::<_, ResetToken>(
            r#"
            SELECT
                id, user_id, provider_user_id, token_provider_id, token_type, token,
                is_valid, redirect_url, created_at, updated_at
            FROM authtokens
            WHERE user_id = $1 AND token_type = $2 AND token = $3
            "#
        )
        .bind(user_id)
        .bind(token_type)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn consume_with_password(
        &self,
        token_id: i64,
        user_id: i64,
        password_hash: &str,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Row lock via DELETE: a concurrent commit on the same token waits here
        // and then sees no row.
        let consumed: Option<(i64,)> = sqlx::query_as(
            "DELETE FROM authtokens WHERE id = $1 AND user_id = $2 AND is_valid RETURNING id",
        )
        .bind(token_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if consumed.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO passwords (user_id, password)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET password = EXCLUDED.password, updated_at = NOW()
            "#
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }
}

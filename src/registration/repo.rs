use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::repo_types::{ActivationToken, User, UserStatus};

/// Errors surfaced by the persistence layer.
///
/// Unique-constraint violations are translated into the matching variant so
/// callers never have to inspect raw database errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("activation code already in use")]
    DuplicateCode,
    #[error("row not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable storage for users and their activation tokens.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] when the email is taken;
    /// the unique constraint is what decides concurrent registrations.
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Idempotent when the status already has the target value; fails with
    /// [`StoreError::NotFound`] only when the row is gone.
    async fn update_user_status(&self, id: Uuid, status: UserStatus) -> Result<(), StoreError>;

    /// Fails with [`StoreError::DuplicateCode`] when the code value collides
    /// with another live token.
    async fn create_activation_token(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<ActivationToken, StoreError>;

    async fn find_activation_token(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<ActivationToken>, StoreError>;

    async fn delete_activation_token(&self, user_id: Uuid, code: &str) -> Result<(), StoreError>;

    /// Consume the token and mark the user active in a single transaction.
    ///
    /// Fails with [`StoreError::NotFound`] when the token was already
    /// consumed; the user row is left untouched in that case. Partial
    /// application (status flipped but token retained, or the reverse)
    /// cannot be observed.
    async fn activate_user(&self, user_id: Uuid, code: &str) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn violates_constraint(err: &sqlx::Error, name: &str) -> bool {
    err.as_database_error()
        .and_then(|db| db.constraint())
        .map(|c| c.contains(name))
        == Some(true)
}

#[async_trait]
impl RegistrationStore for PgStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, status, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "users_email") {
                StoreError::DuplicateEmail
            } else {
                StoreError::Database(e)
            }
        })?;
        info!(user_id = %user.id, email = %user.email, "user created");
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, status, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, status, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user_status(&self, id: Uuid, status: UserStatus) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
            SET status = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_activation_token(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<ActivationToken, StoreError> {
        let token = sqlx::query_as::<_, ActivationToken>(
            r#"
            INSERT INTO activation_tokens (user_id, code)
            VALUES ($1, $2)
            RETURNING user_id, code, created_at
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if violates_constraint(&e, "activation_tokens_code") {
                StoreError::DuplicateCode
            } else {
                StoreError::Database(e)
            }
        })?;
        debug!(user_id = %user_id, "activation token created");
        Ok(token)
    }

    async fn find_activation_token(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<ActivationToken>, StoreError> {
        let token = sqlx::query_as::<_, ActivationToken>(
            r#"
            SELECT user_id, code, created_at
            FROM activation_tokens
            WHERE user_id = $1 AND code = $2
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn delete_activation_token(&self, user_id: Uuid, code: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM activation_tokens WHERE user_id = $1 AND code = $2")
            .bind(user_id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        debug!(user_id = %user_id, "activation token deleted");
        Ok(())
    }

    async fn activate_user(&self, user_id: Uuid, code: &str) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM activation_tokens WHERE user_id = $1 AND code = $2")
            .bind(user_id)
            .bind(code)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            // a concurrent activation consumed the token first; the dropped
            // transaction rolls back
            return Err(StoreError::NotFound);
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET status = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, email, password_hash, status, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(UserStatus::Active)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        tx.commit().await?;
        info!(user_id = %user.id, "user activated");
        Ok(user)
    }
}

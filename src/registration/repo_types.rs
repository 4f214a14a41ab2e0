use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle state of an account. Pending at creation, a single transition
/// to Active on successful code verification, nothing after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                           // unique user ID
    pub email: String,                      // canonical (lowercased) email
    #[serde(skip_serializing)]
    pub password_hash: String,              // Argon2 hash, not exposed in JSON
    pub status: UserStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>, // set on status transition
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// One-time code issued at registration, consumed on activation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivationToken {
    pub user_id: Uuid,
    pub code: String, // 4-digit numeric string, globally unique while live
    pub created_at: OffsetDateTime,
}

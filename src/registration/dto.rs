use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{User, UserStatus};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Public view of a user, returned by register and activate.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub status: UserStatus,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            status: user.status,
        }
    }
}

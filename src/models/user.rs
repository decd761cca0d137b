// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_INSTRUCTOR: &str = "instructor";
pub const ROLE_ADMIN: &str = "admin";

/// Represents the 'users' table in the database.
/// Accounts are managed by the identity service; the quiz core only reads them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// User role: 'student', 'instructor' or 'admin'.
    pub role: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

//! User model
//!
//! This module defines the User entity for the DevWrite auth service.
//! Users are the credential records that sessions and tokens are
//! issued against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity representing a registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name (optional)
    pub name: Option<String>,
    /// Avatar image URL (optional)
    pub image: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password must already be hashed before calling this.
    /// Use `services::password::hash_password()` to hash it.
    pub fn new(
        email: String,
        password_hash: String,
        name: Option<String>,
        image: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            email,
            password_hash,
            name,
            image,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display name used in access-token claims.
    ///
    /// Falls back to a placeholder when no name was provided, matching
    /// what clients expect in the `name` claim.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "---".to_string())
    }
}

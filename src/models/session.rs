//! Session model
//!
//! A session row represents one issued refresh-token lineage for a
//! (user, device) pair. Rows are soft-deleted only: `is_revoked` moves
//! from false to true exactly once and rows are never physically
//! deleted, so the full rotation history stays available as an audit
//! trail for reuse detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session entity backing a refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (uuid v4); referenced by the refresh-token `sid` claim
    pub id: String,
    /// Owning user ID
    pub user_id: i64,
    /// One-way hash of the client device identifier
    pub device_id_hash: String,
    /// Client user-agent string, informational only
    pub device_info: Option<String>,
    /// Client IP address, informational only
    pub ip_address: Option<String>,
    /// Soft-delete flag; set on logout, rotation, or reuse detection
    pub is_revoked: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last time this session was used to mint tokens
    pub last_used_at: DateTime<Utc>,
    /// Expiration timestamp; fixed at creation, never extended
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Check if the session can still back a refresh token
    pub fn is_active(&self) -> bool {
        !self.is_revoked && !self.is_expired()
    }
}

/// Input for creating a new session row
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Owning user ID
    pub user_id: i64,
    /// One-way hash of the client device identifier
    pub device_id_hash: String,
    /// Client user-agent string (optional)
    pub device_info: Option<String>,
    /// Client IP address (optional)
    pub ip_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_expiring_in(hours: i64) -> Session {
        let now = Utc::now();
        Session {
            id: "test-session".to_string(),
            user_id: 1,
            device_id_hash: "abc".to_string(),
            device_info: None,
            ip_address: None,
            is_revoked: false,
            created_at: now,
            last_used_at: now,
            expires_at: now + Duration::hours(hours),
        }
    }

    #[test]
    fn test_session_expiration_check() {
        assert!(session_expiring_in(-1).is_expired());
        assert!(!session_expiring_in(1).is_expired());
    }

    #[test]
    fn test_revoked_session_is_not_active() {
        let mut session = session_expiring_in(1);
        assert!(session.is_active());

        session.is_revoked = true;
        assert!(!session.is_active());
    }

    #[test]
    fn test_expired_session_is_not_active() {
        let session = session_expiring_in(-1);
        assert!(!session.is_active());
    }
}

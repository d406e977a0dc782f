//! Session repository
//!
//! Database operations for refresh-token sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL
//!
//! Sessions are never physically deleted. Revocation sets `is_revoked`
//! and the row stays behind as the audit trail that reuse detection
//! depends on: a refresh token whose session row is revoked (or absent)
//! is treated as replayed.
//!
//! `revoke` is a conditional update (`WHERE is_revoked = 0`). When two
//! callers race to rotate the same session, exactly one observes the
//! transition; the loser sees `false` and must take the reuse path.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{NewSession, Session};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new active session row with the given lifetime
    async fn create(&self, new: &NewSession, ttl_days: i64) -> Result<Session>;

    /// Get a session by ID only if it is still active (not revoked, not expired).
    ///
    /// Revoked and missing rows both return `None`; callers cannot tell
    /// them apart.
    async fn find_active_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Conditionally revoke one session.
    ///
    /// Returns `true` only if this call flipped the row from active to
    /// revoked. Returns `false` if the row was already revoked or does
    /// not exist.
    async fn revoke(&self, id: &str) -> Result<bool>;

    /// Revoke all active sessions for a (user, device) pair.
    ///
    /// Returns the number of rows revoked. Idempotent.
    async fn revoke_for_device(&self, user_id: i64, device_id_hash: &str) -> Result<i64>;

    /// Revoke all active sessions for a user across every device.
    ///
    /// Returns the number of rows revoked. Idempotent.
    async fn revoke_for_user(&self, user_id: i64) -> Result<i64>;

    /// Update the `last_used_at` timestamp of a session
    async fn touch(&self, id: &str) -> Result<()>;

    /// Count active sessions for a (user, device) pair
    async fn count_active_for_device(&self, user_id: i64, device_id_hash: &str) -> Result<i64>;

    /// List all sessions (active and revoked) for a user
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Session>>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, new: &NewSession, ttl_days: i64) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            device_id_hash: new.device_id_hash.clone(),
            device_info: new.device_info.clone(),
            ip_address: new.ip_address.clone(),
            is_revoked: false,
            created_at: now,
            last_used_at: now,
            expires_at: now + Duration::days(ttl_days),
        };

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                insert_session_sqlite(self.pool.as_sqlite().unwrap(), &session).await?
            }
            DatabaseDriver::Mysql => {
                insert_session_mysql(self.pool.as_mysql().unwrap(), &session).await?
            }
        }

        Ok(session)
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_active_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                find_active_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn revoke(&self, id: &str) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("UPDATE sessions SET is_revoked = 1 WHERE id = ? AND is_revoked = 0")
                    .bind(id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to revoke session")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("UPDATE sessions SET is_revoked = 1 WHERE id = ? AND is_revoked = 0")
                    .bind(id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to revoke session")?
                    .rows_affected()
            }
        };

        Ok(affected == 1)
    }

    async fn revoke_for_device(&self, user_id: i64, device_id_hash: &str) -> Result<i64> {
        let query = "UPDATE sessions SET is_revoked = 1 \
                     WHERE user_id = ? AND device_id_hash = ? AND is_revoked = 0";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(query)
                .bind(user_id)
                .bind(device_id_hash)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to revoke sessions for device")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(query)
                .bind(user_id)
                .bind(device_id_hash)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to revoke sessions for device")?
                .rows_affected(),
        };

        Ok(affected as i64)
    }

    async fn revoke_for_user(&self, user_id: i64) -> Result<i64> {
        let query = "UPDATE sessions SET is_revoked = 1 WHERE user_id = ? AND is_revoked = 0";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(query)
                .bind(user_id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to revoke sessions for user")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(query)
                .bind(user_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to revoke sessions for user")?
                .rows_affected(),
        };

        Ok(affected as i64)
    }

    async fn touch(&self, id: &str) -> Result<()> {
        let query = "UPDATE sessions SET last_used_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(query)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to touch session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(query)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to touch session")?;
            }
        }
        Ok(())
    }

    async fn count_active_for_device(&self, user_id: i64, device_id_hash: &str) -> Result<i64> {
        let query = "SELECT COUNT(*) AS cnt FROM sessions \
                     WHERE user_id = ? AND device_id_hash = ? AND is_revoked = 0 AND expires_at > ?";
        let now = Utc::now();
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(query)
                .bind(user_id)
                .bind(device_id_hash)
                .bind(now)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to count active sessions")?
                .get("cnt"),
            DatabaseDriver::Mysql => sqlx::query(query)
                .bind(user_id)
                .bind(device_id_hash)
                .bind(now)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to count active sessions")?
                .get("cnt"),
        };

        Ok(count)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Session>> {
        let query = "SELECT id, user_id, device_id_hash, device_info, ip_address, is_revoked, \
                     created_at, last_used_at, expires_at \
                     FROM sessions WHERE user_id = ? ORDER BY created_at DESC";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(query)
                    .bind(user_id)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list sessions")?;
                rows.iter().map(row_to_session_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(query)
                    .bind(user_id)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list sessions")?;
                rows.iter().map(row_to_session_mysql).collect()
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions
            (id, user_id, device_id_hash, device_info, ip_address, is_revoked,
             created_at, last_used_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(&session.device_id_hash)
    .bind(&session.device_info)
    .bind(&session.ip_address)
    .bind(session.is_revoked)
    .bind(session.created_at)
    .bind(session.last_used_at)
    .bind(session.expires_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(())
}

async fn find_active_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, device_id_hash, device_info, ip_address, is_revoked,
               created_at, last_used_at, expires_at
        FROM sessions
        WHERE id = ? AND is_revoked = 0 AND expires_at > ?
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_session_sqlite(&row)?)),
        None => Ok(None),
    }
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        device_id_hash: row.get("device_id_hash"),
        device_info: row.get("device_info"),
        ip_address: row.get("ip_address"),
        is_revoked: row.get("is_revoked"),
        created_at: row.get("created_at"),
        last_used_at: row.get("last_used_at"),
        expires_at: row.get("expires_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_session_mysql(pool: &MySqlPool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions
            (id, user_id, device_id_hash, device_info, ip_address, is_revoked,
             created_at, last_used_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(&session.device_id_hash)
    .bind(&session.device_info)
    .bind(&session.ip_address)
    .bind(session.is_revoked)
    .bind(session.created_at)
    .bind(session.last_used_at)
    .bind(session.expires_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(())
}

async fn find_active_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, device_id_hash, device_info, ip_address, is_revoked,
               created_at, last_used_at, expires_at
        FROM sessions
        WHERE id = ? AND is_revoked = 0 AND expires_at > ?
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_session_mysql(&row)?)),
        None => Ok(None),
    }
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        device_id_hash: row.get("device_id_hash"),
        device_info: row.get("device_info"),
        ip_address: row.get("ip_address"),
        is_revoked: row.get("is_revoked"),
        created_at: row.get("created_at"),
        last_used_at: row.get("last_used_at"),
        expires_at: row.get("expires_at"),
    })
}

//! Platform connections.
//!
//! Rows are created by the account layer; this crate only reads them and
//! flips their status.

use crate::codec::{decode_time, now};
use crate::error::{DatabaseError, Result};
use adledger_core::{ConnectionStatus, Platform};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// A credential binding between a client account and an ad platform.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique identifier
    pub id: String,
    /// Owning client account
    pub client_id: String,
    /// Platform the credentials are for
    pub platform: Platform,
    /// Opaque JSON credential blob
    pub credentials: String,
    /// Activation status
    pub status: ConnectionStatus,
    /// When the connection was created
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Connection> {
    let platform: String = row.try_get("platform")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Connection {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        platform: platform.parse()?,
        credentials: row.try_get("credentials")?,
        status: status.parse()?,
        created_at: decode_time(&created_at)?,
        updated_at: decode_time(&updated_at)?,
    })
}

/// Insert a new active connection.
pub async fn create_connection(
    pool: &SqlitePool,
    client_id: &str,
    platform: Platform,
    credentials: &str,
) -> Result<Connection> {
    let id = uuid::Uuid::new_v4().to_string();
    let timestamp = now();

    sqlx::query(
        "INSERT INTO connections (id, client_id, platform, credentials, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(client_id)
    .bind(platform.as_str())
    .bind(credentials)
    .bind(ConnectionStatus::Active.as_str())
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(pool)
    .await?;

    get_connection(pool, &id).await?.ok_or(DatabaseError::NotFound)
}

/// Look up a connection by id.
pub async fn get_connection(pool: &SqlitePool, id: &str) -> Result<Option<Connection>> {
    let row = sqlx::query(
        "SELECT id, client_id, platform, credentials, status, created_at, updated_at
         FROM connections WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// Every connection currently eligible for syncing, oldest first.
pub async fn list_active(pool: &SqlitePool) -> Result<Vec<Connection>> {
    let rows = sqlx::query(
        "SELECT id, client_id, platform, credentials, status, created_at, updated_at
         FROM connections WHERE status = ? ORDER BY created_at, id",
    )
    .bind(ConnectionStatus::Active.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Change a connection's status.
pub async fn set_status(pool: &SqlitePool, id: &str, status: ConnectionStatus) -> Result<()> {
    let result = sqlx::query("UPDATE connections SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFoundWithMessage(format!(
            "Connection '{id}' not found"
        )));
    }

    tracing::info!("Connection {} is now {}", id, status);
    Ok(())
}

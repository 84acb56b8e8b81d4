//! Tracked keywords.

use crate::codec::now;
use crate::error::{DatabaseError, Result};
use sqlx::{Row, SqlitePool};

/// A search keyword tracked for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Unique identifier
    pub id: String,
    /// Owning client account
    pub client_id: String,
    /// The search phrase
    pub keyword: String,
}

/// Return the keyword row for `(client_id, keyword)`, creating it if needed.
///
/// The phrase is trimmed before lookup.
pub async fn get_or_create(pool: &SqlitePool, client_id: &str, keyword: &str) -> Result<Keyword> {
    let keyword = keyword.trim();

    sqlx::query(
        "INSERT INTO keywords (id, client_id, keyword, created_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (client_id, keyword) DO NOTHING",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(client_id)
    .bind(keyword)
    .bind(now())
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT id, client_id, keyword FROM keywords WHERE client_id = ? AND keyword = ?")
        .bind(client_id)
        .bind(keyword)
        .fetch_optional(pool)
        .await?
        .ok_or(DatabaseError::NotFound)?;

    Ok(Keyword {
        id: row.try_get("id")?,
        client_id: row.try_get("client_id")?,
        keyword: row.try_get("keyword")?,
    })
}

/// Keywords tracked for a client, in insertion order.
pub async fn list_for_client(pool: &SqlitePool, client_id: &str) -> Result<Vec<Keyword>> {
    let rows = sqlx::query(
        "SELECT id, client_id, keyword FROM keywords WHERE client_id = ? ORDER BY created_at, keyword",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Keyword {
                id: row.try_get("id")?,
                client_id: row.try_get("client_id")?,
                keyword: row.try_get("keyword")?,
            })
        })
        .collect()
}

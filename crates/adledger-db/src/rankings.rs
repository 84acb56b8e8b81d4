//! Rank targets and the append-only observation log.

use crate::codec::{decode_time, now};
use crate::error::{DatabaseError, Result};
use adledger_core::RankPlatform;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// One stored position of a target for a keyword at a capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct RankObservation {
    /// Keyword the search was for
    pub keyword_id: String,
    /// Ranked entity
    pub target_id: String,
    /// Target identity on the surface
    pub identity: String,
    /// Surface the position was observed on
    pub platform: RankPlatform,
    /// 1-indexed position
    pub rank: u32,
    /// Capture batch timestamp
    pub captured_at: DateTime<Utc>,
}

/// Return the id of the target `(platform, identity)`, creating the row if
/// needed. Name and attributes are refreshed to the latest observed values.
pub async fn get_or_create_target(
    pool: &SqlitePool,
    platform: RankPlatform,
    identity: &str,
    display_name: &str,
    attributes: &BTreeMap<String, String>,
) -> Result<String> {
    let timestamp = now();
    let attributes = serde_json::to_string(attributes)?;

    sqlx::query(
        "INSERT INTO rank_targets (id, platform, identity, display_name, attributes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (platform, identity) DO UPDATE SET
             display_name = excluded.display_name,
             attributes = excluded.attributes,
             updated_at = excluded.updated_at",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(platform.as_str())
    .bind(identity)
    .bind(display_name)
    .bind(&attributes)
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(pool)
    .await?;

    sqlx::query_scalar::<_, String>("SELECT id FROM rank_targets WHERE platform = ? AND identity = ?")
        .bind(platform.as_str())
        .bind(identity)
        .fetch_optional(pool)
        .await?
        .ok_or(DatabaseError::NotFound)
}

/// Record one observation. Returns `false` when the same
/// `(keyword, target, platform, captured_at)` was already recorded.
pub async fn insert_observation(
    pool: &SqlitePool,
    keyword_id: &str,
    target_id: &str,
    platform: RankPlatform,
    rank: u32,
    captured_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO rank_observations (id, keyword_id, target_id, platform, rank, captured_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (keyword_id, target_id, platform, captured_at) DO NOTHING",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(keyword_id)
    .bind(target_id)
    .bind(platform.as_str())
    .bind(i64::from(rank))
    .bind(captured_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Observations for a keyword on one surface and capture, best rank first.
pub async fn list_observations(
    pool: &SqlitePool,
    keyword_id: &str,
    platform: RankPlatform,
    captured_at: DateTime<Utc>,
) -> Result<Vec<RankObservation>> {
    let rows = sqlx::query(
        "SELECT o.keyword_id, o.target_id, t.identity, o.platform, o.rank, o.captured_at
         FROM rank_observations o JOIN rank_targets t ON t.id = o.target_id
         WHERE o.keyword_id = ? AND o.platform = ? AND o.captured_at = ?
         ORDER BY o.rank",
    )
    .bind(keyword_id)
    .bind(platform.as_str())
    .bind(captured_at.to_rfc3339())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let platform: String = row.try_get("platform")?;
            let rank: i64 = row.try_get("rank")?;
            let captured_at: String = row.try_get("captured_at")?;
            Ok(RankObservation {
                keyword_id: row.try_get("keyword_id")?,
                target_id: row.try_get("target_id")?,
                identity: row.try_get("identity")?,
                platform: platform.parse()?,
                rank: crate::codec::decode_count(rank),
                captured_at: decode_time(&captured_at)?,
            })
        })
        .collect()
}

/// Number of stored targets on a surface.
pub async fn count_targets(pool: &SqlitePool, platform: RankPlatform) -> Result<i64> {
    Ok(
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM rank_targets WHERE platform = ?")
            .bind(platform.as_str())
            .fetch_one(pool)
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{keywords, Database};

    #[tokio::test]
    async fn test_target_identity_is_unique_per_platform() {
        let db = Database::new(":memory:", 1).await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        let attrs = BTreeMap::new();

        let a = get_or_create_target(db.pool(), RankPlatform::Place, "101", "Old name", &attrs)
            .await
            .expect("create");
        let b = get_or_create_target(db.pool(), RankPlatform::Place, "101", "New name", &attrs)
            .await
            .expect("reuse");
        let c = get_or_create_target(db.pool(), RankPlatform::View, "101", "Post", &attrs)
            .await
            .expect("other platform");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(count_targets(db.pool(), RankPlatform::Place).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_observation_ignored() {
        let db = Database::new(":memory:", 1).await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        let keyword = keywords::get_or_create(db.pool(), "client-1", "임플란트")
            .await
            .expect("keyword");
        let target = get_or_create_target(db.pool(), RankPlatform::Ad, "clinic.kr", "Clinic", &BTreeMap::new())
            .await
            .expect("target");
        let captured_at = Utc::now();

        assert!(insert_observation(db.pool(), &keyword.id, &target, RankPlatform::Ad, 2, captured_at)
            .await
            .expect("insert"));
        assert!(!insert_observation(db.pool(), &keyword.id, &target, RankPlatform::Ad, 5, captured_at)
            .await
            .expect("insert again"));

        let stored = list_observations(db.pool(), &keyword.id, RankPlatform::Ad, captured_at)
            .await
            .expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rank, 2);
    }
}

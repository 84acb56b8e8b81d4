//! Storing one ranking batch.

use crate::error::Result;
use adledger_core::RankPlatform;
use adledger_db::{keywords, rankings};
use adledger_scraper::RankedItem;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;

/// Persist a surface's ranking for a keyword captured at `captured_at`.
///
/// Identities seen more than once keep their first (best) rank. Returns the
/// number of observations written.
pub async fn persist_rankings(
    pool: &SqlitePool,
    client_id: &str,
    keyword: &str,
    platform: RankPlatform,
    items: &[RankedItem],
    captured_at: DateTime<Utc>,
) -> Result<usize> {
    if items.is_empty() {
        return Ok(0);
    }

    let keyword = keywords::get_or_create(pool, client_id, keyword).await?;

    let mut seen = HashSet::new();
    let mut written = 0;
    for item in items.iter().filter(|item| seen.insert(item.identity.as_str())) {
        let target_id = rankings::get_or_create_target(
            pool,
            platform,
            &item.identity,
            &item.display_name,
            &item.attributes,
        )
        .await?;

        if rankings::insert_observation(pool, &keyword.id, &target_id, platform, item.rank, captured_at)
            .await?
        {
            written += 1;
        }
    }

    if written < items.len() {
        tracing::debug!(
            "{} '{}': kept {} of {} ranked items",
            platform,
            keyword.keyword,
            written,
            items.len()
        );
    }
    Ok(written)
}

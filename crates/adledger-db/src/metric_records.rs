//! Campaign metric records, one row per `(connection, campaign, date, source)`.

use crate::codec::{decode_date, encode_date, now};
use crate::error::Result;
use adledger_core::{CampaignMetrics, MetricValues, SourceKind};
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};

const SELECT_RECORD: &str = "SELECT connection_id, campaign_id, campaign_name, metric_date, source,
        spend, impressions, clicks, conversions, revenue, metadata
     FROM metric_records";

/// A stored metric observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// Connection the figures were fetched through
    pub connection_id: String,
    /// The campaign and its figures
    pub metrics: CampaignMetrics,
    /// Where the figures came from
    pub source: SourceKind,
    /// Provenance for reconciled rows
    pub metadata: Option<serde_json::Value>,
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MetricRecord> {
    let metric_date: String = row.try_get("metric_date")?;
    let source: String = row.try_get("source")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(MetricRecord {
        connection_id: row.try_get("connection_id")?,
        metrics: CampaignMetrics {
            campaign_id: row.try_get("campaign_id")?,
            campaign_name: row.try_get("campaign_name")?,
            date: decode_date(&metric_date)?,
            values: MetricValues {
                spend: row.try_get("spend")?,
                impressions: row.try_get("impressions")?,
                clicks: row.try_get("clicks")?,
                conversions: row.try_get("conversions")?,
                revenue: row.try_get("revenue")?,
            },
        },
        source: source.parse()?,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
    })
}

/// Insert or overwrite the record for `(connection, campaign, date, source)`.
///
/// A missing campaign name on the incoming row keeps the stored one.
pub async fn upsert(
    pool: &SqlitePool,
    connection_id: &str,
    metrics: &CampaignMetrics,
    source: SourceKind,
    metadata: Option<&serde_json::Value>,
) -> Result<()> {
    let timestamp = now();
    let metadata = metadata.map(serde_json::to_string).transpose()?;
    let values = &metrics.values;

    sqlx::query(
        "INSERT INTO metric_records (id, connection_id, campaign_id, campaign_name, metric_date, source,
             spend, impressions, clicks, conversions, revenue, metadata, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (connection_id, campaign_id, metric_date, source) DO UPDATE SET
             campaign_name = COALESCE(excluded.campaign_name, metric_records.campaign_name),
             spend = excluded.spend,
             impressions = excluded.impressions,
             clicks = excluded.clicks,
             conversions = excluded.conversions,
             revenue = excluded.revenue,
             metadata = excluded.metadata,
             updated_at = excluded.updated_at",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(connection_id)
    .bind(&metrics.campaign_id)
    .bind(&metrics.campaign_name)
    .bind(encode_date(metrics.date))
    .bind(source.as_str())
    .bind(values.spend)
    .bind(values.impressions)
    .bind(values.clicks)
    .bind(values.conversions)
    .bind(values.revenue)
    .bind(metadata)
    .bind(&timestamp)
    .bind(&timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

/// Every record of a connection for one day, grouped by campaign.
pub async fn list_for_date(
    pool: &SqlitePool,
    connection_id: &str,
    date: NaiveDate,
) -> Result<Vec<MetricRecord>> {
    let rows = sqlx::query(&format!(
        "{SELECT_RECORD} WHERE connection_id = ? AND metric_date = ? ORDER BY campaign_id, source"
    ))
    .bind(connection_id)
    .bind(encode_date(date))
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Records of one source kind for a connection and day.
pub async fn list_for_date_by_source(
    pool: &SqlitePool,
    connection_id: &str,
    date: NaiveDate,
    source: SourceKind,
) -> Result<Vec<MetricRecord>> {
    let rows = sqlx::query(&format!(
        "{SELECT_RECORD} WHERE connection_id = ? AND metric_date = ? AND source = ? ORDER BY campaign_id"
    ))
    .bind(connection_id)
    .bind(encode_date(date))
    .bind(source.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::create_connection;
    use crate::Database;
    use adledger_core::Platform;

    fn metrics(campaign: &str, name: Option<&str>, spend: f64) -> CampaignMetrics {
        CampaignMetrics {
            campaign_id: campaign.to_string(),
            campaign_name: name.map(str::to_string),
            date: NaiveDate::from_ymd_opt(2026, 10, 13).unwrap(),
            values: MetricValues {
                spend,
                impressions: 1000,
                clicks: 20,
                ..MetricValues::default()
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_per_source() {
        let db = Database::new(":memory:", 1).await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        let conn = create_connection(db.pool(), "client-1", Platform::NaverSearchAd, "{}")
            .await
            .expect("connection");
        let date = NaiveDate::from_ymd_opt(2026, 10, 13).unwrap();

        upsert(db.pool(), &conn.id, &metrics("cmp-1", Some("파워링크"), 100.0), SourceKind::Api, None)
            .await
            .expect("api");
        upsert(db.pool(), &conn.id, &metrics("cmp-1", None, 120.0), SourceKind::Api, None)
            .await
            .expect("api again");
        upsert(db.pool(), &conn.id, &metrics("cmp-1", None, 70.0), SourceKind::Scraper, None)
            .await
            .expect("scraper");

        let all = list_for_date(db.pool(), &conn.id, date).await.expect("list");
        assert_eq!(all.len(), 2);

        let api = list_for_date_by_source(db.pool(), &conn.id, date, SourceKind::Api)
            .await
            .expect("api rows");
        assert_eq!(api.len(), 1);
        assert!((api[0].metrics.values.spend - 120.0).abs() < f64::EPSILON);
        assert_eq!(api[0].metrics.campaign_name.as_deref(), Some("파워링크"));
    }

    #[tokio::test]
    async fn test_metadata_round_trips() {
        let db = Database::new(":memory:", 1).await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        let conn = create_connection(db.pool(), "client-1", Platform::NaverSearchAd, "{}")
            .await
            .expect("connection");
        let provenance = serde_json::json!({"primary": "api", "sources": ["api", "scraper"]});

        upsert(
            db.pool(),
            &conn.id,
            &metrics("cmp-1", None, 100.0),
            SourceKind::Reconciled,
            Some(&provenance),
        )
        .await
        .expect("reconciled");

        let rows = list_for_date_by_source(
            db.pool(),
            &conn.id,
            NaiveDate::from_ymd_opt(2026, 10, 13).unwrap(),
            SourceKind::Reconciled,
        )
        .await
        .expect("list");
        assert_eq!(rows[0].metadata.as_ref(), Some(&provenance));
    }
}

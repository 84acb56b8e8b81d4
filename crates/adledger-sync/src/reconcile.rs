//! Merges per-source records into one canonical record per campaign and day.
//!
//! The API is primary whenever it reported; the scraped report only fills
//! in campaigns the API did not return. When both exist the spend variance
//! is measured and anything above the threshold is flagged for review,
//! without changing which figures are kept. Report rows keyed by campaign
//! name are matched to API campaign ids first.

use crate::error::Result;
use adledger_core::{CampaignMetrics, SourceKind};
use adledger_db::metric_records::{self, MetricRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};

/// How a reconciled record was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub reconciled_at: DateTime<Utc>,
    /// Source kinds that had a record for the campaign, sorted
    pub sources: Vec<SourceKind>,
    pub primary: SourceKind,
    /// `|api - scraper| / api` over spend, when both are present and
    /// the ratio is defined
    pub spend_variance: Option<f64>,
    pub variance_note: Option<String>,
    pub needs_review: bool,
}

/// The canonical figures for one campaign and day.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub metrics: CampaignMetrics,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq)]
enum Variance {
    Ratio(f64),
    /// API spend is zero while the report shows spend
    Undefined,
}

fn spend_variance(api: f64, scraper: f64) -> Variance {
    if api.abs() < f64::EPSILON {
        if scraper.abs() < f64::EPSILON {
            Variance::Ratio(0.0)
        } else {
            Variance::Undefined
        }
    } else {
        Variance::Ratio((api - scraper).abs() / api.abs())
    }
}

/// Reconcile the records of one campaign and day. Existing reconciled
/// records among the inputs are ignored; `None` when nothing else is left.
pub fn reconcile_group(
    records: &[&MetricRecord],
    threshold: f64,
    now: DateTime<Utc>,
) -> Option<Reconciled> {
    let find = |kind: SourceKind| records.iter().find(|r| r.source == kind).map(|r| &r.metrics);
    let api = find(SourceKind::Api);
    let scraper = find(SourceKind::Scraper);

    let (primary, chosen) = match (api, scraper) {
        (Some(api), _) => (SourceKind::Api, api),
        (None, Some(scraper)) => (SourceKind::Scraper, scraper),
        (None, None) => return None,
    };

    let mut sources: Vec<SourceKind> = records
        .iter()
        .map(|r| r.source)
        .filter(|kind| *kind != SourceKind::Reconciled)
        .collect();
    sources.sort();
    sources.dedup();

    let (spend_variance, variance_note) = match (api, scraper) {
        (Some(api), Some(scraper)) => {
            match spend_variance(api.values.spend, scraper.values.spend) {
                Variance::Ratio(ratio) if ratio > threshold => (
                    Some(ratio),
                    Some(format!(
                        "spend variance {:.1}% exceeds {:.1}% (api {}, scraper {})",
                        ratio * 100.0,
                        threshold * 100.0,
                        api.values.spend,
                        scraper.values.spend
                    )),
                ),
                Variance::Ratio(ratio) => (Some(ratio), None),
                Variance::Undefined => (
                    None,
                    Some(format!(
                        "api reports zero spend, scraper reports {}",
                        scraper.values.spend
                    )),
                ),
            }
        }
        _ => (None, None),
    };

    let mut metrics = chosen.clone();
    if metrics.campaign_name.is_none() {
        metrics.campaign_name = records.iter().find_map(|r| r.metrics.campaign_name.clone());
    }

    Some(Reconciled {
        metrics,
        provenance: Provenance {
            reconciled_at: now,
            sources,
            primary,
            needs_review: variance_note.is_some(),
            spend_variance,
            variance_note,
        },
    })
}

fn name_key(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Re-key scraped rows onto API campaign ids.
///
/// Report pages often carry only the campaign name, in which case the
/// scraper keys the row by that name. A scraped row whose id the API does
/// not know is matched by name against `api`; names shared by several API
/// campaigns are left alone.
pub fn resolve_campaign_ids(records: &mut [MetricRecord], api: &[MetricRecord]) {
    let known: HashSet<&str> = api.iter().map(|r| r.metrics.campaign_id.as_str()).collect();
    let mut by_name: HashMap<String, Option<&str>> = HashMap::new();
    for record in api {
        let Some(name) = record.metrics.campaign_name.as_deref() else {
            continue;
        };
        let id = record.metrics.campaign_id.as_str();
        by_name
            .entry(name_key(name))
            .and_modify(|existing| {
                if *existing != Some(id) {
                    *existing = None;
                }
            })
            .or_insert(Some(id));
    }

    for record in records.iter_mut().filter(|r| r.source == SourceKind::Scraper) {
        if known.contains(record.metrics.campaign_id.as_str()) {
            continue;
        }
        let label = record
            .metrics
            .campaign_name
            .as_deref()
            .unwrap_or(record.metrics.campaign_id.as_str());
        if let Some(Some(id)) = by_name.get(&name_key(label)) {
            tracing::debug!("Matched report campaign '{}' to {}", label, id);
            if record.metrics.campaign_name.is_none() {
                record.metrics.campaign_name = Some(record.metrics.campaign_id.clone());
            }
            record.metrics.campaign_id = (*id).to_string();
        }
    }
}

/// Store the per-source rows one attempt fetched for `date`, then reconcile
/// the campaigns they cover and upsert the results. Returns how many
/// reconciled records were written.
///
/// Only campaigns present in `fetched` are reconciled. An API row stored by
/// an earlier attempt still joins its campaign's group so the API stays
/// primary when only the report answered this time.
pub async fn reconcile_date(
    pool: &SqlitePool,
    connection_id: &str,
    date: NaiveDate,
    mut fetched: Vec<MetricRecord>,
    threshold: f64,
) -> Result<usize> {
    let stored_api =
        metric_records::list_for_date_by_source(pool, connection_id, date, SourceKind::Api).await?;
    let mut api: Vec<MetricRecord> = fetched
        .iter()
        .filter(|r| r.source == SourceKind::Api)
        .cloned()
        .collect();
    api.extend(stored_api.iter().cloned());
    resolve_campaign_ids(&mut fetched, &api);

    for record in &fetched {
        metric_records::upsert(pool, connection_id, &record.metrics, record.source, None).await?;
    }

    let mut campaigns: BTreeMap<&str, Vec<&MetricRecord>> = BTreeMap::new();
    for record in fetched.iter().filter(|r| r.source != SourceKind::Reconciled) {
        campaigns
            .entry(record.metrics.campaign_id.as_str())
            .or_default()
            .push(record);
    }
    for (campaign_id, group) in &mut campaigns {
        if group.iter().any(|r| r.source == SourceKind::Api) {
            continue;
        }
        if let Some(earlier) = stored_api.iter().find(|r| r.metrics.campaign_id == *campaign_id) {
            group.push(earlier);
        }
    }

    let now = Utc::now();
    let mut written = 0;
    for (campaign_id, group) in campaigns {
        let Some(reconciled) = reconcile_group(&group, threshold, now) else {
            continue;
        };
        if let Some(note) = &reconciled.provenance.variance_note {
            tracing::warn!("Campaign {} on {}: {}", campaign_id, date, note);
        }

        let metadata = serde_json::to_value(&reconciled.provenance)
            .map_err(adledger_db::DatabaseError::from)?;
        metric_records::upsert(
            pool,
            connection_id,
            &reconciled.metrics,
            SourceKind::Reconciled,
            Some(&metadata),
        )
        .await?;
        written += 1;
    }

    tracing::debug!("Reconciled {} campaigns for {} on {}", written, connection_id, date);
    Ok(written)
}

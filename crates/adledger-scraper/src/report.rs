//! Advertiser report pages as a fallback source of campaign metrics.

use std::sync::Arc;
use std::time::Duration;

use adledger_browser::{DeviceProfile, FetchOptions, PageFetcher};
use adledger_core::{CampaignMetrics, MetricValues, ScrapingConfig};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::cascade::{fetch_and_parse, Strategy};
use crate::embedded::{id_field, json_document, str_field};
use crate::error::{ParseMiss, ParseResult};
use crate::query::build_report_url;
use crate::snapshot::SnapshotWriter;
use crate::text::{element_text, text_lines};

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("table selector is hardcoded and valid"));
static ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("row selector is hardcoded and valid"));
static CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th, td").expect("cell selector is hardcoded and valid"));

static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([^:：]+?)\s*[:：]\s*(.+?)\s*$").expect("key-value regex is hardcoded and valid")
});

const CASCADE: [Strategy<ReportRow>; 3] = [
    Strategy::new("report-json", parse_json),
    Strategy::new("report-table", parse_table),
    Strategy::new("report-text", parse_text),
];

/// One campaign line of a report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub campaign_id: String,
    pub campaign_name: Option<String>,
    pub values: MetricValues,
}

/// Scrapes a per-connection report page for a given day.
pub struct ReportScraper {
    fetcher: Arc<dyn PageFetcher>,
    render_wait: Duration,
    snapshots: SnapshotWriter,
}

impl ReportScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ScrapingConfig) -> Self {
        Self {
            fetcher,
            render_wait: Duration::from_millis(config.render_wait_ms),
            snapshots: SnapshotWriter::new(config.snapshot_dir.clone()),
        }
    }

    /// Campaign metrics reported for `date`. Empty when the page is
    /// unreachable or unrecognisable.
    pub async fn fetch_report(&self, url_template: &str, date: NaiveDate) -> Vec<CampaignMetrics> {
        let url = build_report_url(url_template, date);
        let options = FetchOptions::rendered(DeviceProfile::Desktop, 0, self.render_wait);
        let keyword = date.to_string();

        fetch_and_parse(
            self.fetcher.as_ref(),
            &url,
            &options,
            &CASCADE,
            &self.snapshots,
            "report",
            &keyword,
        )
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|row| CampaignMetrics {
            campaign_id: row.campaign_id,
            campaign_name: row.campaign_name,
            date,
            values: row.values,
        })
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Id,
    Name,
    Impressions,
    Clicks,
    Spend,
    Conversions,
    Revenue,
}

/// Map a Korean or English header to its column. Revenue is checked before
/// conversions and ids before names.
fn column_for(header: &str) -> Option<Column> {
    let key: String = header
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '(' | ')'))
        .collect();
    let has = |needles: &[&str]| needles.iter().any(|n| key.contains(n));

    // Ratios and averages share words with the counts they derive from.
    if has(&["률", "율", "ctr", "cpc", "평균", "avg", "rate"]) {
        None
    } else if has(&["전환매출", "revenue", "convamt"]) {
        Some(Column::Revenue)
    } else if has(&["전환수", "conversion", "ccnt"]) {
        Some(Column::Conversions)
    } else if has(&["캠페인id", "campaignid", "nccampaignid"]) {
        Some(Column::Id)
    } else if has(&["캠페인", "campaign"]) {
        Some(Column::Name)
    } else if has(&["노출", "impression", "impcnt"]) {
        Some(Column::Impressions)
    } else if has(&["클릭수", "클릭", "click", "clkcnt"]) {
        Some(Column::Clicks)
    } else if has(&["비용", "광고비", "spend", "cost", "salesamt"]) {
        Some(Column::Spend)
    } else {
        None
    }
}

fn clean_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect()
}

fn parse_amount(raw: &str) -> Option<f64> {
    clean_number(raw).parse().ok()
}

#[allow(clippy::cast_possible_truncation)]
fn parse_count(raw: &str) -> Option<i64> {
    let cleaned = clean_number(raw);
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().map(|v| v.round() as i64))
}

#[derive(Debug, Default)]
struct RowBuilder {
    id: Option<String>,
    name: Option<String>,
    values: MetricValues,
    has_metric: bool,
}

impl RowBuilder {
    fn set(&mut self, column: Column, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        match column {
            Column::Id => self.id = Some(raw.to_string()),
            Column::Name => self.name = Some(raw.to_string()),
            Column::Impressions => self.metric(parse_count(raw), |v, n| v.impressions = n),
            Column::Clicks => self.metric(parse_count(raw), |v, n| v.clicks = n),
            Column::Conversions => self.metric(parse_count(raw), |v, n| v.conversions = n),
            Column::Spend => self.metric(parse_amount(raw), |v, n| v.spend = n),
            Column::Revenue => self.metric(parse_amount(raw), |v, n| v.revenue = n),
        }
    }

    fn metric<N>(&mut self, parsed: Option<N>, apply: impl FnOnce(&mut MetricValues, N)) {
        if let Some(n) = parsed {
            apply(&mut self.values, n);
            self.has_metric = true;
        }
    }

    fn is_started(&self) -> bool {
        self.id.is_some() || self.name.is_some() || self.has_metric
    }

    /// Rows without any metric are headings or totals, not campaigns.
    fn finish(self) -> Option<ReportRow> {
        if !self.has_metric {
            return None;
        }
        let campaign_id = self.id.clone().or_else(|| self.name.clone())?;
        if is_total_label(&campaign_id) {
            return None;
        }
        Some(ReportRow {
            campaign_id,
            campaign_name: self.name,
            values: self.values,
        })
    }
}

fn is_total_label(label: &str) -> bool {
    matches!(label.trim().to_lowercase().as_str(), "합계" | "총합계" | "total" | "sum")
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `{"rows": [...]}`, `{"data": [...]}`, or a top-level array of objects.
fn parse_json(content: &str) -> ParseResult<ReportRow> {
    let document = json_document(content)?;
    let rows = document
        .get("rows")
        .or_else(|| document.get("data"))
        .or(Some(&document))
        .and_then(Value::as_array)
        .ok_or_else(|| ParseMiss::NoMatch("no report rows".to_string()))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let object = row.as_object()?;
            let mut builder = RowBuilder {
                id: id_field(row, &["campaignId", "nccCampaignId", "id"]),
                name: str_field(row, &["campaignName", "campaign", "name"]).map(str::to_string),
                ..RowBuilder::default()
            };
            for (key, value) in object {
                let Some(column) = column_for(key) else { continue };
                if matches!(column, Column::Id | Column::Name) {
                    continue;
                }
                if let Some(text) = json_text(value) {
                    builder.set(column, &text);
                }
            }
            builder.finish()
        })
        .collect())
}

fn cells(row: &ElementRef<'_>) -> Vec<String> {
    row.select(&CELL).map(|cell| element_text(&cell)).collect()
}

/// First table whose header row names a campaign column and a metric.
fn parse_table(content: &str) -> ParseResult<ReportRow> {
    let document = Html::parse_document(content);

    for table in document.select(&TABLE) {
        let mut rows = table.select(&ROW);
        let Some(header) = rows.next() else { continue };
        let columns: Vec<Option<Column>> = cells(&header).iter().map(|h| column_for(h)).collect();

        let has_campaign = columns
            .iter()
            .any(|c| matches!(c, Some(Column::Id | Column::Name)));
        let has_metric = columns
            .iter()
            .flatten()
            .any(|c| !matches!(c, Column::Id | Column::Name));
        if !has_campaign || !has_metric {
            continue;
        }

        let parsed: Vec<ReportRow> = rows
            .filter_map(|row| {
                let mut builder = RowBuilder::default();
                for (column, value) in columns.iter().zip(cells(&row)) {
                    if let Some(column) = column {
                        builder.set(*column, &value);
                    }
                }
                builder.finish()
            })
            .collect();
        if !parsed.is_empty() {
            return Ok(parsed);
        }
    }

    Err(ParseMiss::NoMatch("no campaign table".to_string()))
}

/// `key: value` lines; a campaign key starts a new row.
fn parse_text(content: &str) -> ParseResult<ReportRow> {
    let mut rows = Vec::new();
    let mut current = RowBuilder::default();

    for line in text_lines(content) {
        let Some(caps) = KEY_VALUE.captures(&line) else { continue };
        let Some(column) = column_for(&caps[1]) else { continue };

        let starts_row = matches!(column, Column::Id | Column::Name)
            && (current.has_metric
                || (column == Column::Id && current.id.is_some())
                || (column == Column::Name && current.name.is_some()));
        if starts_row && current.is_started() {
            rows.extend(std::mem::take(&mut current).finish());
        }
        current.set(column, &caps[2]);
    }
    rows.extend(current.finish());

    if rows.is_empty() {
        return Err(ParseMiss::NoMatch("no key-value campaign lines".to_string()));
    }
    Ok(rows)
}

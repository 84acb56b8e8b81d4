//! Signed HTTP client with bounded retries.

use crate::credentials::SearchAdCredentials;
use crate::error::{Result, SearchAdError};
use crate::signing::sign;
use adledger_core::{CampaignMetrics, MetricValues, SearchAdConfig};
use chrono::NaiveDate;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const CAMPAIGNS_PATH: &str = "/ncc/campaigns";
const STATS_PATH: &str = "/stats";
const STAT_FIELDS: &str = r#"["impCnt","clkCnt","salesAmt","ccnt","convAmt"]"#;

/// Only idempotent requests are safe to resend.
#[must_use]
pub fn is_retry_eligible(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

fn is_transient(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// A campaign as listed by the platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Platform campaign id
    pub ncc_campaign_id: String,
    /// Campaign display name
    #[serde(default)]
    pub name: Option<String>,
}

/// One row of the daily statistics report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatRow {
    /// Campaign id the row belongs to
    pub id: String,
    /// Impressions
    pub imp_cnt: f64,
    /// Clicks
    pub clk_cnt: f64,
    /// Spend
    pub sales_amt: f64,
    /// Conversions
    pub ccnt: f64,
    /// Conversion revenue
    pub conv_amt: f64,
}

impl StatRow {
    #[allow(clippy::cast_possible_truncation)]
    fn values(&self) -> MetricValues {
        MetricValues {
            spend: self.sales_amt,
            impressions: self.imp_cnt.round() as i64,
            clicks: self.clk_cnt.round() as i64,
            conversions: self.ccnt.round() as i64,
            revenue: self.conv_amt,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    data: Vec<StatRow>,
}

/// Client for one advertiser account.
pub struct SearchAdClient {
    client: Client,
    base_url: String,
    credentials: SearchAdCredentials,
    max_retries: u32,
    base_delay: Duration,
}

impl SearchAdClient {
    /// Build a client for `credentials` against the configured endpoint.
    pub fn new(config: &SearchAdConfig, credentials: SearchAdCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        })
    }

    /// Credentials this client signs with.
    pub fn credentials(&self) -> &SearchAdCredentials {
        &self.credentials
    }

    /// Every campaign on the account. `None` when the platform stayed
    /// unavailable through all retries.
    pub async fn list_campaigns(&self) -> Result<Option<Vec<Campaign>>> {
        self.get_json(CAMPAIGNS_PATH, &[]).await
    }

    /// Daily totals for the given campaigns on `date`.
    pub async fn daily_stats(&self, ids: &[String], date: NaiveDate) -> Result<Option<Vec<StatRow>>> {
        let day = date.format("%Y-%m-%d").to_string();
        let time_range = serde_json::json!({ "since": day, "until": day }).to_string();
        let query = [
            ("ids", ids.join(",")),
            ("fields", STAT_FIELDS.to_string()),
            ("timeRange", time_range),
        ];

        let response: Option<StatsResponse> = self.get_json(STATS_PATH, &query).await?;
        Ok(response.map(|r| r.data))
    }

    /// Campaign metrics for `date`, joining the campaign list with its stats.
    pub async fn campaign_metrics(&self, date: NaiveDate) -> Result<Option<Vec<CampaignMetrics>>> {
        let Some(campaigns) = self.list_campaigns().await? else {
            return Ok(None);
        };
        if campaigns.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let ids: Vec<String> = campaigns.iter().map(|c| c.ncc_campaign_id.clone()).collect();
        let Some(rows) = self.daily_stats(&ids, date).await? else {
            return Ok(None);
        };

        let names: HashMap<&str, Option<&String>> = campaigns
            .iter()
            .map(|c| (c.ncc_campaign_id.as_str(), c.name.as_ref()))
            .collect();

        Ok(Some(
            rows.iter()
                .filter(|row| !row.id.is_empty())
                .map(|row| CampaignMetrics {
                    campaign_id: row.id.clone(),
                    campaign_name: names.get(row.id.as_str()).copied().flatten().cloned(),
                    date,
                    values: row.values(),
                })
                .collect(),
        ))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        match self.execute(Method::GET, path, query).await? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Send a signed request. Transient failures are retried with doubling
    /// backoff when the method allows it; `Ok(None)` once they run out.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<String>> {
        let url = format!("{}{}", self.base_url, path);
        let retries = if is_retry_eligible(&method) { self.max_retries } else { 0 };
        let mut attempt = 0u32;

        loop {
            let timestamp = chrono::Utc::now().timestamp_millis().to_string();
            let signature = sign(&timestamp, method.as_str(), path, &self.credentials.secret_key);

            let outcome = self
                .client
                .request(method.clone(), &url)
                .query(query)
                .header("X-Timestamp", &timestamp)
                .header("X-API-KEY", &self.credentials.api_key)
                .header("X-Customer", &self.credentials.customer_id)
                .header("X-Signature", signature)
                .send()
                .await;

            let reason = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(Some(response.text().await?));
                    }
                    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                        return Err(SearchAdError::AuthRejected {
                            status: status.as_u16(),
                        });
                    }
                    if !is_transient(status) {
                        let message = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(SearchAdError::Api {
                            status: status.as_u16(),
                            message,
                        });
                    }
                    format!("HTTP {}", status.as_u16())
                }
                Err(e) if e.is_timeout() => "timeout".to_string(),
                Err(e) => return Err(SearchAdError::Network(e)),
            };

            if attempt >= retries {
                tracing::warn!(
                    "{} {} unavailable after {} attempts ({})",
                    method,
                    path,
                    attempt + 1,
                    reason
                );
                return Ok(None);
            }

            let delay = self.backoff(attempt);
            tracing::debug!(
                "{} {} failed ({}), retry {}/{} in {:?}",
                method,
                path,
                reason,
                attempt + 1,
                retries,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_delay_ms: u64) -> SearchAdClient {
        let config = SearchAdConfig {
            base_delay_ms,
            ..SearchAdConfig::default()
        };
        let creds = SearchAdCredentials::from_json(
            r#"{"apiKey": "lic", "secretKey": "s", "customerId": "1"}"#,
        )
        .unwrap();
        SearchAdClient::new(&config, creds).unwrap()
    }

    #[test]
    fn test_only_idempotent_methods_retry() {
        assert!(is_retry_eligible(&Method::GET));
        assert!(!is_retry_eligible(&Method::POST));
        assert!(!is_retry_eligible(&Method::PUT));
    }

    #[test]
    fn test_transient_statuses() {
        for code in [429, 500, 502, 503, 504] {
            assert!(is_transient(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::NOT_IMPLEMENTED));
    }

    #[test]
    fn test_backoff_doubles() {
        let client = client(1000);
        assert_eq!(client.backoff(0), Duration::from_millis(1000));
        assert_eq!(client.backoff(1), Duration::from_millis(2000));
        assert_eq!(client.backoff(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_stat_row_mapping() {
        let row: StatRow = serde_json::from_str(
            r#"{"id": "cmp-1", "impCnt": 1000, "clkCnt": 25, "salesAmt": 70000.5, "ccnt": 3, "convAmt": 150000}"#,
        )
        .unwrap();
        let values = row.values();
        assert_eq!(values.impressions, 1000);
        assert_eq!(values.clicks, 25);
        assert_eq!(values.conversions, 3);
        assert!((values.spend - 70000.5).abs() < f64::EPSILON);
        assert!((values.revenue - 150_000.0).abs() < f64::EPSILON);
    }
}

//! Metric sources a connection's tasks pull from.

use adledger_core::{CampaignMetrics, SearchAdConfig, SourceKind};
use adledger_db::connections::Connection;
use adledger_scraper::ReportScraper;
use adledger_searchad::{SearchAdClient, SearchAdCredentials};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

/// Why a source delivered nothing.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Credentials were refused; the connection needs reauthentication
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// Still unavailable after every retry
    #[error("source unavailable")]
    Unavailable,

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

/// One origin of campaign metrics for a day.
#[async_trait::async_trait]
pub trait MetricSource: Send + Sync {
    /// Tag written on the records this source produces.
    fn kind(&self) -> SourceKind;

    /// Campaign figures for `date`. An empty list means the source has no
    /// data for that day.
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<CampaignMetrics>, SourceError>;
}

/// Builds the metric sources for a connection from its credentials.
pub trait MetricSourceProvider: Send + Sync {
    fn sources_for(&self, connection: &Connection) -> Result<Vec<Box<dyn MetricSource>>, SourceError>;
}

/// Platform REST API.
pub struct SearchAdSource {
    client: SearchAdClient,
}

impl SearchAdSource {
    pub fn new(client: SearchAdClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl MetricSource for SearchAdSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Vec<CampaignMetrics>, SourceError> {
        match self.client.campaign_metrics(date).await {
            Ok(Some(metrics)) => Ok(metrics),
            Ok(None) => Err(SourceError::Unavailable),
            Err(e) if e.is_auth_rejection() => Err(SourceError::AuthRejected(e.to_string())),
            Err(e) => Err(SourceError::Failed(e.to_string())),
        }
    }
}

/// Shared report page scraped through the browser.
pub struct ReportSource {
    scraper: Arc<ReportScraper>,
    url_template: String,
}

impl ReportSource {
    pub fn new(scraper: Arc<ReportScraper>, url_template: impl Into<String>) -> Self {
        Self {
            scraper,
            url_template: url_template.into(),
        }
    }
}

#[async_trait::async_trait]
impl MetricSource for ReportSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Scraper
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Vec<CampaignMetrics>, SourceError> {
        // The scraper fails to empty, so an unreadable page and a day
        // without campaigns look the same here.
        Ok(self.scraper.fetch_report(&self.url_template, date).await)
    }
}

/// Sources for ad platform connections: the API always, plus the report
/// page when the credentials name one.
pub struct PlatformSources {
    searchad: SearchAdConfig,
    report: Option<Arc<ReportScraper>>,
}

impl PlatformSources {
    pub fn new(searchad: SearchAdConfig, report: Option<Arc<ReportScraper>>) -> Self {
        Self { searchad, report }
    }
}

impl MetricSourceProvider for PlatformSources {
    fn sources_for(&self, connection: &Connection) -> Result<Vec<Box<dyn MetricSource>>, SourceError> {
        let credentials = SearchAdCredentials::from_json(&connection.credentials)
            .map_err(|e| SourceError::Failed(e.to_string()))?;
        let report_url = credentials.report_url.clone();
        let client = SearchAdClient::new(&self.searchad, credentials)
            .map_err(|e| SourceError::Failed(e.to_string()))?;

        let mut sources: Vec<Box<dyn MetricSource>> = vec![Box::new(SearchAdSource::new(client))];
        if let (Some(scraper), Some(url)) = (&self.report, report_url) {
            sources.push(Box::new(ReportSource::new(Arc::clone(scraper), url)));
        }
        Ok(sources)
    }
}

//! Shared types used across the AdLedger pipeline.
//!
//! Every value that drives branching (platform, task status, source kind)
//! is a closed enum. The string forms are the ones stored in the database.

use crate::error::LedgerError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ad platform a connection is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Naver Search Ad (signed REST API)
    NaverSearchAd,
}

impl Platform {
    /// Database representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NaverSearchAd => "naver_search_ad",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naver_search_ad" => Ok(Self::NaverSearchAd),
            other => Err(LedgerError::unknown("platform", other)),
        }
    }
}

/// Search surface a rank observation was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankPlatform {
    /// Map/place listing search
    Place,
    /// Blog and cafe ("VIEW") results
    View,
    /// Paid power-link ads
    Ad,
}

impl RankPlatform {
    /// Database representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::View => "view",
            Self::Ad => "ad",
        }
    }
}

impl fmt::Display for RankPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankPlatform {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "place" => Ok(Self::Place),
            "view" => Ok(Self::View),
            "ad" => Ok(Self::Ad),
            other => Err(LedgerError::unknown("rank platform", other)),
        }
    }
}

/// Activation status of a platform connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Credentials are usable
    Active,
    /// Disabled by the owner
    Inactive,
    /// The platform rejected the credentials (401/403)
    NeedsReauth,
}

impl ConnectionStatus {
    /// Database representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::NeedsReauth => "needs_reauth",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "needs_reauth" => Ok(Self::NeedsReauth),
            other => Err(LedgerError::unknown("connection status", other)),
        }
    }
}

/// Lifecycle state of a sync task.
///
/// `pending -> running -> {completed | failed | partial}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be picked up
    Pending,
    /// Currently executing
    Running,
    /// Finished with every source delivering
    Completed,
    /// Could not execute, or every metric source failed
    Failed,
    /// Some sources failed but data was reconciled
    Partial,
}

impl TaskStatus {
    /// Database representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    /// Whether no further automatic transition happens from this state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Partial)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "partial" => Ok(Self::Partial),
            other => Err(LedgerError::unknown("task status", other)),
        }
    }
}

/// Origin of a metric record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Platform REST API
    Api,
    /// Browser-scraped report
    Scraper,
    /// Derived by the reconciliation engine
    Reconciled,
}

impl SourceKind {
    /// Database representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Scraper => "scraper",
            Self::Reconciled => "reconciled",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(Self::Api),
            "scraper" => Ok(Self::Scraper),
            "reconciled" => Ok(Self::Reconciled),
            other => Err(LedgerError::unknown("source kind", other)),
        }
    }
}

/// The five figures every metric record carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    /// Ad spend in account currency
    pub spend: f64,
    /// Impression count
    pub impressions: i64,
    /// Click count
    pub clicks: i64,
    /// Conversion count
    pub conversions: i64,
    /// Conversion revenue in account currency
    pub revenue: f64,
}

impl MetricValues {
    /// Click-through rate, `None` when there were no impressions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ctr(&self) -> Option<f64> {
        if self.impressions > 0 {
            Some(self.clicks as f64 / self.impressions as f64)
        } else {
            None
        }
    }
}

/// One campaign's figures for one day, as delivered by a metric source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    /// Platform-side campaign identifier
    pub campaign_id: String,
    /// Human-readable campaign name, when the source provides it
    pub campaign_name: Option<String>,
    /// Day the figures belong to
    pub date: NaiveDate,
    /// The figures
    pub values: MetricValues,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Partial,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().expect("parse"), status);
        }
    }

    #[test]
    fn test_task_status_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Partial.is_terminal());
    }

    #[test]
    fn test_unknown_values_rejected() {
        assert!("google_ads".parse::<Platform>().is_err());
        assert!("blog".parse::<RankPlatform>().is_err());
        assert!("manual".parse::<SourceKind>().is_err());
        assert!("suspended".parse::<ConnectionStatus>().is_err());
    }

    #[test]
    fn test_source_kind_serialization() {
        let json = serde_json::to_string(&SourceKind::Scraper).expect("serialize");
        assert_eq!(json, "\"scraper\"");
        let back: SourceKind = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, SourceKind::Scraper);
    }

    #[test]
    fn test_ctr() {
        let values = MetricValues {
            impressions: 200,
            clicks: 10,
            ..MetricValues::default()
        };
        assert_eq!(values.ctr(), Some(0.05));
        assert_eq!(MetricValues::default().ctr(), None);
    }
}

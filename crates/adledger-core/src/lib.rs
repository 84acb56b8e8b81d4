//! AdLedger Core - Foundation crate for the AdLedger acquisition pipeline.
//!
//! This crate provides shared types, error handling and configuration
//! management that all other AdLedger crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared enums and value types (`Platform`, `TaskStatus`, `SourceKind`, `MetricValues`)
//!
//! # Example
//!
//! ```rust
//! use adledger_core::{AppConfig, SourceKind};
//!
//! let config = AppConfig::default();
//! assert_eq!(config.sync.default_days, 7);
//! assert_eq!(SourceKind::Reconciled.as_str(), "reconciled");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, DatabaseConfig, ScheduleConfig, ScrapingConfig, SearchAdConfig,
    SyncConfig,
};
pub use error::{ConfigError, ConfigResult, LedgerError, Result};
pub use types::{
    CampaignMetrics, ConnectionStatus, MetricValues, Platform, RankPlatform, SourceKind,
    TaskStatus,
};

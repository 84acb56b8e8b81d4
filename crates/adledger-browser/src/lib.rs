//! Browser acquisition client for bot-hostile search surfaces.
//!
//! Provides isolated headless browser sessions with anti-fingerprinting,
//! per-domain pacing and a fail-to-empty fetch contract: every failure
//! (launch, timeout, blocked response) comes back as `None`.

pub mod content;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod fingerprint;

pub use content::{unwrap_json_envelope, validate_content};
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use fetcher::{extract_domain, referer_for, DeviceProfile, FetchOptions, PageFetcher};
pub use fingerprint::FingerprintConfig;

//! AdLedger SearchAd - signed client for the ad platform's reporting API.
//!
//! Every request carries an HMAC-SHA256 signature over the timestamp,
//! method and path. Transient failures (429, 5xx gateway errors, timeouts)
//! are retried for idempotent requests only; credential rejections surface
//! immediately so the caller can flag the connection for re-authorisation.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod credentials;
pub mod error;
pub mod signing;

// Re-export commonly used types
pub use client::{is_retry_eligible, SearchAdClient};
pub use credentials::SearchAdCredentials;
pub use error::{Result, SearchAdError};
pub use signing::sign;

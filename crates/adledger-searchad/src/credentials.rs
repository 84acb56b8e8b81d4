//! Connection credentials for the ad platform.

use crate::error::{Result, SearchAdError};
use serde::Deserialize;
use zeroize::Zeroizing;

/// API credentials decoded from a connection's credential blob.
#[derive(Clone)]
pub struct SearchAdCredentials {
    /// Access licence sent as `X-API-KEY`
    pub api_key: String,
    /// HMAC signing secret, wiped on drop
    pub secret_key: Zeroizing<String>,
    /// Advertiser account sent as `X-Customer`
    pub customer_id: String,
    /// Shared report page with a `{date}` placeholder, if the account has one
    pub report_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCredentials {
    #[serde(alias = "api_key", alias = "accessLicense")]
    api_key: String,
    #[serde(alias = "secret_key", alias = "secretKey")]
    secret: String,
    #[serde(alias = "customer_id")]
    customer_id: serde_json::Value,
    #[serde(default, alias = "report_url")]
    report_url: Option<String>,
}

impl SearchAdCredentials {
    /// Parse the JSON credential blob stored on a connection.
    pub fn from_json(blob: &str) -> Result<Self> {
        let raw: RawCredentials = serde_json::from_str(blob)
            .map_err(|e| SearchAdError::InvalidCredentials(e.to_string()))?;

        let customer_id = match raw.customer_id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => {
                return Err(SearchAdError::InvalidCredentials(
                    "customer id must be a string or number".to_string(),
                ))
            }
        };

        if raw.api_key.trim().is_empty() || raw.secret.trim().is_empty() || customer_id.is_empty() {
            return Err(SearchAdError::InvalidCredentials(
                "api key, secret and customer id are required".to_string(),
            ));
        }

        Ok(Self {
            api_key: raw.api_key,
            secret_key: Zeroizing::new(raw.secret),
            customer_id,
            report_url: raw.report_url.filter(|url| !url.trim().is_empty()),
        })
    }
}

impl std::fmt::Debug for SearchAdCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAdCredentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"[REDACTED]")
            .field("customer_id", &self.customer_id)
            .field("report_url", &self.report_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camel_case() {
        let creds = SearchAdCredentials::from_json(
            r#"{"apiKey": "lic", "secretKey": "s3cret", "customerId": 1234567}"#,
        )
        .unwrap();
        assert_eq!(creds.api_key, "lic");
        assert_eq!(creds.secret_key.as_str(), "s3cret");
        assert_eq!(creds.customer_id, "1234567");
        assert!(creds.report_url.is_none());
    }

    #[test]
    fn test_parse_snake_case_with_report_url() {
        let creds = SearchAdCredentials::from_json(
            r#"{"api_key": "lic", "secret_key": "s", "customer_id": "42",
                "report_url": "https://reports.test/{date}"}"#,
        )
        .unwrap();
        assert_eq!(creds.report_url.as_deref(), Some("https://reports.test/{date}"));
    }

    #[test]
    fn test_missing_secret_rejected() {
        let err = SearchAdCredentials::from_json(r#"{"apiKey": "lic", "customerId": "1"}"#);
        assert!(matches!(err, Err(SearchAdError::InvalidCredentials(_))));

        let blank = SearchAdCredentials::from_json(r#"{"apiKey": "lic", "secretKey": " ", "customerId": "1"}"#);
        assert!(matches!(blank, Err(SearchAdError::InvalidCredentials(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = SearchAdCredentials::from_json(
            r#"{"apiKey": "lic", "secretKey": "s3cret", "customerId": "1"}"#,
        )
        .unwrap();
        assert!(!format!("{creds:?}").contains("s3cret"));
    }
}

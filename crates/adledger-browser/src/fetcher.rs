use crate::error::{BrowserError, Result};
use std::time::Duration;

/// Viewport and user-agent family used for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceProfile {
    #[default]
    Desktop,
    Mobile,
}

/// Per-call fetch behaviour.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub profile: DeviceProfile,
    /// Number of viewport-height scrolls after load (0 disables interaction)
    pub scroll_steps: u32,
    /// Extra wait for script-driven rendering after navigation
    pub render_wait: Duration,
    /// Treat anything that is not JSON as a failed fetch
    pub expect_json: bool,
}

impl FetchOptions {
    pub fn json(profile: DeviceProfile) -> Self {
        Self {
            profile,
            expect_json: true,
            ..Self::default()
        }
    }

    pub fn rendered(profile: DeviceProfile, scroll_steps: u32, render_wait: Duration) -> Self {
        Self {
            profile,
            scroll_steps,
            render_wait,
            expect_json: false,
        }
    }
}

/// Fetches a document from a bot-hostile source.
///
/// Implementations never fail: "blocked", "timed out" and "no data" all
/// come back as `None`, because they cannot be told apart reliably.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Option<String>;
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))
        .map(|s| s.to_string())
}

/// Referrer that looks like an in-site navigation: the target's own origin.
pub fn referer_for(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))?;

    Ok(format!("{}://{}/", parsed.scheme(), host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://map.naver.com/p/api/search").unwrap(),
            "map.naver.com"
        );
        assert_eq!(
            extract_domain("http://m.place.naver.com:8080/place/list").unwrap(),
            "m.place.naver.com"
        );
    }

    #[test]
    fn test_extract_domain_invalid() {
        assert!(extract_domain("not-a-url").is_err());
    }

    #[test]
    fn test_referer_matches_target_origin() {
        assert_eq!(
            referer_for("https://search.naver.com/search.naver?where=view&query=x").unwrap(),
            "https://search.naver.com/"
        );
    }

    #[test]
    fn test_json_options() {
        let options = FetchOptions::json(DeviceProfile::Mobile);
        assert!(options.expect_json);
        assert_eq!(options.scroll_steps, 0);
        assert_eq!(options.profile, DeviceProfile::Mobile);
    }
}

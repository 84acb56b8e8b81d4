use crate::content::validate_content;
use crate::error::{BrowserError, Result};
use crate::fetcher::{extract_domain, referer_for, FetchOptions, PageFetcher};
use crate::fingerprint::FingerprintConfig;
use adledger_core::BrowserConfig as EngineConfig;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Per-domain pacing: hands out the wait needed before the next fetch.
#[derive(Debug)]
struct RateLimiter {
    next_slot: HashMap<String, Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    fn new(min_delay_ms: u64) -> Self {
        Self {
            next_slot: HashMap::new(),
            min_delay: Duration::from_millis(min_delay_ms),
        }
    }

    /// Reserve the next slot for `domain` and return how long to wait for it.
    fn reserve(&mut self, domain: &str, now: Instant) -> Duration {
        let slot = match self.next_slot.get(domain) {
            Some(next) if *next > now => *next,
            _ => now,
        };
        self.next_slot
            .insert(domain.to_string(), slot + self.min_delay);
        slot.saturating_duration_since(now)
    }
}

/// A launched browser and the task draining its CDP event stream.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(config: &EngineConfig, fingerprint: &FingerprintConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .arg(format!("--user-agent={}", fingerprint.user_agent))
            .arg(format!("--lang={}", fingerprint.accept_language))
            .arg("--disable-blink-features=AutomationControlled");
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(browser_config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Shut the browser down. Called on every exit path of a fetch.
    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Browser wait failed: {}", e);
        }
        self.handler.abort();
    }
}

/// Browser automation engine implementing the fail-to-empty fetch contract.
///
/// Every call launches its own browser; nothing is shared between fetches
/// except the per-domain pacing table.
pub struct BrowserEngine {
    config: EngineConfig,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl BrowserEngine {
    pub fn new(config: EngineConfig) -> Self {
        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(config.min_domain_interval_ms)));
        Self {
            config,
            rate_limiter,
        }
    }

    async fn pace(&self, domain: &str) {
        let wait = self.rate_limiter.lock().await.reserve(domain, Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Pacing {} for {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Load `url` in a fresh page and return `(status, content)`.
    async fn load(
        &self,
        session: &BrowserSession,
        url: &str,
        options: &FetchOptions,
        fingerprint: &FingerprintConfig,
    ) -> Result<(Option<u16>, String)> {
        let page = session.browser.new_page("about:blank").await?;

        page.execute(SetUserAgentOverrideParams::new(
            fingerprint.user_agent.clone(),
        ))
        .await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(fingerprint.viewport_width),
            i64::from(fingerprint.viewport_height),
            fingerprint.device_scale_factor,
            fingerprint.mobile,
        ))
        .await?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::json!({
                "Referer": referer_for(url)?,
                "Accept-Language": fingerprint.accept_language,
            }),
        )))
        .await?;

        self.navigate(&page, url).await?;

        let status = page
            .wait_for_navigation_response()
            .await
            .ok()
            .flatten()
            .and_then(|request| request.response.as_ref().map(|r| r.status))
            .and_then(|status| u16::try_from(status).ok());

        for _ in 0..options.scroll_steps {
            if let Err(e) = page
                .evaluate("window.scrollBy(0, window.innerHeight)")
                .await
            {
                tracing::debug!("Scroll simulation failed: {}", e);
                break;
            }
            let pause = rand::thread_rng().gen_range(300..=800);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }

        if !options.render_wait.is_zero() {
            tokio::time::sleep(options.render_wait).await;
        }

        let content = page.content().await?;
        Ok((status, content))
    }

    /// Navigate with a bounded timeout, retrying timeouts with a random pause.
    async fn navigate(&self, page: &Page, url: &str) -> Result<()> {
        let timeout = Duration::from_secs(self.config.navigation_timeout_secs);
        let attempts = self.config.navigation_retries + 1;

        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, page.goto(url)).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => return Err(BrowserError::NavigationError(e.to_string())),
                Err(_) if attempt < attempts => {
                    let delay = self.retry_delay();
                    tracing::warn!(
                        "Navigation to {} timed out (attempt {}/{}), retrying in {:?}",
                        url,
                        attempt,
                        attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(_) => {}
            }
        }

        Err(BrowserError::Timeout(format!(
            "{url} after {attempts} attempts"
        )))
    }

    fn retry_delay(&self) -> Duration {
        let min = self.config.retry_delay_min_ms;
        let max = self.config.retry_delay_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[async_trait::async_trait]
impl PageFetcher for BrowserEngine {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Option<String> {
        let domain = match extract_domain(url) {
            Ok(domain) => domain,
            Err(e) => {
                tracing::warn!("Refusing to fetch {}: {}", url, e);
                return None;
            }
        };
        self.pace(&domain).await;

        let fingerprint = FingerprintConfig::randomized(options.profile);
        let session = match BrowserSession::launch(&self.config, &fingerprint).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Browser launch failed for {}: {}", domain, e);
                return None;
            }
        };

        let outcome = self.load(&session, url, options, &fingerprint).await;
        session.close().await;

        match outcome {
            Ok((status, content)) => {
                let validated = validate_content(status, &content, options.expect_json);
                if validated.is_none() {
                    tracing::warn!(
                        "Discarding response from {} (status {:?}, {} bytes)",
                        domain,
                        status,
                        content.len()
                    );
                }
                validated
            }
            Err(e) => {
                tracing::warn!("Fetch of {} failed: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_spaces_same_domain() {
        let mut limiter = RateLimiter::new(100);
        let now = Instant::now();

        // First access goes immediately
        assert_eq!(limiter.reserve("map.naver.com", now), Duration::ZERO);

        // Immediate second access waits out the interval
        assert_eq!(
            limiter.reserve("map.naver.com", now),
            Duration::from_millis(100)
        );

        // A third queues behind the second
        assert_eq!(
            limiter.reserve("map.naver.com", now),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_rate_limiter_different_domains() {
        let mut limiter = RateLimiter::new(100);
        let now = Instant::now();

        assert_eq!(limiter.reserve("map.naver.com", now), Duration::ZERO);
        assert_eq!(limiter.reserve("search.naver.com", now), Duration::ZERO);
    }

    #[test]
    fn test_rate_limiter_slot_expires() {
        let mut limiter = RateLimiter::new(100);
        let now = Instant::now();

        limiter.reserve("map.naver.com", now);
        let later = now + Duration::from_millis(150);
        assert_eq!(limiter.reserve("map.naver.com", later), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_within_bounds() {
        let engine = BrowserEngine::new(EngineConfig::default());
        for _ in 0..20 {
            let delay = engine.retry_delay();
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(4000));
        }
    }

    #[tokio::test]
    async fn test_invalid_url_fails_to_empty() {
        let engine = BrowserEngine::new(EngineConfig::default());
        let result = engine.fetch("not-a-url", &FetchOptions::default()).await;
        assert!(result.is_none());
    }
}

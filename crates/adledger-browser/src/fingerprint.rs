use crate::fetcher::DeviceProfile;
use rand::seq::SliceRandom;

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

const MOBILE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; SM-S918N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G998N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
];

const DESKTOP_VIEWPORTS: &[(u32, u32)] = &[(1920, 1080), (1366, 768), (1536, 864), (1440, 900)];

const MOBILE_VIEWPORTS: &[(u32, u32)] = &[(390, 844), (412, 915), (375, 812), (360, 800)];

/// Fingerprint configuration for anti-detection
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub mobile: bool,
    pub accept_language: String,
    pub timezone: String,
}

impl FingerprintConfig {
    /// Generate a randomized fingerprint for the given device profile
    pub fn randomized(profile: DeviceProfile) -> Self {
        let mut rng = rand::thread_rng();

        let (agents, viewports, scale, mobile) = match profile {
            DeviceProfile::Desktop => (DESKTOP_USER_AGENTS, DESKTOP_VIEWPORTS, 1.0, false),
            DeviceProfile::Mobile => (MOBILE_USER_AGENTS, MOBILE_VIEWPORTS, 3.0, true),
        };

        let user_agent = agents.choose(&mut rng).copied().unwrap_or(agents[0]);
        let (width, height) = viewports.choose(&mut rng).copied().unwrap_or(viewports[0]);

        Self {
            user_agent: user_agent.to_string(),
            viewport_width: width,
            viewport_height: height,
            device_scale_factor: scale,
            mobile,
            accept_language: "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            timezone: "Asia/Seoul".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_randomized_fingerprint() {
        let config = FingerprintConfig::randomized(DeviceProfile::Desktop);
        assert!(!config.user_agent.is_empty());
        assert!(config.viewport_width > 0);
        assert!(config.viewport_height > 0);
        assert!(!config.mobile);
        assert_eq!(config.timezone, "Asia/Seoul");
    }

    #[test]
    fn test_mobile_profile_uses_mobile_pool() {
        for _ in 0..10 {
            let config = FingerprintConfig::randomized(DeviceProfile::Mobile);
            assert!(config.mobile);
            assert!(MOBILE_USER_AGENTS.contains(&config.user_agent.as_str()));
            assert!(config.viewport_width < config.viewport_height);
        }
    }

    #[test]
    fn test_fingerprint_variation() {
        // Probabilistic, but ten identical draws from a pool of four is very unlikely
        let configs: Vec<_> = (0..10)
            .map(|_| FingerprintConfig::randomized(DeviceProfile::Desktop))
            .collect();

        let first_ua = &configs[0].user_agent;
        let all_same = configs.iter().all(|c| &c.user_agent == first_ua);
        assert!(!all_same, "Expected variation in user agents");
    }
}

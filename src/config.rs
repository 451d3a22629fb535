//! Environment-driven tuning knobs.
//!
//! None of these affect correctness, only throughput and stealth. Defaults
//! differ per agent mode; every value can be overridden with an env var.

use std::time::Duration;

/// Which extraction pipeline this run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Metadata (advertiser, app name, store link) plus video id, one visit per URL.
    Unified,
    /// Video id only.
    VideoOnly,
    /// Image creatives: app name, image URL, subtitle via hover.
    ImageAds,
}

impl AgentMode {
    pub fn from_env() -> Self {
        match std::env::var("SCRAPE_MODE").unwrap_or_default().to_lowercase().as_str() {
            "video" => AgentMode::VideoOnly,
            "image" => AgentMode::ImageAds,
            _ => AgentMode::Unified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentMode::Unified => "unified",
            AgentMode::VideoOnly => "video",
            AgentMode::ImageAds => "image",
        }
    }
}

/// How the delay between failed attempts grows.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Random delay from a fixed window.
    Jittered { min_ms: u64, max_ms: u64 },
    /// base * 2^(attempt-1).
    Exponential { base_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: AgentMode,
    /// Concurrent page visits per batch.
    pub concurrent_pages: usize,
    /// Navigation timeout.
    pub max_wait_time_ms: u64,
    pub max_retries: u32,
    /// Post-click wait for the playback request to fire.
    pub post_click_wait_ms: u64,
    /// Attempt waits scale by this, raised to (attempt - 1).
    pub retry_wait_multiplier: f64,
    /// Post-navigation settle window, before the multiplier.
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,
    pub backoff: Backoff,
    pub batch_delay_min_ms: u64,
    pub batch_delay_max_ms: u64,
    /// Progressive per-page launch stagger inside one batch (image mode).
    pub stagger_min_ms: u64,
    pub stagger_max_ms: u64,
    /// Visits per launched browser before relaunching with a fresh identity.
    pub pages_per_browser: usize,
    /// Wall-clock session budget; checked between sessions.
    pub max_runtime: Duration,
    /// Rows per sheet read request (image mode scans in chunks).
    pub sheet_batch_size: usize,
    pub proxy_retry_delay_min_ms: u64,
    pub proxy_retry_delay_max_ms: u64,
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let mode = AgentMode::from_env();
        match mode {
            AgentMode::Unified => Config {
                mode,
                concurrent_pages: env_usize("CONCURRENT_PAGES", 8),
                max_wait_time_ms: env_u64("MAX_WAIT_TIME", 60_000),
                max_retries: env_u64("MAX_RETRIES", 4) as u32,
                post_click_wait_ms: env_u64("POST_CLICK_WAIT", 6_000),
                retry_wait_multiplier: 1.25,
                settle_min_ms: 2_500,
                settle_max_ms: 4_500,
                backoff: Backoff::Jittered { min_ms: 2_000, max_ms: 4_000 },
                batch_delay_min_ms: env_u64("BATCH_DELAY_MIN", 3_500),
                batch_delay_max_ms: env_u64("BATCH_DELAY_MAX", 7_000),
                stagger_min_ms: 0,
                stagger_max_ms: 0,
                pages_per_browser: env_usize("PAGES_PER_BROWSER", 40),
                max_runtime: Duration::from_secs(env_u64("MAX_RUNTIME_MINUTES", 330) * 60),
                sheet_batch_size: env_usize("SHEET_BATCH_SIZE", 1_000),
                proxy_retry_delay_min_ms: env_u64("PROXY_RETRY_DELAY_MIN", 30_000),
                proxy_retry_delay_max_ms: env_u64("PROXY_RETRY_DELAY_MAX", 90_000),
            },
            AgentMode::VideoOnly => Config {
                mode,
                concurrent_pages: env_usize("CONCURRENT_PAGES", 3),
                max_wait_time_ms: env_u64("MAX_WAIT_TIME", 60_000),
                max_retries: env_u64("MAX_RETRIES", 3) as u32,
                post_click_wait_ms: env_u64("POST_CLICK_WAIT", 12_000),
                retry_wait_multiplier: 1.5,
                settle_min_ms: 3_000,
                settle_max_ms: 3_000,
                backoff: Backoff::Exponential { base_ms: 2_000 },
                batch_delay_min_ms: env_u64("BATCH_DELAY_MIN", 3_500),
                batch_delay_max_ms: env_u64("BATCH_DELAY_MAX", 7_000),
                stagger_min_ms: 0,
                stagger_max_ms: 0,
                pages_per_browser: env_usize("PAGES_PER_BROWSER", 40),
                max_runtime: Duration::from_secs(env_u64("MAX_RUNTIME_MINUTES", 330) * 60),
                sheet_batch_size: env_usize("SHEET_BATCH_SIZE", 1_000),
                proxy_retry_delay_min_ms: env_u64("PROXY_RETRY_DELAY_MIN", 30_000),
                proxy_retry_delay_max_ms: env_u64("PROXY_RETRY_DELAY_MAX", 90_000),
            },
            AgentMode::ImageAds => Config {
                mode,
                concurrent_pages: env_usize("CONCURRENT_PAGES", 5),
                max_wait_time_ms: env_u64("MAX_WAIT_TIME", 60_000),
                max_retries: env_u64("MAX_RETRIES", 2) as u32,
                post_click_wait_ms: env_u64("POST_CLICK_WAIT", 6_000),
                retry_wait_multiplier: 1.5,
                settle_min_ms: 5_000,
                settle_max_ms: 8_000,
                backoff: Backoff::Jittered { min_ms: 3_000, max_ms: 6_000 },
                batch_delay_min_ms: env_u64("BATCH_DELAY_MIN", 8_000),
                batch_delay_max_ms: env_u64("BATCH_DELAY_MAX", 15_000),
                stagger_min_ms: env_u64("PAGE_LOAD_DELAY_MIN", 2_000),
                stagger_max_ms: env_u64("PAGE_LOAD_DELAY_MAX", 4_000),
                pages_per_browser: env_usize("PAGES_PER_BROWSER", 30),
                max_runtime: Duration::from_secs(env_u64("MAX_RUNTIME_MINUTES", 330) * 60),
                sheet_batch_size: env_usize("SHEET_BATCH_SIZE", 1_000),
                proxy_retry_delay_min_ms: env_u64("PROXY_RETRY_DELAY_MIN", 25_000),
                proxy_retry_delay_max_ms: env_u64("PROXY_RETRY_DELAY_MAX", 75_000),
            },
        }
    }

    /// Attempt-scaled wait: base * multiplier^(attempt-1).
    pub fn scaled_wait(&self, base_ms: u64, attempt: u32) -> Duration {
        let factor = self.retry_wait_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((base_ms as f64 * factor) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_wait_grows_per_attempt() {
        let mut cfg = Config::from_env();
        cfg.retry_wait_multiplier = 1.5;
        assert_eq!(cfg.scaled_wait(1_000, 1), Duration::from_millis(1_000));
        assert_eq!(cfg.scaled_wait(1_000, 2), Duration::from_millis(1_500));
        assert_eq!(cfg.scaled_wait(1_000, 3), Duration::from_millis(2_250));
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(AgentMode::Unified.label(), "unified");
        assert_eq!(AgentMode::ImageAds.label(), "image");
    }
}

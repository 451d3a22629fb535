//! Network-layer resource gate.
//!
//! Two jobs, both on the request-paused hook: drop traffic that wastes
//! bandwidth or leaks to trackers, and sniff the video id out of playback
//! requests before deciding anything. The sniff must run on every request
//! regardless of verdict, because the playback URL itself matches the
//! tracker-looking patterns.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision};
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::Fetch::{events::RequestPausedEvent, FailRequest};
use headless_chrome::protocol::cdp::Network;
use headless_chrome::Tab;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::AgentMode;

/// Substrings that mark a request as tracking/ad-infrastructure noise.
const BLOCKED_URL_PATTERNS: &[&str] = &[
    "analytics",
    "google-analytics",
    "doubleclick",
    "pagead",
    "facebook.com",
    "bing.com",
    "logs",
    "collect",
    "securepubads",
];

static PLAYBACK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-f0-9]{16}$|^[a-f0-9]{18}$").unwrap());

static EMBED_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"youtube\.com/embed/([^?/]+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Block,
}

/// Pure gate policy, separated from the CDP plumbing so it can be tested
/// against plain URLs.
pub fn decide(url: &str, resource_type: &Network::ResourceType, mode: AgentMode) -> GateDecision {
    // Ad creative hosts are always allowed; the creative IS the payload.
    if url.contains("googlesyndication.com/simgad") || url.contains("tpc.googlesyndication.com") {
        return GateDecision::Allow;
    }

    if BLOCKED_URL_PATTERNS.iter().any(|p| url.contains(p)) {
        return GateDecision::Block;
    }

    match resource_type {
        Network::ResourceType::Font
        | Network::ResourceType::Other
        | Network::ResourceType::Stylesheet => GateDecision::Block,
        Network::ResourceType::Image if mode != AgentMode::ImageAds => GateDecision::Block,
        _ => GateDecision::Allow,
    }
}

/// Write-once slot for the video id sniffed off the wire. First valid
/// observation wins; later ones are ignored.
#[derive(Clone, Default)]
pub struct VideoIdSlot {
    inner: Arc<Mutex<Option<String>>>,
}

impl VideoIdSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|g| g.clone())
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    fn set_once(&self, id: String) {
        if let Ok(mut guard) = self.inner.lock() {
            if guard.is_none() {
                println!("🎬 Video id observed on the wire: {}", id);
                *guard = Some(id);
            }
        }
    }

    /// Inspect one request URL for a video id. Three shapes, in order of
    /// trust: the playback endpoint's hex `id`, a YouTube embed path, and
    /// watch/get_video_info query parameters.
    pub fn observe(&self, url: &str) {
        if self.is_set() {
            return;
        }

        if url.contains("googlevideo.com/videoplayback") {
            if let Some(id) = query_param(url, &["id"]) {
                if PLAYBACK_ID_RE.is_match(&id) {
                    self.set_once(id);
                    return;
                }
            }
        }

        if let Some(caps) = EMBED_ID_RE.captures(url) {
            if let Some(id) = caps.get(1) {
                if !id.as_str().is_empty() {
                    self.set_once(id.as_str().to_string());
                    return;
                }
            }
        }

        if url.contains("youtube.com/watch") || url.contains("get_video_info") {
            if let Some(id) = query_param(url, &["video_id", "v"]) {
                if id.len() >= 11 {
                    self.set_once(id);
                }
            }
        }
    }
}

fn query_param(url: &str, names: &[&str]) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    for (k, v) in parsed.query_pairs() {
        if names.contains(&k.as_ref()) && !v.is_empty() {
            return Some(v.into_owned());
        }
    }
    None
}

/// Install the gate on a tab: every paused request is sniffed for a video
/// id, then allowed or failed according to the policy.
pub fn install(tab: &Arc<Tab>, mode: AgentMode, slot: VideoIdSlot) -> Result<()> {
    tab.enable_fetch(None, None)?;

    let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
        move |_transport: Arc<Transport>, _session_id: SessionId, event: RequestPausedEvent| {
            let url = event.params.request.url.clone();
            slot.observe(&url);

            match decide(&url, &event.params.resource_Type, mode) {
                GateDecision::Allow => RequestPausedDecision::Continue(None),
                GateDecision::Block => RequestPausedDecision::Fail(FailRequest {
                    request_id: event.params.request_id,
                    error_reason: Network::ErrorReason::BlockedByClient,
                }),
            }
        },
    );
    tab.enable_request_interception(interceptor)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creative_hosts_always_allowed() {
        // simgad sits under pagead-adjacent hosts, the allowlist must win
        assert_eq!(
            decide(
                "https://tpc.googlesyndication.com/simgad/12345",
                &Network::ResourceType::Image,
                AgentMode::Unified
            ),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_tracker_patterns_blocked() {
        for url in [
            "https://www.google-analytics.com/g/collect?v=2",
            "https://securepubads.g.doubleclick.net/tag/js/gpt.js",
            "https://www.facebook.com/tr?id=1",
        ] {
            assert_eq!(
                decide(url, &Network::ResourceType::Script, AgentMode::Unified),
                GateDecision::Block,
                "{} should be blocked",
                url
            );
        }
    }

    #[test]
    fn test_images_blocked_except_in_image_mode() {
        let url = "https://example.com/banner.png";
        assert_eq!(
            decide(url, &Network::ResourceType::Image, AgentMode::Unified),
            GateDecision::Block
        );
        assert_eq!(
            decide(url, &Network::ResourceType::Image, AgentMode::ImageAds),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_fonts_and_stylesheets_blocked() {
        assert_eq!(
            decide("https://fonts.gstatic.com/f.woff2", &Network::ResourceType::Font, AgentMode::ImageAds),
            GateDecision::Block
        );
        assert_eq!(
            decide("https://example.com/site.css", &Network::ResourceType::Stylesheet, AgentMode::Unified),
            GateDecision::Block
        );
    }

    #[test]
    fn test_document_and_script_allowed() {
        assert_eq!(
            decide("https://adstransparency.google.com/", &Network::ResourceType::Document, AgentMode::Unified),
            GateDecision::Allow
        );
        assert_eq!(
            decide("https://example.com/app.js", &Network::ResourceType::Script, AgentMode::Unified),
            GateDecision::Allow
        );
    }

    #[test]
    fn test_slot_accepts_playback_hex_id() {
        let slot = VideoIdSlot::new();
        slot.observe("https://r4---sn-x.googlevideo.com/videoplayback?expire=1&id=0123456789abcdef&itag=18");
        assert_eq!(slot.get().as_deref(), Some("0123456789abcdef"));
    }

    #[test]
    fn test_slot_rejects_wrong_length_hex() {
        let slot = VideoIdSlot::new();
        slot.observe("https://r4---sn-x.googlevideo.com/videoplayback?id=0123456789abcde");
        assert!(slot.get().is_none());
        // 18-hex variant is valid
        slot.observe("https://r4---sn-x.googlevideo.com/videoplayback?id=0123456789abcdef01");
        assert_eq!(slot.get().as_deref(), Some("0123456789abcdef01"));
    }

    #[test]
    fn test_slot_embed_and_watch_fallbacks() {
        let slot = VideoIdSlot::new();
        slot.observe("https://www.youtube.com/embed/dQw4w9WgXcQ?autoplay=1");
        assert_eq!(slot.get().as_deref(), Some("dQw4w9WgXcQ"));

        let slot = VideoIdSlot::new();
        slot.observe("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(slot.get().as_deref(), Some("dQw4w9WgXcQ"));

        // short values from watch URLs are noise
        let slot = VideoIdSlot::new();
        slot.observe("https://www.youtube.com/watch?v=abc");
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_slot_is_write_once() {
        let slot = VideoIdSlot::new();
        slot.observe("https://www.youtube.com/embed/firstvideo1");
        slot.observe("https://www.youtube.com/embed/secondvideo");
        assert_eq!(slot.get().as_deref(), Some("firstvideo1"));
    }
}

//! Soft-block detection.
//!
//! A visit is "blocked" when the serving side has flagged the session, not
//! when a single field is missing. The verdict is binary and conservative:
//! HTTP 429 on the top document, or one of a small set of interstitial
//! phrases anywhere in the rendered content.

/// Phrases that only appear on rate-limit / captcha interstitials.
const BLOCK_MARKERS: &[&str] = &[
    "our systems have detected unusual traffic",
    "too many requests",
    "captcha",
    "g-recaptcha",
    "verify you are human",
];

/// Classify a completed page load. `status` is the top-document HTTP status
/// when one was observed; `content` is the rendered HTML.
pub fn classify(status: Option<u32>, content: &str) -> bool {
    if status == Some(429) {
        return true;
    }
    let lowered = content.to_lowercase();
    BLOCK_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_429_is_blocked() {
        assert!(classify(Some(429), "<html><body>ok</body></html>"));
    }

    #[test]
    fn test_interstitial_phrases_are_blocked() {
        assert!(classify(
            Some(200),
            "<html><body>Our systems have detected unusual traffic from your computer network.</body></html>"
        ));
        assert!(classify(None, "<div class=\"g-recaptcha\" data-sitekey=\"x\"></div>"));
        assert!(classify(None, "Please verify you are human to continue"));
    }

    #[test]
    fn test_normal_page_is_not_blocked() {
        assert!(!classify(
            Some(200),
            "<html><body><h1>Ad details</h1><a href=\"https://play.google.com/store/apps/details?id=com.x\">Install</a></body></html>"
        ));
        assert!(!classify(None, ""));
    }

    #[test]
    fn test_missing_status_alone_is_not_blocked() {
        assert!(!classify(None, "<html><body>fine</body></html>"));
    }
}

//! Fingerprint profile provider.
//!
//! Each browser session gets one internally-consistent identity: user agent,
//! viewport, screen metrics, language, platform and hardware numbers are
//! drawn together and every surface that exposes them (CDP overrides, HTTP
//! headers, the injected hardening script) reports the same values. Mixing
//! values from different profiles is what gets sessions flagged, so the
//! script is generated from the profile instead of randomizing on its own.

use std::sync::Arc;

use headless_chrome::protocol::cdp::Page;
use headless_chrome::Tab;
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 11.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    ]
});

static VIEWPORTS: Lazy<Vec<(u32, u32)>> = Lazy::new(|| {
    vec![
        (1920, 1080),
        (1680, 1050),
        (1600, 900),
        (1536, 864),
        (1440, 900),
        (1366, 768),
        (1280, 800),
        (1280, 720),
    ]
});

static ACCEPT_LANGUAGES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "en-US,en;q=0.9",
        "en-GB,en;q=0.9",
        "en-US,en;q=0.9,es;q=0.8",
        "en-US,en;q=0.8",
        "en-CA,en;q=0.9,fr;q=0.8",
    ]
});

/// One session identity. All fields are mutually consistent.
#[derive(Debug, Clone)]
pub struct FingerprintProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub screen: (u32, u32),
    pub accept_language: String,
    pub platform: String,
    pub hardware_concurrency: u32,
    pub device_memory: u32,
}

fn platform_for_ua(ua: &str) -> &'static str {
    if ua.contains("Windows") {
        "Win32"
    } else if ua.contains("Macintosh") {
        "MacIntel"
    } else {
        "Linux x86_64"
    }
}

impl FingerprintProfile {
    /// Draw a fresh random profile. Screen is the viewport plus window chrome
    /// jitter so the two never report identical dimensions.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .to_string();
        let viewport = *VIEWPORTS.choose(&mut rng).unwrap_or(&VIEWPORTS[0]);
        let accept_language = ACCEPT_LANGUAGES
            .choose(&mut rng)
            .copied()
            .unwrap_or(ACCEPT_LANGUAGES[0])
            .to_string();
        let platform = platform_for_ua(&user_agent).to_string();
        let screen = (
            viewport.0 + rng.gen_range(0..=50),
            viewport.1 + rng.gen_range(0..=50),
        );
        let hardware_concurrency = rng.gen_range(4..=8);
        let device_memory = *[4u32, 8, 16].choose(&mut rng).unwrap_or(&8);
        FingerprintProfile {
            user_agent,
            viewport,
            screen,
            accept_language,
            platform,
            hardware_concurrency,
            device_memory,
        }
    }

    /// Primary language tag ("en-US" from "en-US,en;q=0.9").
    pub fn primary_language(&self) -> &str {
        self.accept_language.split(',').next().unwrap_or("en-US")
    }

    /// The hardening script injected before any page script runs. Every
    /// spoofed value comes from this profile, not from fresh randomness.
    pub fn stealth_script(&self) -> String {
        format!(
            r#"
        // Unmask navigator.webdriver
        Object.defineProperty(navigator, 'webdriver', {{
            get: () => undefined,
        }});

        // Hardware identity pinned to the session profile
        Object.defineProperty(navigator, 'hardwareConcurrency', {{
            get: () => {hardware_concurrency},
        }});
        Object.defineProperty(navigator, 'deviceMemory', {{
            get: () => {device_memory},
        }});
        Object.defineProperty(navigator, 'platform', {{
            get: () => '{platform}',
        }});
        Object.defineProperty(navigator, 'languages', {{
            get: () => ['{primary_language}', 'en'],
        }});

        // Screen metrics consistent with the launch viewport
        Object.defineProperty(screen, 'width', {{ get: () => {screen_w} }});
        Object.defineProperty(screen, 'height', {{ get: () => {screen_h} }});
        Object.defineProperty(screen, 'availWidth', {{ get: () => {screen_w} }});
        Object.defineProperty(screen, 'availHeight', {{ get: () => {avail_h} }});
        Object.defineProperty(screen, 'colorDepth', {{ get: () => 24 }});
        Object.defineProperty(screen, 'pixelDepth', {{ get: () => 24 }});

        // Chrome runtime mock for headless checks
        window.chrome = {{
            runtime: {{
                connect: function() {{
                    return {{
                        onMessage: {{ addListener: function() {{}}, removeListener: function() {{}} }},
                        postMessage: function() {{}},
                        disconnect: function() {{}}
                    }};
                }},
                sendMessage: function() {{}},
                onMessage: {{ addListener: function() {{}}, removeListener: function() {{}} }}
            }},
            csi: function() {{}},
            loadTimes: function() {{
                return {{
                    navigationType: "Other",
                    wasFetchedViaSpdy: true,
                    npnNegotiatedProtocol: "h2",
                    connectionInfo: "h2"
                }};
            }}
        }};

        // Permission mocking (notifications must not report 'prompt')
        const originalQuery = window.navigator.permissions.query;
        window.navigator.permissions.query = (parameters) => (
            parameters.name === 'notifications' ?
            Promise.resolve({{ state: Notification.permission }}) :
            originalQuery(parameters)
        );

        // Standard Chrome plugin set
        Object.defineProperty(navigator, 'plugins', {{
            get: () => {{
                const pdf = {{
                    0: {{ type: "application/x-google-chrome-pdf", suffixes: "pdf", description: "Portable Document Format" }},
                    description: "Portable Document Format",
                    filename: "internal-pdf-viewer",
                    length: 1,
                    name: "Chrome PDF Plugin"
                }};
                const p = [pdf, pdf, pdf];
                Object.setPrototypeOf(p, PluginArray.prototype);
                return p;
            }}
        }});

        // Canvas noise, only on fingerprint-sized canvases
        const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
        HTMLCanvasElement.prototype.toDataURL = function(...args) {{
            if (this.width > 16 && this.height > 16) {{
                const context = this.getContext('2d');
                if (context) {{
                    const imageData = context.getImageData(0, 0, this.width, this.height);
                    for (let i = 0; i < 5; i++) {{
                        const x = Math.floor(Math.random() * this.width);
                        const y = Math.floor(Math.random() * this.height);
                        const idx = (y * this.width + x) * 4;
                        if (imageData.data[idx+3] > 0) {{
                            imageData.data[idx+3] = Math.max(0, Math.min(255, imageData.data[idx+3] + (Math.random() > 0.5 ? 1 : -1)));
                        }}
                    }}
                    context.putImageData(imageData, 0, 0);
                }}
            }}
            return originalToDataURL.apply(this, args);
        }};

        // WebGL vendor spoofing
        const getParameter = WebGLRenderingContext.prototype.getParameter;
        WebGLRenderingContext.prototype.getParameter = function(parameter) {{
            if (parameter === 37445) return 'Intel Inc.';
            if (parameter === 37446) return 'Intel Iris OpenGL Engine';
            return getParameter.apply(this, [parameter]);
        }};
    "#,
            hardware_concurrency = self.hardware_concurrency,
            device_memory = self.device_memory,
            platform = self.platform,
            primary_language = self.primary_language(),
            screen_w = self.screen.0,
            screen_h = self.screen.1,
            avail_h = self.screen.1.saturating_sub(40),
        )
    }
}

/// Apply the profile to a fresh tab: UA + language + platform overrides,
/// Accept-Language header, and the pre-navigation hardening script.
/// Best effort; a tab that loads without hardening still beats a dead tab.
pub fn apply_profile(tab: &Arc<Tab>, profile: &FingerprintProfile) {
    if let Err(e) = tab.set_user_agent(
        &profile.user_agent,
        Some(&profile.accept_language),
        Some(&profile.platform),
    ) {
        println!("⚠️ Failed to set user agent: {}", e);
    }

    let mut headers = std::collections::HashMap::new();
    headers.insert("Accept-Language", profile.accept_language.as_str());
    if let Err(e) = tab.set_extra_http_headers(headers) {
        println!("⚠️ Failed to set headers: {}", e);
    }

    if let Err(e) = tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
        source: profile.stealth_script(),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    }) {
        println!("⚠️ Failed to inject hardening script: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_is_internally_consistent() {
        for _ in 0..50 {
            let p = FingerprintProfile::random();
            assert_eq!(p.platform, platform_for_ua(&p.user_agent));
            assert!(p.screen.0 >= p.viewport.0);
            assert!(p.screen.1 >= p.viewport.1);
            assert!((4..=8).contains(&p.hardware_concurrency));
            assert!([4, 8, 16].contains(&p.device_memory));
        }
    }

    #[test]
    fn test_script_reports_profile_values() {
        let p = FingerprintProfile::random();
        let script = p.stealth_script();
        assert!(script.contains(&format!("get: () => {}", p.hardware_concurrency)));
        assert!(script.contains(&format!("'{}'", p.platform)));
        assert!(script.contains(&format!("get: () => {}", p.screen.0)));
        assert!(script.contains("navigator, 'webdriver'"));
    }

    #[test]
    fn test_primary_language() {
        let mut p = FingerprintProfile::random();
        p.accept_language = "en-GB,en;q=0.9".to_string();
        assert_eq!(p.primary_language(), "en-GB");
    }
}

//! Ad surface enumeration.
//!
//! The creative can render in the top document, in a same-origin iframe, or
//! behind a shadow root, and probing each frame from Rust with separate CDP
//! round trips is slow and racy. One injected script walks everything that is
//! reachable in a single pass and returns a JSON snapshot; cross-origin
//! frames are skipped silently. All selection logic downstream of the
//! snapshot is pure Rust and unit-testable.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use headless_chrome::Tab;
use serde::Deserialize;

/// Walks the top document, accessible iframes and shadow roots, and reports
/// one entry per candidate ad surface. Surfaces smaller than 50x50 are
/// reported but marked hidden.
const ENUMERATE_SURFACES_JS: &str = r#"
(() => {
    const APP_NAME_SELECTORS = [
        'a[data-asoch-targets*="ochAppName"]',
        'a[data-asoch-targets*="appname" i]',
        'a[data-asoch-targets*="rrappname" i]',
        'a[class*="short-app-name"]',
        '.short-app-name a',
    ];
    const INSTALL_SELECTORS = [
        'a[data-asoch-targets*="ochButton"]',
        'a[data-asoch-targets*="ochInstallButton"]',
        'a[data-asoch-targets*="ctaButton"]',
        'a[data-asoch-targets*="Install" i]',
        'a[aria-label*="Install" i]',
    ];
    const HEADING_SELECTORS = [
        '[role="heading"]',
        'div[class*="app-name"]',
        '.app-title',
    ];
    const ADVERTISER_SELECTORS = [
        '.advertiser-name',
        '.advertiser-name-container',
        'h1',
        '.creative-details-page-header-text',
        '.ad-details-heading',
    ];

    function deepQueryAll(root, selector) {
        const out = [];
        const walk = (node) => {
            if (node.querySelectorAll) {
                node.querySelectorAll(selector).forEach(el => out.push(el));
            }
            const all = node.querySelectorAll ? node.querySelectorAll('*') : [];
            for (const el of all) {
                if (el.shadowRoot) walk(el.shadowRoot);
            }
        };
        walk(root);
        return out;
    }

    function texts(root, selectors) {
        const seen = new Set();
        const out = [];
        for (const sel of selectors) {
            for (const el of deepQueryAll(root, sel)) {
                const t = (el.textContent || '').trim();
                if (t && !seen.has(t)) { seen.add(t); out.push(t); }
            }
        }
        return out;
    }

    function hrefs(root, selectors) {
        const seen = new Set();
        const out = [];
        for (const sel of selectors) {
            for (const el of deepQueryAll(root, sel)) {
                const h = el.href || el.getAttribute('href') || '';
                if (h && !seen.has(h)) { seen.add(h); out.push(h); }
            }
        }
        return out;
    }

    function imageCreative(root) {
        const img = deepQueryAll(root, 'img.landscape-image')[0];
        const title = deepQueryAll(root, 'span.landscape-app-title')[0];
        const sub = deepQueryAll(root, 'div.landscape-app-text')[0]
            || deepQueryAll(root, 'div[class*="landscape-app-text"]')[0];
        if (!img || !title || !sub) return null;
        const titleText = (title.textContent || '').trim();
        const subText = (sub.textContent || '').trim();
        if (!img.src || titleText.length < 2 || subText.length < 2) return null;
        return { src: img.src, title: titleText, subtitle: subText };
    }

    function surfaceFor(doc, frame) {
        const root = doc.querySelector('#portrait-landscape-phone') || doc.body;
        if (!root) return null;
        const r = root.getBoundingClientRect();
        return {
            frame: frame,
            rect: { x: r.x, y: r.y, width: r.width, height: r.height },
            visible: r.width >= 50 && r.height >= 50,
            app_name_texts: texts(root, APP_NAME_SELECTORS),
            link_hrefs: hrefs(root, APP_NAME_SELECTORS.concat(INSTALL_SELECTORS)),
            heading_texts: texts(root, HEADING_SELECTORS),
            advertiser_texts: texts(root, ADVERTISER_SELECTORS),
            image: imageCreative(root),
            has_video: deepQueryAll(root, 'video, .ytp-large-play-button, .ytp-play-button').length > 0,
        };
    }

    const surfaces = [];
    const top = surfaceFor(document, 'top');
    if (top) surfaces.push(top);

    document.querySelectorAll('iframe').forEach((f, i) => {
        let doc = null;
        try { doc = f.contentDocument; } catch (e) { /* cross-origin */ }
        if (!doc) return;
        const s = surfaceFor(doc, 'iframe[' + i + ']');
        if (s) {
            // Position the surface where the iframe sits in the top viewport
            const fr = f.getBoundingClientRect();
            s.rect = { x: fr.x, y: fr.y, width: fr.width, height: fr.height };
            s.visible = fr.width >= 50 && fr.height >= 50;
            surfaces.push(s);
        }
    });

    const page_is_video = surfaces.some(s => s.has_video);
    return JSON.stringify({ surfaces: surfaces, page_is_video: page_is_video });
})()
"#;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SurfaceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceRect {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// The validated image-ad triple: creative image, app title, subtitle text.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ImageCreative {
    pub src: String,
    pub title: String,
    pub subtitle: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AdSurface {
    pub frame: String,
    pub rect: SurfaceRect,
    pub visible: bool,
    #[serde(default)]
    pub app_name_texts: Vec<String>,
    #[serde(default)]
    pub link_hrefs: Vec<String>,
    #[serde(default)]
    pub heading_texts: Vec<String>,
    #[serde(default)]
    pub advertiser_texts: Vec<String>,
    #[serde(default)]
    pub image: Option<ImageCreative>,
    #[serde(default)]
    pub has_video: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct SurfaceSnapshot {
    #[serde(default)]
    pub surfaces: Vec<AdSurface>,
    #[serde(default)]
    pub page_is_video: bool,
}

impl SurfaceSnapshot {
    /// Surfaces worth extracting from, document order preserved.
    pub fn visible_surfaces(&self) -> Vec<&AdSurface> {
        self.surfaces.iter().filter(|s| s.visible).collect()
    }

    /// First visible surface carrying a complete image-ad structure.
    pub fn image_ad_surface(&self) -> Option<&AdSurface> {
        self.visible_surfaces().into_iter().find(|s| s.image.is_some())
    }
}

/// Run the enumeration script on the live page.
pub fn capture(tab: &Arc<Tab>) -> Result<SurfaceSnapshot> {
    let result = tab.evaluate(ENUMERATE_SURFACES_JS, false)?;
    let raw = result
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("surface enumeration returned no payload"))?;
    let snapshot: SurfaceSnapshot = serde_json::from_str(raw)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(frame: &str, visible: bool, image: Option<ImageCreative>) -> AdSurface {
        AdSurface {
            frame: frame.to_string(),
            rect: SurfaceRect { x: 0.0, y: 0.0, width: 300.0, height: 250.0 },
            visible,
            app_name_texts: vec![],
            link_hrefs: vec![],
            heading_texts: vec![],
            advertiser_texts: vec![],
            image,
            has_video: false,
        }
    }

    #[test]
    fn test_snapshot_parses_script_payload() {
        let raw = r#"{
            "surfaces": [
                {
                    "frame": "iframe[0]",
                    "rect": { "x": 10.0, "y": 20.0, "width": 300.0, "height": 250.0 },
                    "visible": true,
                    "app_name_texts": ["Candy Blast"],
                    "link_hrefs": ["https://play.google.com/store/apps/details?id=com.candy"],
                    "heading_texts": [],
                    "advertiser_texts": ["Sweet Games Ltd"],
                    "image": null,
                    "has_video": true
                }
            ],
            "page_is_video": true
        }"#;
        let snap: SurfaceSnapshot = serde_json::from_str(raw).unwrap();
        assert!(snap.page_is_video);
        assert_eq!(snap.surfaces.len(), 1);
        assert_eq!(snap.surfaces[0].rect.center(), (160.0, 145.0));
        assert_eq!(snap.surfaces[0].app_name_texts[0], "Candy Blast");
    }

    #[test]
    fn test_hidden_surfaces_are_filtered() {
        let snap = SurfaceSnapshot {
            surfaces: vec![
                surface("top", false, None),
                surface("iframe[0]", true, None),
            ],
            page_is_video: false,
        };
        let visible = snap.visible_surfaces();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].frame, "iframe[0]");
    }

    #[test]
    fn test_image_ad_surface_requires_complete_triple() {
        let creative = ImageCreative {
            src: "https://tpc.googlesyndication.com/simgad/1".into(),
            title: "Candy Blast".into(),
            subtitle: "Match three to win".into(),
        };
        let snap = SurfaceSnapshot {
            surfaces: vec![
                surface("top", true, None),
                surface("iframe[0]", false, Some(creative.clone())),
                surface("iframe[1]", true, Some(creative.clone())),
            ],
            page_is_video: false,
        };
        // hidden frame with the triple is skipped, first visible wins
        assert_eq!(snap.image_ad_surface().unwrap().frame, "iframe[1]");
    }

    #[test]
    fn test_enumeration_script_shape() {
        assert!(ENUMERATE_SURFACES_JS.contains("JSON.stringify"));
        assert!(ENUMERATE_SURFACES_JS.contains("#portrait-landscape-phone"));
        assert!(ENUMERATE_SURFACES_JS.contains("contentDocument"));
        assert!(ENUMERATE_SURFACES_JS.contains("shadowRoot"));
    }
}

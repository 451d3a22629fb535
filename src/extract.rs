//! Field extractors.
//!
//! Everything in here is pure: input is text harvested from a surface
//! snapshot or raw HTML, output is a cleaned value or `None`. The creative
//! markup is minified and style-polluted, so app-name candidates routinely
//! arrive as `color: #fff; 12px Candy | Blast ***` and must survive the
//! cleanup pipeline before they count as found.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::surface::{AdSurface, ImageCreative};

static ZERO_WIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}-\u{200D}\u{FEFF}\u{2066}-\u{2069}]").unwrap());
static CSS_DECL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z-]+\s*:\s*[^;]+;?").unwrap());
static PX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+px").unwrap());
static STARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*+").unwrap());
static CLASS_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[a-zA-Z][\w-]*").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static STYLE_LEFTOVER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r":\s*\d").unwrap());
static NO_LETTERS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d\s\W]+$").unwrap());

static REDIRECT_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&](adurl|dest|url)=([^&\s]+)").unwrap());
static PLAY_STORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(https?://play\.google\.com/store/apps/details\?id=[a-zA-Z0-9._]+)").unwrap()
});
static APP_STORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(https?://(?:apps|itunes)\.apple\.com/[^\s&"']+/app/[^\s&"']+)"#).unwrap()
});

/// Header/boilerplate strings that must never be reported as an advertiser.
const ADVERTISER_BLACKLIST: &[&str] = &[
    "ad details",
    "google ads",
    "transparency center",
    "about this ad",
];

/// Run one raw text candidate through the cleanup pipeline. Returns `None`
/// when nothing name-shaped survives.
pub fn clean_app_name(raw: &str) -> Option<String> {
    let s = ZERO_WIDTH_RE.replace_all(raw, "");
    let s = CSS_DECL_RE.replace_all(&s, "");
    let s = PX_RE.replace_all(&s, "");
    let s = STARS_RE.replace_all(&s, "");
    let s = CLASS_TOKEN_RE.replace_all(&s, "");

    // Creative markup concatenates variants with this marker; first one is
    // the display name.
    let s = s.split("!@~!@~").next().unwrap_or("");

    // Pipe-separated alternates: first part with real content wins.
    let s = if s.contains('|') {
        s.split('|')
            .map(str::trim)
            .find(|p| p.len() > 2)
            .unwrap_or("")
            .to_string()
    } else {
        s.to_string()
    };

    let s = WHITESPACE_RE.replace_all(s.trim(), " ").into_owned();

    if s.len() < 2 || s.len() > 80 {
        return None;
    }
    let lowered = s.to_lowercase();
    if STYLE_LEFTOVER_RE.is_match(&s)
        || lowered.contains("height")
        || lowered.contains("width")
        || lowered.contains("font")
    {
        return None;
    }
    if NO_LETTERS_RE.is_match(&s) {
        return None;
    }
    Some(s)
}

/// Strict store-link shape: Play Store links must carry the package `id=`
/// parameter, App Store links must contain an `/app/` path segment.
pub fn is_valid_store_link(url: &str) -> bool {
    if url.starts_with("javascript:") || url.starts_with('#') {
        return false;
    }
    if url.contains("play.google.com/store/apps") && url.contains("id=") {
        return true;
    }
    if (url.contains("apps.apple.com") || url.contains("itunes.apple.com"))
        && url.contains("/app/")
    {
        return true;
    }
    false
}

/// Resolve one href to a store link. Direct links pass through; ad-click
/// redirects are cracked by decoding their destination parameter and
/// re-validating.
pub fn crack_store_link(href: &str) -> Option<String> {
    if is_valid_store_link(href) {
        return Some(href.to_string());
    }
    if href.contains("googleadservices.com") || href.contains("/pagead/aclk") {
        if let Some(caps) = REDIRECT_PARAM_RE.captures(href) {
            if let Some(enc) = caps.get(2) {
                if let Ok(decoded) = urlencoding::decode(enc.as_str()) {
                    if is_valid_store_link(&decoded) {
                        return Some(decoded.into_owned());
                    }
                }
            }
        }
    }
    None
}

/// Last-resort scan over arbitrary text (page HTML) for a store URL.
pub fn scan_for_store_link(text: &str) -> Option<String> {
    if let Some(caps) = PLAY_STORE_RE.captures(text) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    if let Some(caps) = APP_STORE_RE.captures(text) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    None
}

/// App name and store link off one surface. The first candidate that
/// survives validation wins and probing stops; candidate order is the
/// selector priority order baked into the snapshot. The advertiser name is
/// a blacklist: creative markup routinely matches it under app-name
/// selectors, and echoing it back would poison the app-name column.
pub fn app_and_link(
    surface: &AdSurface,
    advertiser: Option<&str>,
) -> (Option<String>, Option<String>) {
    let keep = |name: &String| {
        advertiser
            .map(|adv| !name.eq_ignore_ascii_case(adv.trim()))
            .unwrap_or(true)
    };
    let mut app_name = surface
        .app_name_texts
        .iter()
        .find_map(|t| clean_app_name(t).filter(&keep));
    if app_name.is_none() {
        app_name = surface
            .heading_texts
            .iter()
            .find_map(|t| clean_app_name(t).filter(&keep));
    }

    let store_link = surface.link_hrefs.iter().find_map(|h| crack_store_link(h));

    (app_name, store_link)
}

/// Advertiser from surface texts, filtering page-chrome boilerplate.
pub fn advertiser_from_texts<S: AsRef<str>>(texts: &[S]) -> Option<String> {
    texts.iter().map(AsRef::as_ref).find_map(|t| {
        let t = t.trim();
        if t.len() < 2 || t.len() > 100 {
            return None;
        }
        let lowered = t.to_lowercase();
        if ADVERTISER_BLACKLIST.iter().any(|b| lowered.contains(b)) {
            return None;
        }
        Some(t.to_string())
    })
}

/// Advertiser fallback from the document title ("Advertiser Name - Ad
/// Details ..." shapes).
pub fn advertiser_from_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = doc.select(&selector).next()?.text().collect::<String>();
    let head = title.split(['-', '|']).next()?.trim().to_string();
    advertiser_from_texts(&[head])
}

/// Image-ad fields from a validated creative triple. The title goes through
/// the same cleanup as anchor-based app names.
pub fn image_fields(creative: &ImageCreative) -> (Option<String>, String, Option<String>) {
    let app_name = clean_app_name(&creative.title);
    let subtitle = {
        let t = creative.subtitle.trim();
        if t.len() >= 2 {
            Some(WHITESPACE_RE.replace_all(t, " ").into_owned())
        } else {
            None
        }
    };
    (app_name, creative.src.clone(), subtitle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_app_name_plain() {
        assert_eq!(clean_app_name("Candy Blast"), Some("Candy Blast".to_string()));
        assert_eq!(clean_app_name("  Royal   Match  "), Some("Royal Match".to_string()));
    }

    #[test]
    fn test_clean_app_name_strips_css_garbage() {
        assert_eq!(
            clean_app_name("color: #ffffff; Candy Blast"),
            Some("Candy Blast".to_string())
        );
        assert_eq!(clean_app_name("Candy Blast 24px ***"), Some("Candy Blast".to_string()));
        assert_eq!(clean_app_name(".landscape-title Candy Blast"), Some("Candy Blast".to_string()));
    }

    #[test]
    fn test_clean_app_name_variant_markers() {
        assert_eq!(
            clean_app_name("Candy Blast!@~!@~Candy Blast Deluxe"),
            Some("Candy Blast".to_string())
        );
        assert_eq!(
            clean_app_name("ab | Candy Blast | other"),
            Some("Candy Blast".to_string())
        );
    }

    #[test]
    fn test_clean_app_name_rejections() {
        assert_eq!(clean_app_name(""), None);
        assert_eq!(clean_app_name("X"), None);
        assert_eq!(clean_app_name("12345 678"), None);
        assert_eq!(clean_app_name("max-height: 40"), None);
        assert_eq!(clean_app_name("font-family Arial"), None);
        assert_eq!(clean_app_name(&"a".repeat(90)), None);
        // zero-width padding around a real name still cleans up
        assert_eq!(
            clean_app_name("\u{200B}Candy Blast\u{FEFF}"),
            Some("Candy Blast".to_string())
        );
    }

    #[test]
    fn test_store_link_validation_is_strict() {
        assert!(is_valid_store_link(
            "https://play.google.com/store/apps/details?id=com.candy.blast"
        ));
        assert!(is_valid_store_link("https://apps.apple.com/us/app/candy-blast/id123456"));
        assert!(is_valid_store_link("https://itunes.apple.com/us/app/candy/id1"));
        // Play Store without the package id is not a store link
        assert!(!is_valid_store_link("https://play.google.com/store/apps"));
        // App Store without /app/ is not a store link
        assert!(!is_valid_store_link("https://apps.apple.com/us/developer/x/id9"));
        assert!(!is_valid_store_link("javascript:void(0)"));
        assert!(!is_valid_store_link("#"));
        assert!(!is_valid_store_link("https://example.com/download"));
    }

    #[test]
    fn test_crack_redirect_links() {
        let href = "https://www.googleadservices.com/pagead/aclk?sa=L&adurl=https%3A%2F%2Fplay.google.com%2Fstore%2Fapps%2Fdetails%3Fid%3Dcom.candy.blast";
        assert_eq!(
            crack_store_link(href).as_deref(),
            Some("https://play.google.com/store/apps/details?id=com.candy.blast")
        );

        // redirect to a non-store destination stays rejected
        let href = "https://www.googleadservices.com/pagead/aclk?adurl=https%3A%2F%2Fexample.com";
        assert_eq!(crack_store_link(href), None);

        // non-redirect invalid hrefs are not cracked
        assert_eq!(crack_store_link("https://example.com/?url=https%3A%2F%2Fplay.google.com%2Fstore%2Fapps%2Fdetails%3Fid%3Dx"), None);
    }

    #[test]
    fn test_scan_for_store_link_in_html() {
        let html = r#"<a data-x="1" href="https://play.google.com/store/apps/details?id=com.candy.blast">get</a>"#;
        assert_eq!(
            scan_for_store_link(html).as_deref(),
            Some("https://play.google.com/store/apps/details?id=com.candy.blast")
        );
        let html = r#"see https://apps.apple.com/us/app/candy-blast/id12345 now"#;
        assert_eq!(
            scan_for_store_link(html).as_deref(),
            Some("https://apps.apple.com/us/app/candy-blast/id12345")
        );
        assert_eq!(scan_for_store_link("<html>nothing here</html>"), None);
    }

    #[test]
    fn test_advertiser_filtering() {
        let texts = ["Ad details", "Google Ads Transparency Center", "Sweet Games Ltd"];
        assert_eq!(advertiser_from_texts(&texts).as_deref(), Some("Sweet Games Ltd"));
        let texts: [&str; 2] = ["About this ad", "x"];
        assert_eq!(advertiser_from_texts(&texts), None);
    }

    #[test]
    fn test_advertiser_from_title() {
        let html = "<html><head><title>Sweet Games Ltd - Ad Details - Transparency</title></head></html>";
        assert_eq!(advertiser_from_title(html).as_deref(), Some("Sweet Games Ltd"));
        let html = "<html><head><title>Google Ads | something</title></head></html>";
        assert_eq!(advertiser_from_title(html), None);
    }

    #[test]
    fn test_app_and_link_candidate_order() {
        use crate::surface::SurfaceRect;
        let surface = AdSurface {
            frame: "iframe[0]".into(),
            rect: SurfaceRect { x: 0.0, y: 0.0, width: 300.0, height: 250.0 },
            visible: true,
            app_name_texts: vec!["color: red;".into(), "Candy Blast".into()],
            link_hrefs: vec![
                "javascript:void(0)".into(),
                "https://play.google.com/store/apps/details?id=com.candy".into(),
                "https://play.google.com/store/apps/details?id=com.other".into(),
            ],
            heading_texts: vec!["Unused Heading".into()],
            advertiser_texts: vec![],
            image: None,
            has_video: false,
        };
        let (name, link) = app_and_link(&surface, None);
        assert_eq!(name.as_deref(), Some("Candy Blast"));
        // first valid href wins, later candidates are never checked
        assert_eq!(
            link.as_deref(),
            Some("https://play.google.com/store/apps/details?id=com.candy")
        );
    }

    #[test]
    fn test_app_and_link_rejects_advertiser_echo() {
        use crate::surface::SurfaceRect;
        let surface = AdSurface {
            frame: "iframe[0]".into(),
            rect: SurfaceRect { x: 0.0, y: 0.0, width: 300.0, height: 250.0 },
            visible: true,
            app_name_texts: vec!["Sweet Games Ltd".into(), "Candy Blast".into()],
            link_hrefs: vec![],
            heading_texts: vec!["Sweet Games Ltd".into()],
            advertiser_texts: vec!["Sweet Games Ltd".into()],
            image: None,
            has_video: false,
        };
        let (name, _) = app_and_link(&surface, Some("Sweet Games Ltd"));
        assert_eq!(name.as_deref(), Some("Candy Blast"));

        // only the advertiser matches app-name selectors: report nothing
        // rather than echoing it, case-insensitively
        let surface = AdSurface {
            app_name_texts: vec!["sweet games ltd".into()],
            heading_texts: vec![],
            ..surface
        };
        let (name, _) = app_and_link(&surface, Some("Sweet Games Ltd"));
        assert_eq!(name, None);

        // without a known advertiser nothing is filtered
        let (name, _) = app_and_link(&surface, None);
        assert_eq!(name.as_deref(), Some("sweet games ltd"));
    }

    #[test]
    fn test_image_fields() {
        let creative = ImageCreative {
            src: "https://tpc.googlesyndication.com/simgad/99".into(),
            title: "Candy  Blast".into(),
            subtitle: "  Match   three  ".into(),
        };
        let (name, url, subtitle) = image_fields(&creative);
        assert_eq!(name.as_deref(), Some("Candy Blast"));
        assert_eq!(url, "https://tpc.googlesyndication.com/simgad/99");
        assert_eq!(subtitle.as_deref(), Some("Match three"));
    }
}

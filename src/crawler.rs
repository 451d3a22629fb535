//! Browser sessions and the per-visit extraction pipeline.
//!
//! One browser carries one fingerprint profile and (optionally) one proxy
//! for its whole life; each visit gets a fresh tab with the resource gate
//! and wire sniffer installed before navigation. A visit that returns `Err`
//! counts as a failed attempt and is retried by the controller; verdicts
//! (blocked, skipped) and completed extractions come back as values.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::protocol::cdp::Network;
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::Rng;
use tokio::time::sleep;

use crate::block;
use crate::config::{AgentMode, Config};
use crate::extract;
use crate::fingerprint::{self, FingerprintProfile};
use crate::gate::{self, VideoIdSlot};
use crate::interact;
use crate::proxy::{generate_proxy_auth_extension, Proxy};
use crate::result::{ExtractionResult, Field};
use crate::sheet::RowTask;
use crate::surface;

const LAUNCH_ARGS: &[&str] = &[
    "--autoplay-policy=no-user-gesture-required",
    "--disable-blink-features=AutomationControlled",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-zygote",
    "--no-first-run",
    "--headless=new",
];

fn try_launch(profile: &FingerprintProfile, proxy: Option<&Arc<Proxy>>) -> Result<Browser> {
    let mut owned_args: Vec<String> = LAUNCH_ARGS.iter().map(|s| s.to_string()).collect();
    owned_args.push(format!("--user-agent={}", profile.user_agent));

    if let Some(proxy) = proxy {
        owned_args.push(format!("--proxy-server={}", proxy.to_chrome_arg()));
        if let Some(ext_path) = generate_proxy_auth_extension(proxy) {
            owned_args.push(format!("--load-extension={}", ext_path));
        }
    }

    let args: Vec<&std::ffi::OsStr> = owned_args.iter().map(std::ffi::OsStr::new).collect();
    let browser = Browser::new(LaunchOptions {
        headless: false, // new headless mode goes through args
        window_size: Some(profile.viewport),
        args,
        idle_browser_timeout: Duration::from_secs(300),
        ..Default::default()
    })?;
    Ok(browser)
}

/// Launch a session browser; one retry after a short pause, a second
/// failure bubbles up to the session loop.
pub async fn launch_browser(
    profile: &FingerprintProfile,
    proxy: Option<&Arc<Proxy>>,
) -> Result<Browser> {
    match try_launch(profile, proxy) {
        Ok(b) => Ok(b),
        Err(e) => {
            println!("⚠️ Browser launch failed, retrying in 5s: {}", e);
            sleep(Duration::from_secs(5)).await;
            try_launch(profile, proxy).context("browser relaunch failed")
        }
    }
}

fn settle_duration(cfg: &Config, attempt: u32) -> Duration {
    let base = if cfg.settle_max_ms > cfg.settle_min_ms {
        rand::thread_rng().gen_range(cfg.settle_min_ms..=cfg.settle_max_ms)
    } else {
        cfg.settle_min_ms
    };
    cfg.scaled_wait(base, attempt)
}

/// One visit, one tab. The tab is always closed, even on error.
pub async fn visit_once(
    browser: &Browser,
    cfg: &Config,
    profile: &FingerprintProfile,
    task: &RowTask,
    attempt: u32,
) -> Result<ExtractionResult> {
    let tab = browser.new_tab().context("failed to open tab")?;
    let outcome = visit_inner(&tab, cfg, profile, task, attempt).await;
    let _ = tab.close(true);
    outcome
}

async fn visit_inner(
    tab: &Arc<Tab>,
    cfg: &Config,
    profile: &FingerprintProfile,
    task: &RowTask,
    attempt: u32,
) -> Result<ExtractionResult> {
    tab.set_default_timeout(Duration::from_millis(cfg.max_wait_time_ms));
    fingerprint::apply_profile(tab, profile);

    let slot = VideoIdSlot::new();
    gate::install(tab, cfg.mode, slot.clone())?;

    // The block detector judges the document the tab ends up on, so track
    // the last document-type response; redirect hops and subresources
    // arrive on the same handler and must not shadow it.
    let status: Arc<Mutex<Option<u32>>> = Arc::new(Mutex::new(None));
    let status_writer = status.clone();
    tab.register_response_handling(
        "top-document-status",
        Box::new(move |params, _fetch_body| {
            note_document_status(&status_writer, &params.Type, params.response.status as u32);
        }),
    )?;

    println!("🌐 [row {}] visiting {}", task.row, task.url);
    tab.navigate_to(&task.url)?;
    tab.wait_until_navigated()?;
    sleep(settle_duration(cfg, attempt)).await;

    let content = tab.get_content()?;
    let top_status = status.lock().ok().and_then(|g| *g);
    if block::classify(top_status, &content) {
        return Ok(ExtractionResult::blocked());
    }

    match cfg.mode {
        AgentMode::Unified => extract_unified(tab, cfg, task, &slot, &content, attempt).await,
        AgentMode::VideoOnly => extract_video_only(tab, cfg, &slot, attempt).await,
        AgentMode::ImageAds => extract_image_ad(tab, cfg, &slot, &content).await,
    }
}

fn note_document_status(slot: &Mutex<Option<u32>>, kind: &Network::ResourceType, status: u32) {
    if matches!(kind, Network::ResourceType::Document) {
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(status);
        }
    }
}

/// Creatives load slower on pages that already failed once; the post-click
/// window grows with the attempt number like the settle window does.
fn post_click_wait(cfg: &Config, attempt: u32) -> Duration {
    cfg.scaled_wait(cfg.post_click_wait_ms, attempt)
}

/// Playback dispatch failures (detached play button, evaluation error) mean
/// "no id", never a failed visit; fields already extracted in this attempt
/// must survive.
fn video_id_field(outcome: Result<Option<String>>) -> Field {
    match outcome {
        Ok(Some(id)) => Field::Found(id),
        Ok(None) => Field::NotFound,
        Err(e) => {
            println!("⚠️ Playback trigger failed: {}", e);
            Field::NotFound
        }
    }
}

async fn extract_unified(
    tab: &Arc<Tab>,
    cfg: &Config,
    task: &RowTask,
    slot: &VideoIdSlot,
    content: &str,
    attempt: u32,
) -> Result<ExtractionResult> {
    let mut result = ExtractionResult::pending(cfg.mode, task.needs_metadata);

    if let Err(e) = interact::scroll_jiggle(tab).await {
        println!("⚠️ Scroll jiggle failed: {}", e);
    }

    let snapshot = surface::capture(tab)?;
    result.is_video_ad = snapshot.page_is_video;

    if task.needs_metadata {
        // Advertiser first: it blacklists app-name candidates below.
        let advertiser = snapshot
            .visible_surfaces()
            .iter()
            .find_map(|s| extract::advertiser_from_texts(&s.advertiser_texts))
            .or_else(|| extract::advertiser_from_title(content));

        for s in snapshot.visible_surfaces() {
            let (name, link) = extract::app_and_link(s, advertiser.as_deref());
            if result.app_name == Field::NotFound {
                if let Some(name) = name {
                    result.app_name = Field::Found(name);
                }
            }
            if result.store_link == Field::NotFound {
                if let Some(link) = link {
                    result.store_link = Field::Found(link);
                }
            }
            if result.app_name.is_found() && result.store_link.is_found() {
                break;
            }
        }
        if result.store_link == Field::NotFound {
            if let Some(link) = extract::scan_for_store_link(content) {
                result.store_link = Field::Found(link);
            }
        }

        if let Some(advertiser) = advertiser {
            result.advertiser_name = Field::Found(advertiser);
        }
    }

    let has_valid_link = result.store_link.is_found()
        || task
            .existing_store_link
            .as_deref()
            .map(|l| l.contains("play.google.com") || l.contains("apps.apple.com"))
            .unwrap_or(false);

    // Only chase a video id when the row still lacks one.
    if task.needs_video_id && (snapshot.page_is_video || has_valid_link) {
        let wait = post_click_wait(cfg, attempt);
        result.video_id = video_id_field(interact::trigger_playback(tab, slot, wait).await);
    }

    Ok(result)
}

async fn extract_video_only(
    tab: &Arc<Tab>,
    cfg: &Config,
    slot: &VideoIdSlot,
    attempt: u32,
) -> Result<ExtractionResult> {
    let mut result = ExtractionResult::pending(cfg.mode, false);
    let wait = post_click_wait(cfg, attempt);
    result.video_id = video_id_field(interact::trigger_playback(tab, slot, wait).await);
    Ok(result)
}

/// Image pipeline: browse to provoke lazy rendering, then up to three
/// passes of enumerate / hover / re-read. A page that never shows the
/// image-ad structure is a skip, not a failure.
async fn extract_image_ad(
    tab: &Arc<Tab>,
    cfg: &Config,
    slot: &VideoIdSlot,
    content: &str,
) -> Result<ExtractionResult> {
    if let Err(e) = interact::browse_around(tab).await {
        println!("⚠️ Browse simulation failed: {}", e);
    }

    let mut snapshot = surface::capture(tab)?;
    for pass in 1..=3u32 {
        if snapshot.image_ad_surface().is_some() {
            break;
        }
        if pass == 3 {
            return Ok(ExtractionResult::skipped());
        }
        sleep(Duration::from_millis(1_500)).await;
        let _ = interact::scroll_jiggle(tab).await;
        snapshot = surface::capture(tab)?;
    }

    // Hover the creative, then re-read: some fields only render on
    // mouseover.
    let center = snapshot
        .image_ad_surface()
        .map(|s| s.rect.center())
        .unwrap_or((200.0, 200.0));
    if let Err(e) = interact::hover(tab, interact::Point::new(center.0, center.1)).await {
        println!("⚠️ Hover failed: {}", e);
    }
    sleep(Duration::from_millis(800)).await;
    let snapshot = surface::capture(tab)?;

    let mut result = ExtractionResult::pending(cfg.mode, true);
    let hit = snapshot
        .image_ad_surface()
        .and_then(|s| s.image.as_ref().map(|c| (s, c)));
    match hit {
        Some((s, creative)) => {
            let (name, image_url, subtitle) = extract::image_fields(creative);
            result.app_name = Field::from_option(name);
            result.image_url = Field::Found(image_url);
            result.app_subtitle = Field::from_option(subtitle);

            if let Some(link) = s.link_hrefs.iter().find_map(|h| extract::crack_store_link(h)) {
                result.store_link = Field::Found(link);
            }
            if let Some(advertiser) = extract::advertiser_from_texts(&s.advertiser_texts)
                .or_else(|| extract::advertiser_from_title(content))
            {
                result.advertiser_name = Field::Found(advertiser);
            }
        }
        None => return Ok(ExtractionResult::skipped()),
    }

    if let Some(id) = slot.get() {
        result.video_id = Field::Found(id);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_click_wait_scales_with_attempt() {
        let mut cfg = Config::from_env();
        cfg.post_click_wait_ms = 6_000;
        cfg.retry_wait_multiplier = 1.5;
        assert_eq!(post_click_wait(&cfg, 1), Duration::from_millis(6_000));
        assert_eq!(post_click_wait(&cfg, 2), Duration::from_millis(9_000));
        assert_eq!(post_click_wait(&cfg, 3), Duration::from_millis(13_500));
    }

    #[test]
    fn test_video_id_field_swallows_dispatch_errors() {
        assert_eq!(
            video_id_field(Ok(Some("0123456789abcdef".into()))),
            Field::Found("0123456789abcdef".into())
        );
        assert_eq!(video_id_field(Ok(None)), Field::NotFound);
        // a detached play button must not discard the visit's metadata
        assert_eq!(
            video_id_field(Err(anyhow::anyhow!("node detached"))),
            Field::NotFound
        );
    }

    #[test]
    fn test_document_status_last_response_wins() {
        let slot = Mutex::new(None);
        note_document_status(&slot, &Network::ResourceType::Document, 302);
        note_document_status(&slot, &Network::ResourceType::Document, 429);
        assert_eq!(*slot.lock().unwrap(), Some(429));
        // subresource statuses never shadow the document's
        note_document_status(&slot, &Network::ResourceType::Xhr, 200);
        note_document_status(&slot, &Network::ResourceType::Script, 500);
        assert_eq!(*slot.lock().unwrap(), Some(429));
    }
}

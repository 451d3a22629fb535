//! Retry and backoff controller.
//!
//! An attempt that errors out (navigation timeout, dead tab) and an attempt
//! that completes without satisfying the success predicate are treated the
//! same: wait, then try again with a fresh tab. Two outcomes short-circuit
//! the loop — a block verdict (retrying on a flagged session only digs the
//! hole deeper) and a skip verdict (the page simply is not the kind of ad
//! this mode handles).

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;

use crate::config::{AgentMode, Backoff, Config};
use crate::extract::is_valid_store_link;
use crate::result::ExtractionResult;

/// Delay before attempt `next_attempt` (2-based; no delay precedes the first).
pub fn backoff_delay(backoff: Backoff, next_attempt: u32) -> Duration {
    match backoff {
        Backoff::Jittered { min_ms, max_ms } => {
            Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
        }
        Backoff::Exponential { base_ms } => {
            Duration::from_millis(base_ms.saturating_mul(1 << next_attempt.saturating_sub(2).min(16)))
        }
    }
}

/// Per-mode success predicate. `existing_store_link` is whatever the row
/// already carried before this visit; a video id is only demanded when the
/// row still lacks one and a valid store link ties the creative to an app.
pub fn attempt_succeeded(
    mode: AgentMode,
    needs_metadata: bool,
    needs_video_id: bool,
    existing_store_link: Option<&str>,
    result: &ExtractionResult,
) -> bool {
    match mode {
        AgentMode::Unified => {
            let metadata_ok = !needs_metadata
                || result.store_link.is_found()
                || result.app_name.is_found();
            let has_valid_link = result
                .store_link
                .found()
                .map(is_valid_store_link)
                .unwrap_or(false)
                || existing_store_link
                    .map(|l| l.contains("play.google.com") || l.contains("apps.apple.com"))
                    .unwrap_or(false);
            let video_ok = !(needs_video_id && has_valid_link) || result.video_id.is_found();
            metadata_ok && video_ok
        }
        AgentMode::VideoOnly => result.video_id.is_found(),
        AgentMode::ImageAds => {
            result.app_name.is_found()
                && result.image_url.is_found()
                && result.app_subtitle.is_found()
        }
    }
}

/// Drive `attempt` until it succeeds, short-circuits, or the retry budget
/// runs out. On exhaustion the last completed result is returned (its
/// missing fields are already `NotFound`); if no attempt ever completed,
/// an all-`NotFound` result is synthesized so errors never leak downstream.
pub async fn run_with_retry<F, Fut>(
    cfg: &Config,
    label: &str,
    is_success: impl Fn(&ExtractionResult) -> bool,
    mut attempt: F,
) -> ExtractionResult
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ExtractionResult>>,
{
    let mut last_completed: Option<ExtractionResult> = None;

    for n in 1..=cfg.max_retries {
        if n > 1 {
            let delay = backoff_delay(cfg.backoff, n);
            println!("⏳ [{}] attempt {}/{} after {:?}", label, n, cfg.max_retries, delay);
            tokio::time::sleep(delay).await;
        }

        match attempt(n).await {
            Ok(result) => {
                if result.is_blocked() {
                    println!("🚫 [{}] blocked on attempt {}", label, n);
                    return result;
                }
                if result.is_skipped() {
                    println!("⏭️ [{}] not applicable, skipping", label);
                    return result;
                }
                if is_success(&result) {
                    println!("✅ [{}] succeeded on attempt {}", label, n);
                    return result;
                }
                last_completed = Some(result);
            }
            Err(e) => {
                println!("⚠️ [{}] attempt {} failed: {}", label, n, e);
            }
        }
    }

    println!("❌ [{}] retries exhausted", label);
    last_completed.unwrap_or_else(|| ExtractionResult::exhausted(cfg.mode))
}

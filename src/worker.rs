//! Run orchestration: sessions, batches, and the wall-clock budget.
//!
//! A session is one launched browser with one identity (fingerprint +
//! proxy); it serves at most `pages_per_browser` visits, in concurrent
//! batches. A block verdict ends the session immediately so the burned
//! identity stops accumulating evidence. Between sessions the runtime
//! budget is checked; on expiry the run stops and asks the hosting
//! workflow to restart it. Rows hit by a block are left unwritten, the
//! end-of-run rescan picks them up.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::time::{sleep, Instant};

use crate::config::{AgentMode, Config};
use crate::crawler;
use crate::fingerprint::FingerprintProfile;
use crate::proxy::ProxyPool;
use crate::restart;
use crate::result::ExtractionResult;
use crate::retry;
use crate::sheet::{RowTask, SheetClient};

fn jitter_ms(min: u64, max: u64) -> u64 {
    if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    }
}

/// Inter-batch delay, shrunk by a streak of clean batches (image mode only,
/// floor at 70%).
fn batch_delay(cfg: &Config, consecutive_ok: u32) -> Duration {
    let base = jitter_ms(cfg.batch_delay_min_ms, cfg.batch_delay_max_ms);
    if cfg.mode == AgentMode::ImageAds {
        let factor = (1.0 - 0.05 * consecutive_ok as f64).max(0.7);
        Duration::from_millis((base as f64 * factor) as u64)
    } else {
        Duration::from_millis(base)
    }
}

async fn process_task(
    browser: headless_chrome::Browser,
    cfg: Config,
    profile: FingerprintProfile,
    task: RowTask,
    stagger: Duration,
) -> (RowTask, ExtractionResult) {
    if !stagger.is_zero() {
        sleep(stagger).await;
    }
    let label = format!("row {}", task.row);
    let result = retry::run_with_retry(
        &cfg,
        &label,
        |r| {
            retry::attempt_succeeded(
                cfg.mode,
                task.needs_metadata,
                task.needs_video_id,
                task.existing_store_link.as_deref(),
                r,
            )
        },
        |attempt| crawler::visit_once(&browser, &cfg, &profile, &task, attempt),
    )
    .await;
    (task, result)
}

pub async fn run(cfg: Config, sheet: SheetClient, pool: ProxyPool) -> Result<()> {
    let started = Instant::now();
    let tasks = sheet.load_pending(&cfg).await?;
    if tasks.is_empty() {
        println!("🏁 Nothing to do");
        return Ok(());
    }

    let mut index = 0usize;
    let mut consecutive_ok: u32 = 0;

    while index < tasks.len() {
        if started.elapsed() >= cfg.max_runtime {
            println!(
                "⏰ Runtime budget exhausted after {} rows, requesting restart",
                index
            );
            restart::request_restart().await;
            return Ok(());
        }

        let profile = FingerprintProfile::random();
        let proxy = pool.pick_random();
        match &proxy {
            Some(p) => println!("🚀 New session via {} ({})", p.id(), profile.platform),
            None => println!("🚀 New session, direct connection ({})", profile.platform),
        }

        let browser = match crawler::launch_browser(&profile, proxy.as_ref()).await {
            Ok(b) => b,
            Err(e) => {
                println!("❌ Session launch failed: {}", e);
                sleep(Duration::from_millis(jitter_ms(
                    cfg.proxy_retry_delay_min_ms,
                    cfg.proxy_retry_delay_max_ms,
                )))
                .await;
                continue;
            }
        };

        let mut session_visits = 0usize;
        let mut session_blocked = false;

        while session_visits < cfg.pages_per_browser && index < tasks.len() && !session_blocked {
            let remaining_in_session = cfg.pages_per_browser - session_visits;
            let batch_len = cfg
                .concurrent_pages
                .min(remaining_in_session)
                .min(tasks.len() - index);
            let batch = &tasks[index..index + batch_len];
            println!(
                "📦 Batch of {} (rows {}..{}, {} done)",
                batch_len,
                batch[0].row,
                batch[batch_len - 1].row,
                index
            );

            let mut handles = Vec::with_capacity(batch_len);
            for (i, task) in batch.iter().enumerate() {
                let stagger = if cfg.stagger_max_ms > 0 {
                    Duration::from_millis(
                        jitter_ms(cfg.stagger_min_ms, cfg.stagger_max_ms) * i as u64,
                    )
                } else {
                    Duration::ZERO
                };
                handles.push(tokio::spawn(process_task(
                    browser.clone(),
                    cfg.clone(),
                    profile.clone(),
                    task.clone(),
                    stagger,
                )));
            }

            let mut results: Vec<(RowTask, ExtractionResult)> = Vec::with_capacity(batch_len);
            for handle in handles {
                match handle.await {
                    Ok(pair) => results.push(pair),
                    Err(e) => println!("⚠️ Visit task panicked: {}", e),
                }
            }

            if results.iter().any(|(_, r)| r.is_blocked()) {
                session_blocked = true;
                consecutive_ok = 0;
                if let Some(p) = &proxy {
                    p.note_block();
                }
            } else {
                consecutive_ok += 1;
            }

            // Blocked rows produce no cell updates; everything else lands.
            if let Err(e) = sheet.write_results(cfg.mode, &results).await {
                println!("⚠️ Sheet write failed: {}", e);
            }

            index += batch_len;
            session_visits += batch_len;

            if !session_blocked && index < tasks.len() && session_visits < cfg.pages_per_browser {
                sleep(batch_delay(&cfg, consecutive_ok)).await;
            }
        }

        drop(browser);

        if session_blocked {
            let delay = jitter_ms(cfg.proxy_retry_delay_min_ms, cfg.proxy_retry_delay_max_ms);
            println!("🧊 Session blocked, cooling down {}ms", delay);
            sleep(Duration::from_millis(delay)).await;
        }
    }

    for line in pool.stats_lines() {
        println!("📊 {}", line);
    }

    // Blocked rows and late failures stay pending; a rescan decides whether
    // another run is needed.
    let remaining = sheet.load_pending(&cfg).await?;
    if remaining.is_empty() {
        println!("🏁 All rows complete");
    } else {
        println!("🔁 {} rows still pending, requesting restart", remaining.len());
        restart::request_restart().await;
    }
    Ok(())
}

//! Self-restart signal.
//!
//! Long runs end on the wall-clock budget rather than on completion; a
//! `repository_dispatch` event asks the hosting workflow to start a fresh
//! run that picks up the remaining rows by rescanning the sheet. Fire and
//! forget: a failed dispatch is logged, never fatal.

use serde_json::json;

pub async fn request_restart() {
    let repo = match std::env::var("GITHUB_REPOSITORY") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            println!("🔁 Restart skipped: GITHUB_REPOSITORY not set");
            return;
        }
    };
    let token = match std::env::var("GH_TOKEN") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            println!("🔁 Restart skipped: GH_TOKEN not set");
            return;
        }
    };
    let event_type =
        std::env::var("RESTART_EVENT_TYPE").unwrap_or_else(|_| "restart-agent".to_string());

    let url = format!("https://api.github.com/repos/{}/dispatches", repo);
    let result = reqwest::Client::new()
        .post(&url)
        .header("User-Agent", "ads-agent")
        .header("Accept", "application/vnd.github.v3+json")
        .header("Authorization", format!("token {}", token))
        .json(&json!({ "event_type": event_type }))
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => {
            println!("🔁 Restart dispatch sent ({})", event_type);
        }
        Ok(resp) => {
            println!("⚠️ Restart dispatch rejected: {}", resp.status());
        }
        Err(e) => {
            println!("⚠️ Restart dispatch failed: {}", e);
        }
    }
}

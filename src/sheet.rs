//! Google Sheets row store.
//!
//! The sheet is both work queue and output: row planning decides which rows
//! still need a visit (empty cells and failure sentinels drive
//! re-processing), and batch writes push results back into per-mode columns.
//! Planning and write-mapping are pure functions over cell grids; only the
//! two REST calls touch the network. The client takes a ready OAuth access
//! token from the environment.
//!
//! Column layout: A advertiser, B creative URL, C store link, D app name,
//! E video id / image URL, F subtitle (image) or video id (video-only mode,
//! which keeps its URL in A), M timestamp.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{AgentMode, Config};
use crate::result::{ExtractionResult, Field, NOT_FOUND};

const COL_ADVERTISER: &str = "A";
const COL_STORE_LINK: &str = "C";
const COL_APP_NAME: &str = "D";
const COL_MEDIA: &str = "E";
const COL_SUBTITLE: &str = "F";
const COL_VIDEO_ONLY_ID: &str = "F";
const COL_TIMESTAMP: &str = "M";

/// One sheet row that still needs a visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowTask {
    /// 1-based sheet row number.
    pub row: usize,
    pub url: String,
    pub needs_metadata: bool,
    pub needs_video_id: bool,
    pub existing_store_link: Option<String>,
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Empty cells and failure sentinels all mean "worth another visit".
fn cell_missing(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v == "NOT_FOUND" || v == "ERROR" || v == "BLOCKED"
}

fn looks_like_store_link(value: &str) -> bool {
    value.contains("play.google.com") || value.contains("apps.apple.com")
}

/// Decide which rows need work. `start_row` is the sheet row number of
/// `rows[0]`.
pub fn plan_rows(mode: AgentMode, rows: &[Vec<String>], start_row: usize) -> Vec<RowTask> {
    let url_col = match mode {
        AgentMode::VideoOnly => 0,
        _ => 1,
    };

    rows.iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let url = cell(r, url_col).trim();
            if url.is_empty() || !url.starts_with("http") {
                return None;
            }
            let row = start_row + i;
            match mode {
                AgentMode::Unified => {
                    let store_link = cell(r, 2);
                    let needs_metadata = cell_missing(store_link) || cell_missing(cell(r, 3));
                    let needs_video_id = cell_missing(cell(r, 4));
                    if !needs_metadata && !needs_video_id {
                        return None;
                    }
                    Some(RowTask {
                        row,
                        url: url.to_string(),
                        needs_metadata,
                        needs_video_id,
                        existing_store_link: (!cell_missing(store_link))
                            .then(|| store_link.trim().to_string()),
                    })
                }
                AgentMode::VideoOnly => {
                    if !cell_missing(cell(r, 5)) {
                        return None;
                    }
                    Some(RowTask {
                        row,
                        url: url.to_string(),
                        needs_metadata: false,
                        needs_video_id: true,
                        existing_store_link: None,
                    })
                }
                AgentMode::ImageAds => {
                    let store_link = cell(r, 2);
                    // A row that already resolved to a Play Store listing is
                    // done as far as image extraction goes.
                    if looks_like_store_link(store_link) {
                        return None;
                    }
                    let needs = cell_missing(cell(r, 3))
                        || cell_missing(cell(r, 4))
                        || cell_missing(cell(r, 5));
                    if !needs {
                        return None;
                    }
                    Some(RowTask {
                        row,
                        url: url.to_string(),
                        needs_metadata: true,
                        needs_video_id: false,
                        existing_store_link: None,
                    })
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValueRange {
    pub range: String,
    pub values: Vec<Vec<String>>,
}

fn writable(field: &Field) -> Option<String> {
    match field {
        Field::Skip => None,
        other => Some(other.as_cell().to_string()),
    }
}

/// Map one result onto (column, value) updates. Blocked results produce no
/// writes at all; the row stays eligible for the next rescan. Skipped rows
/// get only the timestamp so the operator can see they were looked at.
pub fn row_updates(
    mode: AgentMode,
    result: &ExtractionResult,
    timestamp: &str,
) -> Vec<(&'static str, String)> {
    if result.is_blocked() {
        return Vec::new();
    }
    if result.is_skipped() {
        return vec![(COL_TIMESTAMP, timestamp.to_string())];
    }

    let mut out = Vec::new();
    match mode {
        AgentMode::Unified => {
            if let Field::Found(v) = &result.advertiser_name {
                out.push((COL_ADVERTISER, v.clone()));
            }
            if let Some(v) = writable(&result.store_link) {
                out.push((COL_STORE_LINK, v));
            }
            if let Some(v) = writable(&result.app_name) {
                out.push((COL_APP_NAME, v));
            }
            if let Some(v) = writable(&result.video_id) {
                out.push((COL_MEDIA, v));
            }
            out.push((COL_TIMESTAMP, timestamp.to_string()));
        }
        AgentMode::VideoOnly => {
            if let Some(v) = writable(&result.video_id) {
                out.push((COL_VIDEO_ONLY_ID, v));
            }
        }
        AgentMode::ImageAds => {
            if let Field::Found(v) = &result.advertiser_name {
                out.push((COL_ADVERTISER, v.clone()));
            }
            if let Field::Found(v) = &result.store_link {
                out.push((COL_STORE_LINK, v.clone()));
            }
            if let Some(v) = writable(&result.app_name) {
                out.push((COL_APP_NAME, v));
            }
            let media = result
                .image_url
                .found()
                .or_else(|| result.video_id.found())
                .unwrap_or(NOT_FOUND);
            out.push((COL_MEDIA, media.to_string()));
            out.push((
                COL_SUBTITLE,
                result
                    .app_subtitle
                    .found()
                    .unwrap_or(NOT_FOUND)
                    .to_string(),
            ));
            out.push((COL_TIMESTAMP, timestamp.to_string()));
        }
    }
    out
}

/// Single-cell value ranges for a batchUpdate call.
pub fn build_value_ranges(
    mode: AgentMode,
    sheet_name: &str,
    results: &[(RowTask, ExtractionResult)],
    timestamp: &str,
) -> Vec<ValueRange> {
    results
        .iter()
        .flat_map(|(task, result)| {
            row_updates(mode, result, timestamp)
                .into_iter()
                .map(move |(col, value)| ValueRange {
                    range: format!("{}!{}{}", sheet_name, col, task.row),
                    values: vec![vec![value]],
                })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct BatchUpdateBody<'a> {
    #[serde(rename = "valueInputOption")]
    value_input_option: &'a str,
    data: &'a [ValueRange],
}

pub struct SheetClient {
    http: reqwest::Client,
    spreadsheet_id: String,
    pub sheet_name: String,
    token: String,
}

impl SheetClient {
    pub fn from_env() -> Result<Self> {
        let spreadsheet_id =
            std::env::var("SPREADSHEET_ID").context("SPREADSHEET_ID must be set")?;
        let token = std::env::var("GOOGLE_ACCESS_TOKEN")
            .context("GOOGLE_ACCESS_TOKEN must be set")?;
        let sheet_name = std::env::var("SHEET_NAME").unwrap_or_else(|_| "Sheet1".to_string());
        Ok(SheetClient {
            http: reqwest::Client::new(),
            spreadsheet_id,
            sheet_name,
            token,
        })
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}",
            self.spreadsheet_id,
            urlencoding::encode(range),
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        let body: ValuesResponse = resp.json().await?;
        Ok(body.values)
    }

    /// Scan the sheet and return every row that still needs a visit. Data
    /// starts at row 2; image mode reads in chunks so a huge sheet does not
    /// come back in one response.
    pub async fn load_pending(&self, cfg: &Config) -> Result<Vec<RowTask>> {
        let mut tasks = Vec::new();
        if cfg.mode == AgentMode::ImageAds {
            let mut start = 2usize;
            loop {
                let range = format!(
                    "{}!A{}:M{}",
                    self.sheet_name,
                    start,
                    start + cfg.sheet_batch_size - 1
                );
                let rows = self.get_values(&range).await?;
                if rows.is_empty() {
                    break;
                }
                let chunk_len = rows.len();
                tasks.extend(plan_rows(cfg.mode, &rows, start));
                if chunk_len < cfg.sheet_batch_size {
                    break;
                }
                start += cfg.sheet_batch_size;
            }
        } else {
            let range = format!("{}!A2:M", self.sheet_name);
            let rows = self.get_values(&range).await?;
            tasks = plan_rows(cfg.mode, &rows, 2);
        }
        println!("📋 {} rows pending", tasks.len());
        Ok(tasks)
    }

    /// Push one batch of results. No-op when nothing is writable.
    pub async fn write_results(
        &self,
        mode: AgentMode,
        results: &[(RowTask, ExtractionResult)],
    ) -> Result<()> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let data = build_value_ranges(mode, &self.sheet_name, results, &timestamp);
        if data.is_empty() {
            return Ok(());
        }
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values:batchUpdate",
            self.spreadsheet_id,
        );
        let body = BatchUpdateBody {
            value_input_option: "RAW",
            data: &data,
        };
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("sheet batchUpdate failed: {} {}", status, text));
        }
        println!("💾 Wrote {} cells", data.len());
        Ok(())
    }
}

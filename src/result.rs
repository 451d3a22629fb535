//! Extraction outcome model.
//!
//! Every field of an [`ExtractionResult`] is a [`Field`] rather than a magic
//! string, so consumers are forced to handle every outcome. The sheet-facing
//! sentinel strings (`NOT_FOUND`, `SKIP`, `BLOCKED`, `ERROR`) are part of the
//! downstream contract and are produced only at the write boundary via
//! [`Field::as_cell`].

use crate::config::AgentMode;

pub const NOT_FOUND: &str = "NOT_FOUND";
pub const SKIP: &str = "SKIP";
pub const BLOCKED: &str = "BLOCKED";
pub const ERROR: &str = "ERROR";

/// One extracted field. `Skip` means "not applicable in this mode",
/// `NotFound` means "searched and absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Found(String),
    NotFound,
    Skip,
    Blocked,
    Error,
}

impl Field {
    pub fn from_option(value: Option<String>) -> Self {
        match value {
            Some(v) => Field::Found(v),
            None => Field::NotFound,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Field::Found(_))
    }

    pub fn found(&self) -> Option<&str> {
        match self {
            Field::Found(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Sheet cell representation. Sentinels must round-trip verbatim.
    pub fn as_cell(&self) -> &str {
        match self {
            Field::Found(v) => v.as_str(),
            Field::NotFound => NOT_FOUND,
            Field::Skip => SKIP,
            Field::Blocked => BLOCKED,
            Field::Error => ERROR,
        }
    }
}

/// Per-URL extraction result, one per attempt that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub advertiser_name: Field,
    pub app_name: Field,
    pub store_link: Field,
    pub video_id: Field,
    pub image_url: Field,
    pub app_subtitle: Field,
    pub is_video_ad: bool,
}

impl ExtractionResult {
    /// Initial per-visit result: requested fields start as `NotFound`,
    /// everything else as `Skip`.
    pub fn pending(mode: AgentMode, needs_metadata: bool) -> Self {
        let meta = |wanted: bool| if wanted { Field::NotFound } else { Field::Skip };
        match mode {
            AgentMode::Unified => ExtractionResult {
                advertiser_name: Field::Skip,
                app_name: meta(needs_metadata),
                store_link: meta(needs_metadata),
                video_id: Field::Skip,
                image_url: Field::Skip,
                app_subtitle: Field::Skip,
                is_video_ad: false,
            },
            AgentMode::VideoOnly => ExtractionResult {
                advertiser_name: Field::Skip,
                app_name: Field::Skip,
                store_link: Field::Skip,
                video_id: Field::NotFound,
                image_url: Field::Skip,
                app_subtitle: Field::Skip,
                is_video_ad: true,
            },
            AgentMode::ImageAds => ExtractionResult {
                advertiser_name: Field::Skip,
                app_name: meta(needs_metadata),
                store_link: meta(needs_metadata),
                video_id: Field::Skip,
                image_url: meta(needs_metadata),
                app_subtitle: meta(needs_metadata),
                is_video_ad: false,
            },
        }
    }

    /// Block verdict poisons the whole result; callers must ignore the rest.
    pub fn blocked() -> Self {
        ExtractionResult {
            advertiser_name: Field::Blocked,
            app_name: Field::Blocked,
            store_link: Field::Blocked,
            video_id: Field::Blocked,
            image_url: Field::Blocked,
            app_subtitle: Field::Blocked,
            is_video_ad: false,
        }
    }

    /// All retries consumed without meeting the success predicate.
    pub fn exhausted(mode: AgentMode) -> Self {
        let mut out = ExtractionResult::pending(mode, true);
        out.advertiser_name = Field::NotFound;
        out
    }

    /// The row was determined not to be applicable at all
    /// (image mode: no frame with the image-ad structure).
    pub fn skipped() -> Self {
        ExtractionResult {
            advertiser_name: Field::Skip,
            app_name: Field::Skip,
            store_link: Field::Skip,
            video_id: Field::Skip,
            image_url: Field::Skip,
            app_subtitle: Field::Skip,
            is_video_ad: false,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.advertiser_name == Field::Blocked
            || self.app_name == Field::Blocked
            || self.store_link == Field::Blocked
    }

    pub fn is_skipped(&self) -> bool {
        self.app_name == Field::Skip && self.image_url == Field::Skip && self.video_id == Field::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_strings_round_trip() {
        assert_eq!(Field::NotFound.as_cell(), "NOT_FOUND");
        assert_eq!(Field::Skip.as_cell(), "SKIP");
        assert_eq!(Field::Blocked.as_cell(), "BLOCKED");
        assert_eq!(Field::Error.as_cell(), "ERROR");
        assert_eq!(Field::Found("Candy Blast".into()).as_cell(), "Candy Blast");
    }

    #[test]
    fn test_blocked_result_poisons_everything() {
        let r = ExtractionResult::blocked();
        assert!(r.is_blocked());
        assert_eq!(r.video_id, Field::Blocked);
        assert_eq!(r.app_subtitle, Field::Blocked);
    }

    #[test]
    fn test_pending_respects_mode() {
        let r = ExtractionResult::pending(AgentMode::Unified, true);
        assert_eq!(r.app_name, Field::NotFound);
        assert_eq!(r.image_url, Field::Skip);

        let r = ExtractionResult::pending(AgentMode::Unified, false);
        assert_eq!(r.app_name, Field::Skip);

        let r = ExtractionResult::pending(AgentMode::ImageAds, true);
        assert_eq!(r.image_url, Field::NotFound);
        assert_eq!(r.video_id, Field::Skip);
    }
}

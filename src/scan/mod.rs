pub mod orchestrator;
pub mod presenter;

use serde::{Deserialize, Serialize};

pub use orchestrator::ScanOrchestrator;
pub use presenter::{LogPresenter, Presenter};

/// Lines shown under the badge headline.
const PREVIEW_LIMIT: usize = 6;

/// A record is flagged when it took some time, but less than the threshold.
/// Zero means the timer never ran, so it is never flagged.
pub fn is_flagged(seconds: u64, threshold_seconds: f64) -> bool {
    seconds > 0 && (seconds as f64) < threshold_seconds
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedItem {
    pub identifier: String,
    pub duration_text: String,
    pub seconds: u64,
}

/// Result of one scan: the threshold in force and what fell under it, in
/// page order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedSummary {
    pub threshold_minutes: f64,
    pub items: Vec<FlaggedItem>,
}

impl FlaggedSummary {
    pub fn new(threshold_minutes: f64) -> Self {
        Self {
            threshold_minutes,
            items: Vec::new(),
        }
    }

    pub fn headline(&self) -> String {
        format!(
            "Flagged (< {} min, excluding 0): {}",
            self.threshold_minutes,
            self.items.len()
        )
    }

    pub fn preview_lines(&self) -> Vec<String> {
        self.items
            .iter()
            .take(PREVIEW_LIMIT)
            .map(|item| format!("• {} - {}", item.identifier, item.duration_text))
            .collect()
    }
}

pub mod html;

use serde::{Deserialize, Serialize};

use crate::page::Page;

pub use html::VariantCardExtractor;

pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// One timed item found on the page, before any thresholding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub identifier: String,
    pub duration_text: String,
    /// `None` when the text carried no recognizable duration.
    pub duration_seconds: Option<u64>,
    /// Raw contact field the identifier was derived from, if any.
    pub contact: Option<String>,
}

/// Pulls candidate records out of a page snapshot.
///
/// Implementations must be deterministic for a given snapshot, free of side
/// effects, and synchronous: a scan extracts everything before it yields.
pub trait RecordExtractor: Send + Sync {
    fn extract(&self, page: &Page) -> Vec<CandidateRecord>;
}

/// Local part of an email-like contact, or `"unknown"`.
pub fn identifier_from_contact(contact: Option<&str>) -> String {
    contact
        .filter(|c| c.contains('@'))
        .and_then(|c| c.split('@').next())
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_IDENTIFIER.to_string())
}

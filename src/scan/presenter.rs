use std::sync::Mutex;

use crate::extractor::CandidateRecord;

use super::FlaggedSummary;

/// Receives scan output for display. Marks from the previous scan are
/// cleared before new ones are applied, so repeated scans of an unchanged
/// page leave the same marks behind.
pub trait Presenter: Send + Sync {
    fn clear_marks(&self);
    fn mark(&self, candidate: &CandidateRecord);
    fn render(&self, summary: &FlaggedSummary);
}

/// Writes the badge and a flagged-records table to the log.
#[derive(Default)]
pub struct LogPresenter {
    marked: Mutex<Vec<CandidateRecord>>,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records marked by the most recent scan.
    pub fn marked(&self) -> Vec<CandidateRecord> {
        match self.marked.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Presenter for LogPresenter {
    fn clear_marks(&self) {
        match self.marked.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn mark(&self, candidate: &CandidateRecord) {
        match self.marked.lock() {
            Ok(mut guard) => guard.push(candidate.clone()),
            Err(poisoned) => poisoned.into_inner().push(candidate.clone()),
        }
    }

    fn render(&self, summary: &FlaggedSummary) {
        log::info!("{}", summary.headline());
        for line in summary.preview_lines() {
            log::info!("  {line}");
        }

        if summary.items.is_empty() {
            return;
        }

        let width = summary
            .items
            .iter()
            .map(|item| item.identifier.len())
            .max()
            .unwrap_or(0)
            .max("identifier".len());
        log::info!(
            "{:<width$}  {:<16}  {:>7}",
            "identifier",
            "duration",
            "seconds"
        );
        for item in &summary.items {
            log::info!(
                "{:<width$}  {:<16}  {:>7}",
                item.identifier,
                item.duration_text,
                item.seconds
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str) -> CandidateRecord {
        CandidateRecord {
            identifier: id.into(),
            duration_text: "5 s".into(),
            duration_seconds: Some(5),
            contact: None,
        }
    }

    #[test]
    fn clearing_drops_previous_marks() {
        let presenter = LogPresenter::new();
        presenter.mark(&candidate("a"));
        presenter.mark(&candidate("b"));
        presenter.clear_marks();
        presenter.mark(&candidate("c"));

        let marked = presenter.marked();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].identifier, "c");
    }
}

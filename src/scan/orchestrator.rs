use std::sync::Arc;

use crate::{
    extractor::RecordExtractor,
    ledger::DedupLedger,
    page::PageSource,
    settings,
    store::KeyValueStore,
};

use super::{is_flagged, FlaggedItem, FlaggedSummary, Presenter};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_warn};

/// Runs one full pass over the current page: threshold lookup, extraction,
/// filtering, marking and ledger accumulation.
///
/// Holds no state between scans apart from what the presenter shows. Callers
/// must not run two scans at once; the trigger scheduler guarantees that.
pub struct ScanOrchestrator<S> {
    ledger: DedupLedger<S>,
    page: Arc<dyn PageSource>,
    extractor: Arc<dyn RecordExtractor>,
    presenter: Arc<dyn Presenter>,
}

impl<S: KeyValueStore> ScanOrchestrator<S> {
    pub fn new(
        ledger: DedupLedger<S>,
        page: Arc<dyn PageSource>,
        extractor: Arc<dyn RecordExtractor>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            ledger,
            page,
            extractor,
            presenter,
        }
    }

    pub fn ledger(&self) -> &DedupLedger<S> {
        &self.ledger
    }

    pub async fn scan(&self) -> FlaggedSummary {
        let threshold_minutes = settings::threshold_minutes(self.ledger.store().as_ref()).await;
        let threshold_seconds = settings::threshold_seconds(threshold_minutes);

        self.presenter.clear_marks();

        // Snapshot and extraction finish before the next await, so the scan
        // never sees a half-updated page.
        let (candidates, source_context) = match self.page.snapshot() {
            Ok(page) => (self.extractor.extract(&page), page.location),
            Err(err) => {
                log_warn!("Page snapshot unavailable, nothing to scan: {err:#}");
                (Vec::new(), String::new())
            }
        };

        let mut summary = FlaggedSummary::new(threshold_minutes);
        for candidate in candidates {
            let Some(seconds) = candidate.duration_seconds else {
                log_debug!("Skipping unparseable duration {:?}", candidate.duration_text);
                continue;
            };
            if !is_flagged(seconds, threshold_seconds) {
                continue;
            }

            self.presenter.mark(&candidate);
            summary.items.push(FlaggedItem {
                identifier: candidate.identifier.clone(),
                duration_text: candidate.duration_text.clone(),
                seconds,
            });

            // A failed append leaves the key unmarked, so the next scan retries it.
            if let Err(err) = self
                .ledger
                .append_if_new(&candidate.identifier, &candidate.duration_text, &source_context)
                .await
            {
                log_error!(
                    "Ledger append failed for {} ({}): {err:#}",
                    candidate.identifier,
                    candidate.duration_text
                );
            }
        }

        self.presenter.render(&summary);
        summary
    }
}

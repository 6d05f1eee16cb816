pub mod csv;
pub mod duration;
pub mod extractor;
pub mod ledger;
pub mod page;
pub mod scan;
pub mod settings;
pub mod store;
pub mod trigger;
pub mod utils;

use std::sync::Arc;

use anyhow::Result;

use extractor::RecordExtractor;
use ledger::DedupLedger;
use page::PageSource;
use scan::{Presenter, ScanOrchestrator};
use store::KeyValueStore;

pub use duration::parse_duration;
pub use extractor::{CandidateRecord, VariantCardExtractor};
pub use ledger::LedgerEntry;
pub use scan::{FlaggedItem, FlaggedSummary};
pub use trigger::{ScanHandle, ScanScheduler, ScanTrigger, TriggerKind};

/// Initialise logging. `RUST_LOG` still applies on top of the chosen level.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

/// Prepare the ledger in `store` and build an orchestrator around it.
/// Call once per process start; calling again is harmless.
pub async fn start<S: KeyValueStore>(
    store: Arc<S>,
    page: Arc<dyn PageSource>,
    extractor: Arc<dyn RecordExtractor>,
    presenter: Arc<dyn Presenter>,
) -> Result<Arc<ScanOrchestrator<S>>> {
    let ledger = DedupLedger::new(store);
    ledger.ensure_initialized().await?;
    Ok(Arc::new(ScanOrchestrator::new(ledger, page, extractor, presenter)))
}

pub mod scheduler;
pub mod watcher;

pub use scheduler::{ScanHandle, ScanReport, ScanScheduler, ScanTrigger};
pub use watcher::{ChangeNotifier, PollingWatcher};

/// Why a scan was requested. Only used for diagnostics; every kind goes
/// through the same coalescing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Initial,
    Mutation,
    Navigation,
}

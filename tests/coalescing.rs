// tests/coalescing.rs
//
// Scan requests that arrive while a scan is suspended on the store.
//
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use duration_flagger::{
    extractor::{CandidateRecord, RecordExtractor},
    ledger::DedupLedger,
    page::{Page, StaticPage},
    scan::{LogPresenter, ScanOrchestrator},
    settings::THRESHOLD_KEY,
    store::{KeyValueStore, MemoryStore, Record},
    ScanHandle, ScanScheduler, TriggerKind,
};

/// Holds the next threshold read until the test releases it.
struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    entered: Notify,
    release: Semaphore,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Semaphore::new(0),
        }
    }
}

impl KeyValueStore for GatedStore {
    async fn get(&self, keys: &[&str]) -> Result<Record> {
        if keys.contains(&THRESHOLD_KEY) && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.acquire().await?.forget();
        }
        self.inner.get(keys).await
    }

    async fn set(&self, record: Record) -> Result<()> {
        self.inner.set(record).await
    }
}

#[derive(Default)]
struct CountingExtractor {
    calls: AtomicUsize,
}

impl RecordExtractor for CountingExtractor {
    fn extract(&self, _page: &Page) -> Vec<CandidateRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    }
}

fn spawn(store: Arc<GatedStore>, extractor: Arc<CountingExtractor>) -> ScanHandle {
    let orchestrator = ScanOrchestrator::new(
        DedupLedger::new(store),
        Arc::new(StaticPage::new(Page::new("", "page"))),
        extractor,
        Arc::new(LogPresenter::new()),
    );
    ScanScheduler::spawn(Arc::new(orchestrator), CancellationToken::new())
}

async fn wait_for_scans(handle: &ScanHandle, n: u64) {
    let mut reports = handle.reports();
    tokio::time::timeout(
        Duration::from_secs(5),
        reports.wait_for(|r| r.scans_completed >= n),
    )
    .await
    .expect("scans did not complete in time")
    .expect("scan loop stopped");
}

#[tokio::test]
async fn trigger_during_scan_queues_exactly_one_follow_up() {
    let store = Arc::new(GatedStore::new());
    let extractor = Arc::new(CountingExtractor::default());
    let mut handle = spawn(store.clone(), extractor.clone());

    store.armed.store(true, Ordering::SeqCst);
    assert!(handle.fire(TriggerKind::Initial));
    store.entered.notified().await;

    // First scan is parked on the store; these collapse into one follow-up.
    assert!(handle.fire(TriggerKind::Navigation));
    assert!(!handle.fire(TriggerKind::Mutation));
    assert!(!handle.fire(TriggerKind::Mutation));

    store.release.add_permits(1);
    wait_for_scans(&handle, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.scans_completed(), 2);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_lets_the_running_scan_finish() {
    let store = Arc::new(GatedStore::new());
    let extractor = Arc::new(CountingExtractor::default());
    let mut handle = spawn(store.clone(), extractor.clone());

    store.armed.store(true, Ordering::SeqCst);
    handle.fire(TriggerKind::Initial);
    store.entered.notified().await;

    let release = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.release.add_permits(1);
        })
    };

    handle.shutdown().await.unwrap();
    release.await.unwrap();

    assert_eq!(handle.scans_completed(), 1);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn separate_bursts_each_get_a_scan() {
    let store = Arc::new(GatedStore::new());
    let extractor = Arc::new(CountingExtractor::default());
    let mut handle = spawn(store, extractor.clone());

    for _ in 0..5 {
        handle.fire(TriggerKind::Mutation);
    }
    wait_for_scans(&handle, 1).await;

    for _ in 0..5 {
        handle.fire(TriggerKind::Navigation);
    }
    wait_for_scans(&handle, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    handle.shutdown().await.unwrap();
}

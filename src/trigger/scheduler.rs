use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scan::{FlaggedSummary, ScanOrchestrator};
use crate::store::KeyValueStore;

use super::TriggerKind;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Cheap, cloneable handle that requests a scan.
///
/// The request queue holds a single slot. While a request is waiting, further
/// requests are dropped; once the scan loop picks it up the slot frees, so a
/// request made during a running scan queues exactly one follow-up.
#[derive(Clone)]
pub struct ScanTrigger {
    tx: mpsc::Sender<TriggerKind>,
}

impl ScanTrigger {
    /// A trigger and the single-slot queue it feeds.
    pub(crate) fn channel() -> (Self, mpsc::Receiver<TriggerKind>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Returns `true` if this call queued a scan, `false` if it was folded
    /// into one already pending (or the loop has stopped).
    pub fn fire(&self, kind: TriggerKind) -> bool {
        match self.tx.try_send(kind) {
            Ok(()) => {
                log_debug!("Scan requested ({kind:?})");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                log_debug!("Scan already pending, coalescing {kind:?}");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Progress published after each completed scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub scans_completed: u64,
    pub last: Option<FlaggedSummary>,
}

pub struct ScanScheduler;

impl ScanScheduler {
    /// Start the single consumer loop for `orchestrator`. Scans only happen
    /// when a trigger fires; nothing runs at spawn time.
    pub fn spawn<S: KeyValueStore>(
        orchestrator: Arc<ScanOrchestrator<S>>,
        cancel_token: CancellationToken,
    ) -> ScanHandle {
        let (trigger, rx) = ScanTrigger::channel();
        let (report_tx, report_rx) = watch::channel(ScanReport::default());

        let handle = tokio::spawn(scan_loop(orchestrator, rx, report_tx, cancel_token.clone()));

        ScanHandle {
            trigger,
            reports: report_rx,
            cancel_token,
            handle: Some(handle),
        }
    }
}

async fn scan_loop<S: KeyValueStore>(
    orchestrator: Arc<ScanOrchestrator<S>>,
    mut rx: mpsc::Receiver<TriggerKind>,
    report_tx: watch::Sender<ScanReport>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("scan loop shutting down");
                break;
            }
            request = rx.recv() => {
                let Some(kind) = request else { break };
                log_debug!("Scanning ({kind:?})");
                // Runs to completion; cancellation is only observed between scans.
                let summary = orchestrator.scan().await;
                report_tx.send_modify(|report| {
                    report.scans_completed += 1;
                    report.last = Some(summary);
                });
            }
        }
    }
}

pub struct ScanHandle {
    trigger: ScanTrigger,
    reports: watch::Receiver<ScanReport>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ScanHandle {
    pub fn trigger(&self) -> ScanTrigger {
        self.trigger.clone()
    }

    pub fn fire(&self, kind: TriggerKind) -> bool {
        self.trigger.fire(kind)
    }

    pub fn reports(&self) -> watch::Receiver<ScanReport> {
        self.reports.clone()
    }

    pub fn scans_completed(&self) -> u64 {
        self.reports.borrow().scans_completed
    }

    /// Stop accepting work and wait for the loop to exit. A scan already in
    /// progress finishes first.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel_token.cancel();

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("scan loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

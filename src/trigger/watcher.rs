use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::page::{Page, PageSource};

use super::{ScanTrigger, TriggerKind};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// A source of "the page may have changed" signals.
pub trait ChangeNotifier {
    /// Start forwarding change signals to `trigger` until `cancel_token` fires.
    fn subscribe(self, trigger: ScanTrigger, cancel_token: CancellationToken) -> JoinHandle<()>;
}

/// Classify the difference between two snapshots.
pub fn classify_change(previous: &Page, current: &Page) -> Option<TriggerKind> {
    if previous.location != current.location {
        Some(TriggerKind::Navigation)
    } else if previous.html != current.html {
        Some(TriggerKind::Mutation)
    } else {
        None
    }
}

/// Polls a page source and reports navigations (location changed) and
/// mutations (content changed).
pub struct PollingWatcher {
    page: Arc<dyn PageSource>,
    interval: Duration,
}

impl PollingWatcher {
    pub fn new(page: Arc<dyn PageSource>, interval: Duration) -> Self {
        Self { page, interval }
    }

    async fn snapshot(&self) -> Option<Page> {
        let page = Arc::clone(&self.page);
        match tokio::task::spawn_blocking(move || page.snapshot()).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(err)) => {
                log_warn!("page poll failed: {err:#}");
                None
            }
            Err(err) => {
                log_warn!("page poll worker join failed: {err}");
                None
            }
        }
    }
}

impl ChangeNotifier for PollingWatcher {
    /// The first successful poll records the baseline and fires
    /// [`TriggerKind::Initial`], so the first scan never reads an older page
    /// than the one later polls are compared against.
    fn subscribe(self, trigger: ScanTrigger, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut last: Option<Page> = None;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        log_info!("page watcher shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(current) = self.snapshot().await else { continue };
                        let change = match &last {
                            None => Some(TriggerKind::Initial),
                            Some(previous) => classify_change(previous, &current),
                        };
                        if let Some(kind) = change {
                            log_debug!("page change detected: {kind:?}");
                            trigger.fire(kind);
                        }
                        last = Some(current);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::StaticPage;
    use tokio::sync::mpsc;

    const POLL: Duration = Duration::from_millis(10);

    async fn next_kind(rx: &mut mpsc::Receiver<TriggerKind>) -> TriggerKind {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no change reported in time")
            .expect("watcher dropped its trigger")
    }

    async fn assert_quiet(rx: &mut mpsc::Receiver<TriggerKind>) {
        tokio::time::sleep(POLL * 5).await;
        assert!(rx.try_recv().is_err(), "unexpected change reported");
    }

    #[test]
    fn location_change_is_navigation() {
        let a = Page::new("<p>x</p>", "https://host/1");
        let b = Page::new("<p>y</p>", "https://host/2");
        assert_eq!(classify_change(&a, &b), Some(TriggerKind::Navigation));
    }

    #[test]
    fn content_change_is_mutation() {
        let a = Page::new("<p>x</p>", "https://host/1");
        let b = Page::new("<p>y</p>", "https://host/1");
        assert_eq!(classify_change(&a, &b), Some(TriggerKind::Mutation));
    }

    #[test]
    fn identical_snapshots_are_quiet() {
        let a = Page::new("<p>x</p>", "https://host/1");
        assert_eq!(classify_change(&a, &a.clone()), None);
    }

    #[tokio::test]
    async fn polling_reports_baseline_then_each_change_once() {
        let page = Arc::new(StaticPage::new(Page::new("<p>x</p>", "https://host/1")));
        let (trigger, mut rx) = ScanTrigger::channel();
        let cancel_token = CancellationToken::new();
        let task = PollingWatcher::new(page.clone(), POLL).subscribe(trigger, cancel_token.clone());

        assert_eq!(next_kind(&mut rx).await, TriggerKind::Initial);
        assert_quiet(&mut rx).await;

        page.navigate("https://host/2").unwrap();
        assert_eq!(next_kind(&mut rx).await, TriggerKind::Navigation);
        assert_quiet(&mut rx).await;

        page.set_html("<p>y</p>").unwrap();
        assert_eq!(next_kind(&mut rx).await, TriggerKind::Mutation);
        assert_quiet(&mut rx).await;

        // A navigation that lands together with its new content is one change.
        page.replace(Page::new("<p>z</p>", "https://host/3")).unwrap();
        assert_eq!(next_kind(&mut rx).await, TriggerKind::Navigation);
        assert_quiet(&mut rx).await;

        cancel_token.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("watcher did not stop after cancel")
            .unwrap();
    }
}

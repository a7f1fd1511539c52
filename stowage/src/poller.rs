//! Progress polling for bundles being downloaded.
//!
//! The downloader may run out of process, so progress is pulled rather than
//! pushed: a [`ProgressPoller`] asks its [`ProgressSource`] where each
//! watched bundle stands on every tick and hands the answer to the
//! listener's callback. A listener is dropped once its bundle finishes or
//! fails. The polling task only runs while there are listeners.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::catalog::CatalogState;
use crate::client::BundleDownloadState;
use crate::error::StowageResult;

/// Where a bundle stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The downloader reports the bundle's job.
    Downloading(BundleDownloadState),
    /// The bundle ended `update-failed` or `update-aborted`.
    Failed(CatalogState),
    /// The job is gone from the downloader but not yet reconciled.
    Installing,
    Finished,
}

impl Progress {
    /// Listeners are dropped after a terminal report.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Finished)
    }
}

/// Answers progress queries by canonical URL.
pub trait ProgressSource: Send + Sync {
    fn progress(&self, canonical_url: &str) -> impl Future<Output = StowageResult<Progress>> + Send;
}

impl<T: ProgressSource> ProgressSource for Arc<T> {
    fn progress(&self, canonical_url: &str) -> impl Future<Output = StowageResult<Progress>> + Send {
        (**self).progress(canonical_url)
    }
}

/// Handle returned by [`ProgressPoller::listen`].
pub type ListenerId = u64;

type Callback = Arc<dyn Fn(&Progress) + Send + Sync>;

struct Listener {
    canonical_url: String,
    callback: Callback,
}

struct Shared {
    listeners: Mutex<HashMap<ListenerId, Listener>>,
    running: AtomicBool,
}

/// Polls a [`ProgressSource`] on a fixed interval for every listener.
pub struct ProgressPoller<P> {
    source: Arc<P>,
    interval: Duration,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl<P> ProgressPoller<P>
where
    P: ProgressSource + 'static,
{
    pub fn new(source: Arc<P>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            shared: Arc::new(Shared {
                listeners: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Report the progress of `canonical_url` to `callback` on every tick
    /// until the bundle finishes or fails.
    ///
    /// Starts the polling task if it is not running; must be called from
    /// within a tokio runtime.
    pub fn listen<F>(&self, canonical_url: &str, callback: F) -> ListenerId
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let start = match self.shared.listeners.lock() {
            Ok(mut listeners) => {
                listeners.insert(
                    id,
                    Listener {
                        canonical_url: canonical_url.to_string(),
                        callback: Arc::new(callback),
                    },
                );
                !self.shared.running.swap(true, Ordering::SeqCst)
            }
            Err(_) => false,
        };
        debug!(listener = id, canonical_url = %canonical_url, "Progress listener added");

        if start {
            let source = Arc::clone(&self.source);
            let shared = Arc::clone(&self.shared);
            tokio::spawn(run(source, shared, self.interval));
        }
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        self.shared
            .listeners
            .lock()
            .map(|mut listeners| listeners.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Whether the polling task is active.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

async fn run<P: ProgressSource>(source: Arc<P>, shared: Arc<Shared>, period: Duration) {
    debug!(interval_ms = period.as_millis() as u64, "Progress poller started");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let watched: Vec<(ListenerId, String)> = {
            let Ok(listeners) = shared.listeners.lock() else {
                shared.running.store(false, Ordering::SeqCst);
                break;
            };
            if listeners.is_empty() {
                shared.running.store(false, Ordering::SeqCst);
                break;
            }
            listeners
                .iter()
                .map(|(id, l)| (*id, l.canonical_url.clone()))
                .collect()
        };

        let mut reports: HashMap<String, Progress> = HashMap::new();
        for (_, canonical_url) in &watched {
            if reports.contains_key(canonical_url) {
                continue;
            }
            match source.progress(canonical_url).await {
                Ok(progress) => {
                    trace!(canonical_url = %canonical_url, progress = ?progress, "Progress polled");
                    reports.insert(canonical_url.clone(), progress);
                }
                Err(e) => warn!(canonical_url = %canonical_url, error = %e, "Progress query failed"),
            }
        }

        for (id, canonical_url) in watched {
            let Some(progress) = reports.get(&canonical_url) else {
                continue;
            };
            let callback = {
                let Ok(mut listeners) = shared.listeners.lock() else {
                    continue;
                };
                if progress.is_terminal() {
                    listeners.remove(&id).map(|l| l.callback)
                } else {
                    listeners.get(&id).map(|l| Arc::clone(&l.callback))
                }
            };
            if let Some(callback) = callback {
                callback(progress);
            }
        }
    }
    debug!("Progress poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use tokio::sync::mpsc;

    use crate::download::DownloadState;

    const URL: &str = "https://cdn.example.com/pkg/stowage.json";

    /// Plays back a fixed sequence, then repeats the last entry.
    struct ScriptedSource {
        script: Mutex<VecDeque<Progress>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Progress>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    impl ProgressSource for ScriptedSource {
        async fn progress(&self, _canonical_url: &str) -> StowageResult<Progress> {
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            Ok(next.unwrap_or(Progress::Finished))
        }
    }

    fn downloading() -> Progress {
        Progress::Downloading(BundleDownloadState {
            state: DownloadState::new("job-1", 10),
            version: "2.0.0".to_string(),
            previous_version: "1.0.0".to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_until_finished() {
        let source = ScriptedSource::new(vec![downloading(), Progress::Installing, Progress::Finished]);
        let poller = ProgressPoller::new(source, Duration::from_millis(500));
        let (tx, mut rx) = mpsc::unbounded_channel();
        poller.listen(URL, move |p| {
            let _ = tx.send(p.clone());
        });
        assert!(poller.is_running());

        assert_eq!(rx.recv().await, Some(downloading()));
        assert_eq!(rx.recv().await, Some(Progress::Installing));
        assert_eq!(rx.recv().await, Some(Progress::Finished));
        assert_eq!(rx.recv().await, None);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!poller.is_running());
        assert_eq!(poller.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_drops_listener() {
        let source = ScriptedSource::new(vec![Progress::Failed(CatalogState::UpdateAborted)]);
        let poller = ProgressPoller::new(source, Duration::from_millis(500));
        let (tx, mut rx) = mpsc::unbounded_channel();
        poller.listen(URL, move |p| {
            let _ = tx.send(p.clone());
        });
        assert_eq!(
            rx.recv().await,
            Some(Progress::Failed(CatalogState::UpdateAborted))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlisten_stops_timer() {
        let source = ScriptedSource::new(vec![downloading()]);
        let poller = ProgressPoller::new(source, Duration::from_millis(500));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = poller.listen(URL, move |p| {
            let _ = tx.send(p.clone());
        });
        assert_eq!(rx.recv().await, Some(downloading()));
        assert_eq!(rx.recv().await, Some(downloading()));

        assert!(poller.unlisten(id));
        assert!(!poller.unlisten(id));
        while let Some(progress) = rx.recv().await {
            assert_eq!(progress, downloading());
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_after_stopping() {
        let source = ScriptedSource::new(vec![Progress::Finished]);
        let poller = ProgressPoller::new(source, Duration::from_millis(100));
        poller.listen(URL, |_| {});
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!poller.is_running());

        let (tx, mut rx) = mpsc::unbounded_channel();
        poller.listen(URL, move |p| {
            let _ = tx.send(p.clone());
        });
        assert!(poller.is_running());
        assert_eq!(rx.recv().await, Some(Progress::Finished));
    }
}

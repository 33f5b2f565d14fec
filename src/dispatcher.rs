//! Fire-and-forget hand-off of analysis results to an external sink.

use crate::analyzer::FaceResult;
use crate::Result;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Destination for completed result sets
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Deliver one result set; best effort
    async fn send(&self, results: &[FaceResult]) -> Result<()>;

    /// Short name used in log lines
    fn name(&self) -> &str;
}

#[derive(Debug, Default)]
struct DispatchCounters {
    generation: AtomicU64,
    in_flight: AtomicUsize,
    delivered: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
}

/// Counts one running send; released even if the sink panics
struct InFlight(Arc<DispatchCounters>);

impl InFlight {
    fn enter(counters: &Arc<DispatchCounters>) -> Self {
        counters.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counters))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Forwards result sets to a [`ResultSink`] without making the caller wait.
///
/// Every dispatch runs as its own task with its own copy of the results, so
/// concurrent sends never share state. There is no queue: a newer dispatch
/// does not wait for an older one. [`ResultDispatcher::abandon_in_flight`]
/// makes all running sends give up at their next suspension point.
#[derive(Clone)]
pub struct ResultDispatcher {
    sink: Arc<dyn ResultSink>,
    epoch: Arc<watch::Sender<u64>>,
    counters: Arc<DispatchCounters>,
}

impl ResultDispatcher {
    /// Create a dispatcher for `sink`
    #[must_use]
    pub fn new(sink: Arc<dyn ResultSink>) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            sink,
            epoch: Arc::new(epoch),
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    /// Start sending `results`; returns the handle of the send task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, results: Vec<FaceResult>) -> JoinHandle<()> {
        let generation = self.counters.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let sink = Arc::clone(&self.sink);
        let counters = Arc::clone(&self.counters);
        let mut epoch_rx = self.epoch.subscribe();
        let started_epoch = *epoch_rx.borrow_and_update();

        let in_flight = InFlight::enter(&counters);
        tokio::spawn(async move {
            let _in_flight = in_flight;
            let abandoned = async {
                // A dropped sender means the dispatcher itself is gone
                while epoch_rx.changed().await.is_ok() {
                    if *epoch_rx.borrow() != started_epoch {
                        break;
                    }
                }
            };

            tokio::select! {
                outcome = sink.send(&results) => match outcome {
                    Ok(()) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                        let latest = counters.generation.load(Ordering::Acquire);
                        if latest == generation {
                            debug!("Delivered {} face result(s) to {}", results.len(), sink.name());
                        } else {
                            debug!("Delivered superseded result set {generation} (latest {latest}) to {}", sink.name());
                        }
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("Sending results to {} failed: {}", sink.name(), e);
                    }
                },
                () = abandoned => {
                    counters.abandoned.fetch_add(1, Ordering::Relaxed);
                    debug!("Abandoned in-flight send of result set {generation}");
                }
            }
        })
    }

    /// Abandon every send still in flight; later dispatches are unaffected
    pub fn abandon_in_flight(&self) {
        self.epoch.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }

    /// Sends currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Total dispatches started
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.counters.generation.load(Ordering::Acquire)
    }

    /// Sends that reached the sink successfully
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.counters.delivered.load(Ordering::Relaxed)
    }

    /// Sends the sink rejected
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Sends abandoned on teardown
    #[must_use]
    pub fn abandoned(&self) -> u64 {
        self.counters.abandoned.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct FailingSink;

    #[async_trait]
    impl ResultSink for FailingSink {
        async fn send(&self, _results: &[FaceResult]) -> Result<()> {
            Err(Error::Dispatch("proxy unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct PanickingSink;

    #[async_trait]
    impl ResultSink for PanickingSink {
        async fn send(&self, _results: &[FaceResult]) -> Result<()> {
            panic!("sink crashed");
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    struct StalledSink {
        release: Notify,
    }

    #[async_trait]
    impl ResultSink for StalledSink {
        async fn send(&self, _results: &[FaceResult]) -> Result<()> {
            self.release.notified().await;
            Ok(())
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_failed_send_is_absorbed() {
        let dispatcher = ResultDispatcher::new(Arc::new(FailingSink));
        dispatcher.dispatch(vec![FaceResult::default()]).await.unwrap();
        assert_eq!(dispatcher.failed(), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_sink_releases_in_flight() {
        let dispatcher = ResultDispatcher::new(Arc::new(PanickingSink));
        let outcome = dispatcher.dispatch(vec![FaceResult::default()]).await;
        assert!(outcome.unwrap_err().is_panic());
        assert_eq!(dispatcher.in_flight(), 0);
        assert_eq!(dispatcher.delivered(), 0);
    }

    #[tokio::test]
    async fn test_abandon_in_flight() {
        let sink = Arc::new(StalledSink { release: Notify::new() });
        let dispatcher = ResultDispatcher::new(sink);
        let first = dispatcher.dispatch(Vec::new());
        let second = dispatcher.dispatch(Vec::new());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.in_flight(), 2);

        dispatcher.abandon_in_flight();
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(dispatcher.abandoned(), 2);
        assert_eq!(dispatcher.delivered(), 0);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_after_abandon_still_delivers() {
        let sink = Arc::new(StalledSink { release: Notify::new() });
        let dispatcher = ResultDispatcher::new(Arc::clone(&sink) as Arc<dyn ResultSink>);
        dispatcher.abandon_in_flight();

        let handle = dispatcher.dispatch(Vec::new());
        tokio::time::sleep(Duration::from_millis(10)).await;
        sink.release.notify_one();
        handle.await.unwrap();
        assert_eq!(dispatcher.delivered(), 1);
        assert_eq!(dispatcher.abandoned(), 0);
    }
}

//! Periodic capture timer.
//!
//! Every tick tries the [`CaptureGate`]; a tick that finds it held is dropped,
//! never queued. Accepted ticks run one capture cycle on its own task, so the
//! timer itself never waits on capture, detection or analysis.

use crate::error::Result;
use crate::gate::CaptureGate;
use async_trait::async_trait;
use log::{debug, error, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// What happened to the heavy analysis branch of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisOutcome {
    /// No faces, nothing to analyse
    #[default]
    NotRequested,
    /// Another analysis was still running; this frame was skipped
    Busy,
    /// Analysis handed off to a background task
    Submitted,
    /// Analysis finished with this many results
    Completed(usize),
    /// Frame pull or analysis failed
    Failed,
}

/// Summary of one capture cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    /// Faces found by the local detector
    pub faces_detected: usize,
    /// Heavy analysis branch outcome
    pub analysis: AnalysisOutcome,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} face(s), analysis ", self.faces_detected)?;
        match self.analysis {
            AnalysisOutcome::NotRequested => write!(f, "not requested"),
            AnalysisOutcome::Busy => write!(f, "skipped (busy)"),
            AnalysisOutcome::Submitted => write!(f, "submitted"),
            AnalysisOutcome::Completed(count) => write!(f, "completed with {count} result(s)"),
            AnalysisOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Work performed on every accepted tick
#[async_trait]
pub trait CaptureCycle: Send + Sync + 'static {
    /// Whether cycles should run at all right now
    fn is_active(&self) -> bool;

    /// Run one capture cycle
    async fn run_cycle(&self) -> Result<CycleReport>;
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Pipeline inactive, nothing attempted
    Idle,
    /// Previous cycle still holds the gate
    Dropped,
    /// A new cycle was started
    Started,
}

#[derive(Debug, Default)]
struct SchedulerCounters {
    ticks: AtomicU64,
    idle: AtomicU64,
    dropped: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Tick and cycle counts of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub idle: u64,
    pub dropped: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Fixed-period driver of capture cycles
pub struct PeriodicCaptureScheduler {
    interval: Duration,
    stop_tx: watch::Sender<bool>,
    timer: Option<JoinHandle<()>>,
    counters: Arc<SchedulerCounters>,
}

impl PeriodicCaptureScheduler {
    /// Start ticking every `interval`; the first tick fires one interval from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(interval: Duration, gate: Arc<CaptureGate>, cycle: Arc<dyn CaptureCycle>) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let counters = Arc::new(SchedulerCounters::default());
        let timer_counters = Arc::clone(&counters);

        let timer = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    // Stop requested or scheduler dropped
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        fire(&gate, &cycle, &timer_counters);
                    }
                }
            }
            debug!("Capture timer stopped");
        });

        debug!("Capture timer started with {interval:?} period");
        Self {
            interval,
            stop_tx,
            timer: Some(timer),
            counters,
        }
    }

    /// Tick period
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Timer still ticking
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    /// Stop the timer. No tick fires after this returns.
    ///
    /// A cycle already running is left to finish and releases the gate itself.
    /// Calling stop more than once is harmless.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(timer) = self.timer.take() {
            if let Err(e) = timer.await {
                warn!("Capture timer ended abnormally: {e}");
            }
        }
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        SchedulerStats {
            ticks: load(&self.counters.ticks),
            idle: load(&self.counters.idle),
            dropped: load(&self.counters.dropped),
            started: load(&self.counters.started),
            completed: load(&self.counters.completed),
            failed: load(&self.counters.failed),
        }
    }
}

impl Drop for PeriodicCaptureScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

fn fire(gate: &CaptureGate, cycle: &Arc<dyn CaptureCycle>, counters: &Arc<SchedulerCounters>) -> TickOutcome {
    counters.ticks.fetch_add(1, Ordering::Relaxed);

    if !cycle.is_active() {
        counters.idle.fetch_add(1, Ordering::Relaxed);
        return TickOutcome::Idle;
    }

    let Some(permit) = gate.try_acquire() else {
        counters.dropped.fetch_add(1, Ordering::Relaxed);
        trace!("Capture tick dropped, previous cycle still running");
        return TickOutcome::Dropped;
    };

    counters.started.fetch_add(1, Ordering::Relaxed);
    let cycle = Arc::clone(cycle);
    let counters = Arc::clone(counters);
    tokio::spawn(async move {
        // Held by the supervisor so a panicking cycle still frees the gate
        let _permit = permit;
        let outcome = tokio::spawn(async move { cycle.run_cycle().await }).await;
        match outcome {
            Ok(Ok(report)) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                trace!("Capture cycle finished: {report}");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Capture cycle failed: {e}");
            }
            Err(e) if e.is_panic() => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("Capture cycle panicked");
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!("Capture cycle cancelled");
            }
        }
    });
    TickOutcome::Started
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct SleepyCycle {
        active: AtomicBool,
        runs: AtomicU64,
        duration: Duration,
    }

    impl SleepyCycle {
        fn new(duration: Duration) -> Arc<Self> {
            Arc::new(Self {
                active: AtomicBool::new(true),
                runs: AtomicU64::new(0),
                duration,
            })
        }
    }

    #[async_trait]
    impl CaptureCycle for SleepyCycle {
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        async fn run_cycle(&self) -> Result<CycleReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            time::sleep(self.duration).await;
            Ok(CycleReport::default())
        }
    }

    #[test]
    fn test_report_display() {
        let report = CycleReport {
            faces_detected: 2,
            analysis: AnalysisOutcome::Completed(1),
        };
        assert_eq!(report.to_string(), "2 face(s), analysis completed with 1 result(s)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_cycles_never_dropped() {
        let gate = Arc::new(CaptureGate::new());
        let cycle = SleepyCycle::new(Duration::from_millis(10));
        let mut scheduler =
            PeriodicCaptureScheduler::start(Duration::from_millis(100), Arc::clone(&gate), cycle.clone());

        time::sleep(Duration::from_millis(550)).await;
        scheduler.stop().await;

        let stats = scheduler.stats();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.started, 5);
        assert_eq!(stats.dropped, 0);
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_drops_ticks() {
        let gate = Arc::new(CaptureGate::new());
        let cycle = SleepyCycle::new(Duration::from_millis(250));
        let mut scheduler =
            PeriodicCaptureScheduler::start(Duration::from_millis(100), Arc::clone(&gate), cycle.clone());

        time::sleep(Duration::from_millis(1_050)).await;
        scheduler.stop().await;
        // Let the last cycle finish
        time::sleep(Duration::from_millis(300)).await;

        let stats = scheduler.stats();
        assert!(stats.dropped > 0);
        assert_eq!(stats.started + stats.dropped + stats.idle, stats.ticks);
        assert_eq!(stats.started, stats.completed);
        assert!(!gate.is_held());
        assert_eq!(gate.acquisitions(), gate.releases());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_stop() {
        let gate = Arc::new(CaptureGate::new());
        let cycle = SleepyCycle::new(Duration::from_millis(1));
        let mut scheduler = PeriodicCaptureScheduler::start(Duration::from_millis(66), gate, cycle);

        time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
        let ticks = scheduler.stats().ticks;

        time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(scheduler.stats().ticks, ticks);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_cycle_is_idle() {
        let gate = Arc::new(CaptureGate::new());
        let cycle = SleepyCycle::new(Duration::from_millis(1));
        cycle.active.store(false, Ordering::SeqCst);
        let mut scheduler =
            PeriodicCaptureScheduler::start(Duration::from_millis(100), Arc::clone(&gate), cycle.clone());

        time::sleep(Duration::from_millis(350)).await;
        scheduler.stop().await;

        assert_eq!(scheduler.stats().idle, 3);
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 0);
        assert_eq!(gate.acquisitions(), 0);
    }

    struct PanickingCycle;

    #[async_trait]
    impl CaptureCycle for PanickingCycle {
        fn is_active(&self) -> bool {
            true
        }

        async fn run_cycle(&self) -> Result<CycleReport> {
            panic!("detector exploded");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cycle_releases_gate() {
        let gate = Arc::new(CaptureGate::new());
        let mut scheduler =
            PeriodicCaptureScheduler::start(Duration::from_millis(100), Arc::clone(&gate), Arc::new(PanickingCycle));

        time::sleep(Duration::from_millis(250)).await;
        scheduler.stop().await;
        time::sleep(Duration::from_millis(10)).await;

        let stats = scheduler.stats();
        assert_eq!(stats.started, 2);
        assert_eq!(stats.failed, 2);
        assert!(!gate.is_held());
    }
}

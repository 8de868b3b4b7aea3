//! Periodic elapsed-time notifier
//!
//! The clock measures recording time with a stopwatch that only runs while
//! recording. A tick task reports the stopwatch once per period; ticks are
//! skipped while suspended so the paused interval never shows up in the
//! reported values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Default tick cadence
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Stopwatch {
    fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        }
    }

    fn run(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn halt(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }
}

#[derive(Debug, Default)]
struct ClockShared {
    stopwatch: Mutex<Stopwatch>,
    ticking: AtomicBool,
    resumed: Notify,
}

impl ClockShared {
    fn stopwatch(&self) -> std::sync::MutexGuard<'_, Stopwatch> {
        self.stopwatch.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn suspend(&self) {
        self.ticking.store(false, Ordering::SeqCst);
        self.stopwatch().halt();
    }

    fn elapsed(&self) -> Duration {
        self.stopwatch().elapsed()
    }
}

/// Cheap handle for suspending the clock from another task
#[derive(Debug, Clone)]
pub struct ClockHandle {
    shared: Arc<ClockShared>,
}

impl ClockHandle {
    pub fn suspend(&self) {
        self.shared.suspend();
    }

    pub fn elapsed(&self) -> Duration {
        self.shared.elapsed()
    }
}

/// 1 Hz recording-time notifier.
///
/// `start` emits `0.0` immediately, then the cumulative elapsed time once per
/// period. Emitted values are strictly increasing.
#[derive(Debug)]
pub struct ProgressClock {
    period: Duration,
    shared: Arc<ClockShared>,
    task: Option<JoinHandle<()>>,
}

impl Default for ProgressClock {
    fn default() -> Self {
        Self::new(TICK_INTERVAL)
    }
}

impl ProgressClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            shared: Arc::new(ClockShared::default()),
            task: None,
        }
    }

    /// Reset the stopwatch and begin ticking.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&mut self, mut on_tick: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.cancel();
        *self.shared.stopwatch() = Stopwatch::default();
        self.shared.stopwatch().run();
        self.shared.ticking.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let period = self.period;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = f64::NEG_INFINITY;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !shared.ticking.load(Ordering::SeqCst) {
                            continue;
                        }
                        let seconds = shared.elapsed().as_secs_f64();
                        if seconds > last {
                            last = seconds;
                            on_tick(seconds);
                        }
                    }
                    _ = shared.resumed.notified() => ticker.reset_immediately(),
                }
            }
        }));
    }

    /// Stop emitting ticks and stop counting; accumulated time is kept
    pub fn suspend(&self) {
        self.shared.suspend();
    }

    /// Continue counting from the accumulated time and emit right away
    pub fn resume(&self) {
        if self.task.is_none() {
            return;
        }
        self.shared.stopwatch().run();
        self.shared.ticking.store(true, Ordering::SeqCst);
        self.shared.resumed.notify_one();
    }

    pub fn is_ticking(&self) -> bool {
        self.task.is_some() && self.shared.ticking.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.shared.elapsed()
    }

    pub fn handle(&self) -> ClockHandle {
        ClockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stop the tick task for good
    pub fn cancel(&mut self) {
        self.shared.suspend();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ProgressClock {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

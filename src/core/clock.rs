//! Clocks and tick sources
//!
//! - `Clock`: monotonic time, injectable so tests never sleep
//! - `FrameTimer`: per-frame wall-clock delta with a stall guard
//! - `Ticker`: fixed-cadence tick stream on a tokio interval

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::STALL_GUARD_SECS;

/// Monotonic time since an arbitrary origin
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Real time, origin at construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Test clock, moves only when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }
}

/// Wall-clock delta between sensor frames
///
/// The previous frame time is always recorded, so a dropped delta does not
/// leak into the next frame.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last: Option<Duration>,
    guard_secs: f64,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::with_guard(STALL_GUARD_SECS)
    }

    pub fn with_guard(guard_secs: f64) -> Self {
        Self { last: None, guard_secs }
    }

    /// Seconds since the previous frame; 0 for the first frame and after stalls
    pub fn delta(&mut self, now: Duration) -> f64 {
        let previous = self.last.replace(now);
        let Some(previous) = previous else {
            return 0.0;
        };
        let delta = now.saturating_sub(previous).as_secs_f64();
        if delta >= self.guard_secs {
            trace!(delta, guard = self.guard_secs, "frame delta dropped");
            0.0
        } else {
            delta
        }
    }

    /// Forget the previous frame (e.g. after the camera restarts)
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// One time-advance event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub seq: u64,
    pub delta_secs: f64,
}

/// Fixed-cadence tick source
///
/// Keeps ticking while the session is paused; the machine drops those ticks.
#[derive(Debug)]
pub struct Ticker {
    rx: mpsc::Receiver<Tick>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Ticker {
    /// Spawn the interval task. Must be called inside a tokio runtime.
    pub fn start(interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let delta_secs = interval.as_secs_f64();

        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick of a tokio interval is immediate
            timer.tick().await;

            let mut seq = 0u64;
            loop {
                timer.tick().await;
                seq += 1;
                if tx.send(Tick { seq, delta_secs }).await.is_err() {
                    break;
                }
            }
        });

        debug!(interval_ms = interval.as_millis() as u64, "ticker started");
        Self {
            rx,
            handle: Some(handle),
            interval,
        }
    }

    /// Next tick, `None` once stopped
    pub async fn next(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }

    /// Cancel future ticks. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            self.rx.close();
            debug!("ticker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

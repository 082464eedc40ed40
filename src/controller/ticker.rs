//! Pacing between poll cycles.

use crate::core::shutdown_flag;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

/// Granularity at which [`SleepTicker`] notices a shutdown request.
const SLICE: Duration = Duration::from_millis(250);

/// Waits between poll cycles.
pub trait Ticker {
    /// Wait one poll interval. Returns `false` once the loop must stop.
    fn wait(&mut self, interval: Duration) -> bool;
}

/// Wall-clock ticker, stopped by a shutdown flag.
#[derive(Debug)]
pub struct SleepTicker<'a> {
    shutdown: &'a AtomicBool,
}

impl SleepTicker<'static> {
    /// Watches the process-wide flag set on SIGINT/SIGTERM.
    pub fn new() -> Self {
        Self::with_flag(shutdown_flag())
    }
}

impl Default for SleepTicker<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SleepTicker<'a> {
    pub fn with_flag(shutdown: &'a AtomicBool) -> Self {
        Self { shutdown }
    }
}

impl Ticker for SleepTicker<'_> {
    fn wait(&mut self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLICE.min(deadline - now));
        }
    }
}

//! Invocation start limiter
//!
//! Workers ask the limiter for a permit right before launching an
//! invocation. Permits are handed out no closer together than the stagger
//! interval, so simultaneous workers never start their invocations in the
//! same instant. The limiter also counts in-flight and peak invocations.
//!
//! ```ignore
//! let limiter = Arc::new(LaunchLimiter::new(Duration::from_millis(100)));
//!
//! // in each worker
//! let _permit = limiter.acquire().await;
//! // invocation runs here...
//! // in-flight count drops when _permit goes out of scope
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct LaunchLimiter {
    stagger: Duration,
    /// Earliest instant the next permit may be granted
    next_slot: Mutex<Option<Instant>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    launched: AtomicUsize,
}

impl LaunchLimiter {
    pub fn new(stagger: Duration) -> Self {
        Self {
            stagger,
            next_slot: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            launched: AtomicUsize::new(0),
        }
    }

    /// Wait for the next start slot and take a permit
    pub async fn acquire(&self) -> LaunchPermit<'_> {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.stagger);
            slot
        };
        tokio::time::sleep_until(slot).await;

        self.launched.fetch_add(1, Ordering::Relaxed);
        let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_peak(current);

        LaunchPermit {
            in_flight: &self.in_flight,
        }
    }

    /// Updates the peak counter if current exceeds it.
    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_in_flight.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_flight.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    pub fn stagger(&self) -> Duration {
        self.stagger
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Highest number of simultaneous invocations observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Permits granted so far
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::Relaxed)
    }
}

/// Running-invocation marker; dropping it ends the invocation's slot
#[derive(Debug)]
pub struct LaunchPermit<'a> {
    in_flight: &'a AtomicUsize,
}

impl Drop for LaunchPermit<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

// canplayer/src/clock.rs
//
// Time sources for pacing and verification.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Time sources.
//!
//! The player only ever needs two things from time: the current instant,
//! and a way to suspend until some later one. Both are behind the [`Clock`]
//! trait so that a replay can be driven by the wall clock
//! ([`SystemClock`]) or by simulated time ([`ManualClock`]), which makes
//! dry runs and timing checks instantaneous.

use std::{
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

/// A monotonic time source that can suspend the caller.
pub trait Clock: Clone {
    /// Gets the current instant.
    fn now(&self) -> Instant;

    /// Suspends the caller for (at least) the specified duration.
    fn sleep(&self, dur: Duration);
}

/// The real, monotonic system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, dur: Duration) {
        if !dur.is_zero() {
            thread::sleep(dur);
        }
    }
}

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// A simulated clock.
///
/// Time only moves when someone sleeps on the clock or calls
/// [`advance`](ManualClock::advance); sleeping returns immediately. Clones
/// share the same timeline, so a clone handed to a replay can be inspected
/// afterwards.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    /// Creates a simulated clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Moves time forward without recording a sleep.
    pub fn advance(&self, dur: Duration) {
        self.with_state(|st| st.elapsed += dur)
    }

    /// The simulated time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.with_state(|st| st.elapsed)
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.with_state(|st| st.sleeps.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ManualState) -> T) -> T {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut st)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, dur: Duration) {
        self.with_state(|st| {
            st.elapsed = st.elapsed.saturating_add(dur);
            st.sleeps.push(dur);
        })
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        let t0 = clock.now();

        clock.sleep(Duration::from_millis(5));
        clock.advance(Duration::from_secs(1));

        let shared = clock.clone();
        shared.sleep(Duration::from_millis(10));

        assert_eq!(clock.now() - t0, Duration::from_millis(1015));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(5), Duration::from_millis(10)]
        );
    }

    #[test]
    fn test_system_clock_sleeps() {
        let clock = SystemClock;
        let t0 = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now() - t0 >= Duration::from_millis(2));
    }
}

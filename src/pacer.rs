// canplayer/src/pacer.rs
//
// Real-time pacing of recorded frames.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Real-time pacing of recorded frames.
//!
//! A [`Pacer`] wraps a source of timestamped items and yields them with the
//! same relative spacing they were recorded with. Two bounds apply to every
//! inter-frame delay:
//!
//! - `skip` caps the recorded delta, so a long pause in the recording
//!   (a logger left running overnight, say) is collapsed.
//! - `gap` is the minimum delay between any two emissions, so a burst of
//!   frames with (nearly) identical timestamps cannot flood the bus.
//!
//! That is, between frames recorded at `t1` and `t2` the pacer waits
//!
//! ```text
//! max(min(t2 - t1, skip), gap)
//! ```
//!
//! measured from the moment the previous item was emitted. With timestamps
//! disabled every delay is just `gap`. The first item is emitted at once.

use crate::{
    clock::{Clock, SystemClock},
    frame::Frame,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// The longest single sleep while a cancellation flag is being watched.
pub const CANCEL_POLL: Duration = Duration::from_millis(50);

/// An item carrying the time at which it was recorded.
pub trait Timestamped {
    /// The recorded time, in seconds, or `None` if the item should be
    /// passed along without pacing.
    fn timestamp(&self) -> Option<f64>;
}

impl Timestamped for Frame {
    fn timestamp(&self) -> Option<f64> {
        Some(Frame::timestamp(self))
    }
}

impl<T: Timestamped, E> Timestamped for Result<T, E> {
    fn timestamp(&self) -> Option<f64> {
        self.as_ref().ok().and_then(T::timestamp)
    }
}

/// Timing rules for a [`Pacer`]. All values are in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacerConfig {
    /// Honor the recorded timestamps. If false, only `gap` is applied.
    pub timestamps: bool,
    /// Minimum time between consecutive emissions.
    pub gap: f64,
    /// Maximum recorded delta that is reproduced.
    pub skip: f64,
}

impl PacerConfig {
    /// The delay to apply between frames recorded at `prev` and `next`.
    pub fn delay(&self, prev: f64, next: f64) -> Duration {
        let wait = if self.timestamps {
            (next - prev).min(self.skip).max(self.gap)
        } else {
            self.gap
        };
        secs_to_duration(wait)
    }
}

/// Converts a (possibly negative or non-finite) number of seconds into a
/// duration, clamping at zero.
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

/// An iterator adapter that releases items in real time.
///
/// The sequence is lazy and one-pass: it suspends on the clock only
/// while waiting for the next emission, and ends when the source does or
/// when the cancellation flag is raised.
#[derive(Debug)]
pub struct Pacer<I, C = SystemClock> {
    src: I,
    config: PacerConfig,
    clock: C,
    // recorded timestamp and emission instant of the previous item
    last: Option<(f64, Instant)>,
    cancel: Option<Arc<AtomicBool>>,
    done: bool,
}

impl<I: Iterator> Pacer<I, SystemClock> {
    /// Creates a pacer driven by the system clock.
    pub fn new<S>(src: S, config: PacerConfig) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Self::with_clock(src, config, SystemClock)
    }
}

impl<I: Iterator, C: Clock> Pacer<I, C> {
    /// Creates a pacer driven by the specified clock.
    pub fn with_clock<S>(src: S, config: PacerConfig, clock: C) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Self {
            src: src.into_iter(),
            config,
            clock,
            last: None,
            cancel: None,
            done: false,
        }
    }

    /// Ends the sequence as soon as `flag` is set, including in the middle
    /// of a wait.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Gets the timing rules of the pacer.
    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        matches!(&self.cancel, Some(flag) if flag.load(Ordering::SeqCst))
    }

    // Sleeps until `due`, or forever if it is past the end of time.
    // Returns false if cancelled first.
    fn wait_until(&self, due: Option<Instant>) -> bool {
        loop {
            let now = self.clock.now();
            let mut dur = match due {
                Some(due) if now >= due => return true,
                Some(due) => due - now,
                None => Duration::MAX,
            };
            if self.cancel.is_some() {
                dur = dur.min(CANCEL_POLL);
            }
            self.clock.sleep(dur);
            if self.is_cancelled() {
                return false;
            }
        }
    }
}

impl<I, C> Iterator for Pacer<I, C>
where
    I: Iterator,
    I::Item: Timestamped,
    C: Clock,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.is_cancelled() {
            self.done = true;
            return None;
        }

        let Some(item) = self.src.next() else {
            self.done = true;
            return None;
        };

        let Some(ts) = item.timestamp() else {
            return Some(item);
        };

        if let Some((prev_ts, prev_at)) = self.last {
            let due = prev_at.checked_add(self.config.delay(prev_ts, ts));
            if !self.wait_until(due) {
                self.done = true;
                return None;
            }
        }

        self.last = Some((ts, self.clock.now()));
        Some(item)
    }
}

/////////////////////////////////////////////////////////////////////////////

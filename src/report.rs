// canplayer/src/report.rs
//
// Progress reporting for a replay session.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Progress reporting.
//!
//! A replay session describes what it is doing as a stream of [`Event`]s
//! handed to a [`Reporter`] as they happen. The default, [`LogReporter`],
//! writes them through the [log](https://crates.io/crates/log) facade.

use crate::{frame::Frame, stats::Summary};
use log::{debug, info, warn};

/// Something that happened during a replay session.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// The session is about to send its first frame.
    Started,
    /// Stale frames were discarded from the receive buffer.
    Flushed {
        /// The number of frames discarded
        discarded: usize,
    },
    /// A frame was written to the bus.
    Sent(&'a Frame),
    /// A frame arrived that wasn't checked against anything.
    Received(&'a Frame),
    /// An error frame was dropped rather than forwarded.
    SkippedErrorFrame(&'a Frame),
    /// No echo of the sent frame arrived in time.
    EchoTimeout(&'a Frame),
    /// The echo did not match the frame that was sent.
    Mismatch {
        /// The frame that was sent
        sent: &'a Frame,
        /// The frame that came back
        received: &'a Frame,
    },
    /// The session is over; reported exactly once.
    Finished(&'a Summary),
}

/// A sink for replay progress events.
pub trait Reporter {
    /// Reports a single event.
    fn report(&mut self, event: &Event<'_>);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report(&mut self, event: &Event<'_>) {
        (**self).report(event)
    }
}

/// Reports events through the `log` facade.
///
/// Per-frame traffic is logged at `debug` level, timeouts and mismatches
/// as warnings, and the start and the summary at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, event: &Event<'_>) {
        use Event::*;
        match *event {
            Started => info!("Replay started"),
            Flushed { discarded } => debug!("Discarded {} stale frame(s)", discarded),
            Sent(frame) => debug!("{}", frame),
            Received(frame) => debug!("received {:X}", frame),
            SkippedErrorFrame(frame) => debug!("Skipping error frame: {}", frame),
            EchoTimeout(frame) => warn!("No echo for {}", frame),
            Mismatch { sent, received } => {
                warn!("Echo mismatch");
                warn!("  sent:     {}", sent);
                warn!("  received: {}", received);
            }
            Finished(summary) => {
                if summary.interrupted {
                    info!("Replay interrupted");
                }
                info!("{}", summary);
            }
        }
    }
}

/// A reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&mut self, _event: &Event<'_>) {}
}

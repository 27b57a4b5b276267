// canplayer/src/stats.rs
//
// Replay session statistics.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Replay session statistics.
//!
//! A session keeps running totals in a [`SessionStats`] that it owns, and
//! once at the end combines them with the [`BusStats`] snapshot of the bus
//! into a [`Summary`].

use crate::{bus::BusStats, replay::Verdict};
use std::{fmt, time::Duration};

/// Running totals of a replay session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames written to the bus.
    pub sent: u64,
    /// Echoes that matched the frame sent.
    pub matched: u64,
    /// Echoes that differed from the frame sent.
    pub mismatched: u64,
    /// Frames for which no echo arrived in time.
    pub timed_out: u64,
    /// Error frames that were not forwarded.
    pub skipped: u64,
}

impl SessionStats {
    /// Records a frame written to the bus, with its verification outcome
    /// if it was checked.
    pub fn record_sent(&mut self, verdict: Option<&Verdict>) {
        self.sent += 1;
        match verdict {
            Some(Verdict::Matched) => self.matched += 1,
            Some(Verdict::Mismatched(_)) => self.mismatched += 1,
            Some(Verdict::TimedOut) => self.timed_out += 1,
            None => (),
        }
    }

    /// Records an error frame that was dropped.
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }
}

/// The percentage of sent messages that came back wrong.
///
/// Zero when nothing was sent.
pub fn error_rate_pct(mismatched: u64, total_messages: u64) -> f64 {
    if total_messages == 0 {
        0.0
    } else {
        mismatched as f64 / total_messages as f64 * 100.0
    }
}

/// The percentage of the nominal bus bandwidth used by the bytes sent.
///
/// Zero when the bus has no uptime (or no bit rate).
pub fn bus_utilization_pct(total_bytes: u64, bitrate: u32, uptime: Duration) -> f64 {
    let capacity = bitrate as f64 / 8.0 * uptime.as_secs_f64();
    if capacity == 0.0 {
        0.0
    } else {
        total_bytes as f64 * 100.0 / capacity
    }
}

/// The final figures of a replay session.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Total messages sent, as counted by the bus.
    pub messages: u64,
    /// Echoes that differed from the frame sent.
    pub mismatched: u64,
    /// Frames for which no echo arrived in time.
    pub timed_out: u64,
    /// Error frames that were not forwarded.
    pub skipped: u64,
    /// Mismatches as a percentage of the messages sent.
    pub error_rate_pct: f64,
    /// Payload bytes sent as a percentage of the bus capacity over its
    /// uptime.
    pub bus_utilization_pct: f64,
    /// Whether the session was stopped by the operator.
    pub interrupted: bool,
}

impl Summary {
    /// Computes the summary from the session totals and a snapshot of the
    /// bus counters.
    pub fn new(stats: &SessionStats, bus: &BusStats, interrupted: bool) -> Self {
        debug_assert!(stats.mismatched <= stats.sent);
        Self {
            messages: bus.total_messages,
            mismatched: stats.mismatched,
            timed_out: stats.timed_out,
            skipped: stats.skipped,
            error_rate_pct: error_rate_pct(stats.mismatched, bus.total_messages),
            bus_utilization_pct: bus_utilization_pct(bus.total_bytes, bus.bitrate, bus.uptime),
            interrupted,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Error rate: {}%, total messages: {}, bus usage = {:.2}%",
            self.error_rate_pct, self.messages, self.bus_utilization_pct
        )
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use embedded_can::{Frame as EmbeddedFrame, StandardId};

    #[test]
    fn test_error_rate() {
        assert_eq!(error_rate_pct(0, 0), 0.0);
        assert_eq!(error_rate_pct(0, 10), 0.0);
        assert_eq!(error_rate_pct(1, 4), 25.0);
        assert_eq!(error_rate_pct(10, 10), 100.0);
    }

    #[test]
    fn test_bus_utilization() {
        assert_eq!(bus_utilization_pct(100, 500_000, Duration::ZERO), 0.0);
        assert_eq!(bus_utilization_pct(100, 0, Duration::from_secs(1)), 0.0);

        // 8000 bits/s is 1000 bytes/s
        let pct = bus_utilization_pct(250, 8000, Duration::from_secs(1));
        assert_eq!(pct, 25.0);

        let pct = bus_utilization_pct(1000, 8000, Duration::from_secs(4));
        assert_eq!(pct, 25.0);
    }

    #[test]
    fn test_tally() {
        let sent = Frame::new(StandardId::new(1).unwrap(), &[1]).unwrap();
        let mut stats = SessionStats::default();

        stats.record_sent(None);
        stats.record_sent(Some(&Verdict::Matched));
        stats.record_sent(Some(&Verdict::TimedOut));
        stats.record_sent(Some(&Verdict::Mismatched(sent)));
        stats.record_skipped();

        assert_eq!(stats.sent, 4);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.mismatched, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_empty_session_summary() {
        let summary = Summary::new(&SessionStats::default(), &BusStats::default(), false);

        assert_eq!(summary.messages, 0);
        assert_eq!(summary.error_rate_pct, 0.0);
        assert_eq!(summary.bus_utilization_pct, 0.0);
        assert_eq!(
            summary.to_string(),
            "Error rate: 0%, total messages: 0, bus usage = 0.00%"
        );
    }

    #[test]
    fn test_summary() {
        let stats = SessionStats {
            sent: 4,
            matched: 3,
            mismatched: 1,
            ..Default::default()
        };
        let bus = BusStats {
            total_messages: 4,
            total_bytes: 125,
            uptime: Duration::from_secs(2),
            bitrate: 1000,
        };

        let summary = Summary::new(&stats, &bus, true);
        assert!(summary.interrupted);
        assert_eq!(summary.error_rate_pct, 25.0);
        assert_eq!(summary.bus_utilization_pct, 50.0);
        assert_eq!(
            summary.to_string(),
            "Error rate: 25%, total messages: 4, bus usage = 50.00%"
        );
    }
}

// canplayer/src/bus.rs
//
// The bus a replay writes to and reads echoes from.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Bus connections.
//!
//! The player talks to a CAN bus through the [`Bus`] trait: it sends
//! frames, receives frames with a timeout, and at the end of a session asks
//! for a [`BusStats`] snapshot of the traffic counters.
//!
//! Two implementations are provided: [`SocketBus`](crate::SocketBus) for a
//! Linux SocketCAN interface, and [`VirtualBus`], an in-process bus that
//! loops every sent frame back to its own receive queue.

use crate::{frame::Frame, IoResult};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// The default nominal bit rate of a bus, in bits per second.
pub const DEFAULT_BITRATE: u32 = 500_000;

/// A connection to a CAN bus.
///
/// The connection is exclusively owned by one replay session and is
/// released when dropped.
pub trait Bus {
    /// Writes a single frame to the bus.
    ///
    /// Any error is a transport failure; it is not retried.
    fn send(&mut self, frame: &Frame) -> IoResult<()>;

    /// Waits up to `timeout` for a frame from the bus.
    ///
    /// A timeout is not an error; it returns `Ok(None)`.
    fn recv(&mut self, timeout: Duration) -> IoResult<Option<Frame>>;

    /// Gets a snapshot of the traffic counters.
    fn stats(&self) -> BusStats;
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn send(&mut self, frame: &Frame) -> IoResult<()> {
        (**self).send(frame)
    }

    fn recv(&mut self, timeout: Duration) -> IoResult<Option<Frame>> {
        (**self).recv(timeout)
    }

    fn stats(&self) -> BusStats {
        (**self).stats()
    }
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn send(&mut self, frame: &Frame) -> IoResult<()> {
        (**self).send(frame)
    }

    fn recv(&mut self, timeout: Duration) -> IoResult<Option<Frame>> {
        (**self).recv(timeout)
    }

    fn stats(&self) -> BusStats {
        (**self).stats()
    }
}

/// A read-only snapshot of the traffic on a bus connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// The number of frames successfully sent.
    pub total_messages: u64,
    /// The number of payload bytes successfully sent.
    pub total_bytes: u64,
    /// The time since the connection was opened.
    pub uptime: Duration,
    /// The nominal bit rate of the bus, in bits per second.
    pub bitrate: u32,
}

/// Traffic counters for a bus connection.
///
/// Counts the frames and payload bytes sent, and the time since the meter
/// was created.
#[derive(Debug, Clone)]
pub struct TrafficMeter {
    opened: Instant,
    bitrate: u32,
    total_messages: u64,
    total_bytes: u64,
}

impl TrafficMeter {
    /// Starts a meter for a bus with the specified nominal bit rate.
    pub fn new(bitrate: u32) -> Self {
        Self {
            opened: Instant::now(),
            bitrate,
            total_messages: 0,
            total_bytes: 0,
        }
    }

    /// Records a frame that was sent successfully.
    pub fn record(&mut self, frame: &Frame) {
        self.total_messages += 1;
        self.total_bytes += frame.len() as u64;
    }

    /// Gets a snapshot of the counters.
    pub fn snapshot(&self) -> BusStats {
        BusStats {
            total_messages: self.total_messages,
            total_bytes: self.total_bytes,
            uptime: self.opened.elapsed(),
            bitrate: self.bitrate,
        }
    }
}

impl Default for TrafficMeter {
    fn default() -> Self {
        Self::new(DEFAULT_BITRATE)
    }
}

// ===== VirtualBus =====

/// An in-process bus.
///
/// Every frame sent is echoed back into the bus' own receive queue, marked
/// as received, like a `vcan` interface with reception of own messages
/// turned on. Frames from other parties can be injected with
/// [`push_rx`](VirtualBus::push_rx).
///
/// Since nothing else can produce frames while the caller is blocked,
/// `recv` on an empty queue returns `None` at once instead of waiting out
/// the timeout.
///
/// The frames sent are only kept if asked for with
/// [`with_history`](VirtualBus::with_history).
#[derive(Debug, Clone)]
pub struct VirtualBus {
    echo: bool,
    rx: VecDeque<Frame>,
    history: Option<Vec<Frame>>,
    meter: TrafficMeter,
}

impl VirtualBus {
    /// Creates a virtual bus with the specified nominal bit rate.
    pub fn new(bitrate: u32) -> Self {
        Self {
            echo: true,
            rx: VecDeque::new(),
            history: None,
            meter: TrafficMeter::new(bitrate),
        }
    }

    /// Keeps a copy of every frame sent, for [`sent`](VirtualBus::sent).
    pub fn with_history(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    /// Enable or disable looping sent frames back to the receive queue.
    pub fn set_echo(&mut self, enabled: bool) {
        self.echo = enabled;
    }

    /// Queues a frame to be received.
    pub fn push_rx(&mut self, frame: Frame) {
        self.rx.push_back(frame.with_rx(true));
    }

    /// The frames sent so far, in order.
    ///
    /// Always empty unless the bus was created [`with_history`](VirtualBus::with_history).
    pub fn sent(&self) -> &[Frame] {
        self.history.as_deref().unwrap_or_default()
    }

    /// The number of frames waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new(DEFAULT_BITRATE)
    }
}

impl Bus for VirtualBus {
    fn send(&mut self, frame: &Frame) -> IoResult<()> {
        if let Some(history) = self.history.as_mut() {
            history.push(*frame);
        }
        self.meter.record(frame);
        if self.echo {
            self.push_rx(*frame);
        }
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> IoResult<Option<Frame>> {
        Ok(self.rx.pop_front())
    }

    fn stats(&self) -> BusStats {
        self.meter.snapshot()
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::{Frame as EmbeddedFrame, StandardId};

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn frame(id: u16, data: &[u8]) -> Frame {
        Frame::new(StandardId::new(id).unwrap(), data).unwrap()
    }

    #[test]
    fn test_meter() {
        let mut meter = TrafficMeter::new(250_000);
        meter.record(&frame(1, &[1, 2, 3]));
        meter.record(&frame(2, &[]));

        let stats = meter.snapshot();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.total_bytes, 3);
        assert_eq!(stats.bitrate, 250_000);
    }

    #[test]
    fn test_virtual_echo() {
        let mut bus = VirtualBus::default().with_history();
        assert!(bus.recv(TIMEOUT).unwrap().is_none());

        let sent = frame(0x42, &[1, 2, 3]);
        bus.send(&sent).unwrap();
        assert_eq!(bus.pending(), 1);

        let echo = bus.recv(TIMEOUT).unwrap().unwrap();
        assert!(echo.is_rx());
        assert!(echo.matches(&sent));
        assert!(bus.recv(TIMEOUT).unwrap().is_none());

        assert_eq!(bus.sent().len(), 1);
        assert_eq!(bus.stats().total_messages, 1);
        assert_eq!(bus.stats().total_bytes, 3);
    }

    #[test]
    fn test_virtual_no_echo() {
        let mut bus = VirtualBus::default();
        bus.set_echo(false);
        bus.send(&frame(0x42, &[1])).unwrap();
        assert!(bus.recv(TIMEOUT).unwrap().is_none());

        bus.push_rx(frame(0x43, &[2]));
        let rx = bus.recv(TIMEOUT).unwrap().unwrap();
        assert_eq!(rx.raw_id(), 0x43);
    }

    #[test]
    fn test_virtual_history_is_opt_in() {
        let mut bus = VirtualBus::default();
        for _ in 0..3 {
            bus.send(&frame(0x42, &[1, 2])).unwrap();
        }
        assert!(bus.sent().is_empty());
        assert_eq!(bus.stats().total_messages, 3);
        assert_eq!(bus.stats().total_bytes, 6);

        let mut bus = VirtualBus::default().with_history();
        bus.send(&frame(0x42, &[1, 2])).unwrap();
        assert_eq!(bus.sent().len(), 1);
    }

    #[test]
    fn test_bus_by_ref() {
        fn send_one<B: Bus>(mut bus: B) -> BusStats {
            bus.send(&frame(1, &[0; 8])).unwrap();
            bus.stats()
        }

        let mut bus = VirtualBus::default();
        let stats = send_one(&mut bus);
        assert_eq!(stats.total_bytes, 8);
        assert_eq!(bus.stats().total_messages, 1);
    }
}

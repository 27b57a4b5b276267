// canplayer/src/replay.rs
//
// The replay session: transmit, verify, and tally.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! The replay session.
//!
//! A [`Replayer`] takes frames from a source, paces them with a
//! [`Pacer`], and writes them to a [`Bus`] one at a time, strictly in
//! order. Each send completes (and in a loopback test, is verified) before
//! the next frame is paced.
//!
//! Outside of a loopback test, each send is followed by a short poll for
//! incoming traffic, which is only reported.
//!
//! In a loopback test, the receive buffer is first drained of stale
//! frames. Then, after each send, the session waits for the echo and
//! classifies it with a [`Verdict`]:
//!
//! - `Matched` - a frame came back with the same ID and data.
//! - `Mismatched` - a different frame came back. This counts as an error.
//! - `TimedOut` - nothing came back in time. This is reported, but isn't
//!   counted as an error.
//!
//! A session ends when the source runs out, when the stop flag is raised
//! (as by a Ctrl-C handler), or when the bus or the source fails. In every
//! case the statistics are computed and reported exactly once, as the last
//! event of the session.

use crate::{
    bus::Bus,
    clock::{Clock, SystemClock},
    config::{ConfigError, ReplayConfig},
    errors::{Error, SessionError},
    frame::Frame,
    pacer::Pacer,
    report::{Event, LogReporter, Reporter},
    stats::{SessionStats, Summary},
    IoResult,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// The outcome of checking the echo of a sent frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// The same frame came back.
    Matched,
    /// A different frame came back.
    Mismatched(Frame),
    /// Nothing came back in time.
    TimedOut,
}

impl Verdict {
    /// Classifies what was received after sending a frame.
    pub fn classify(sent: &Frame, received: Option<Frame>) -> Self {
        match received {
            None => Verdict::TimedOut,
            Some(rx) if rx.matches(sent) => Verdict::Matched,
            Some(rx) => Verdict::Mismatched(rx),
        }
    }

    /// Whether the echo matched.
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Matched)
    }
}

/// A replay session over a bus.
///
/// The bus is owned by the session (or borrowed, since `&mut B` is also a
/// [`Bus`]) and released when the session is dropped.
#[derive(Debug)]
pub struct Replayer<B, C = SystemClock, R = LogReporter> {
    bus: B,
    config: ReplayConfig,
    clock: C,
    reporter: R,
    stop: Arc<AtomicBool>,
}

impl<B: Bus> Replayer<B> {
    /// Creates a session that replays onto `bus` in real time and reports
    /// through the `log` facade.
    pub fn new(bus: B, config: ReplayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bus,
            config,
            clock: SystemClock,
            reporter: LogReporter,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl<B, C, R> Replayer<B, C, R>
where
    B: Bus,
    C: Clock,
    R: Reporter,
{
    /// Replaces the clock that drives pacing and pauses.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Replayer<B, C2, R> {
        Replayer {
            bus: self.bus,
            config: self.config,
            clock,
            reporter: self.reporter,
            stop: self.stop,
        }
    }

    /// Replaces the reporter that receives progress events.
    pub fn with_reporter<R2: Reporter>(self, reporter: R2) -> Replayer<B, C, R2> {
        Replayer {
            bus: self.bus,
            config: self.config,
            clock: self.clock,
            reporter,
            stop: self.stop,
        }
    }

    /// Uses an externally owned flag to stop the session.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Gets the flag that stops the session when set.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Gets the session configuration.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Gets a reference to the bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Gets a reference to the reporter.
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Ends the session, giving back the bus.
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Discards anything waiting in the receive buffer.
    ///
    /// Polls the bus until it has nothing more to give, or until the
    /// configured flush limit has passed, so a noisy bus can't hold up the
    /// session forever. Returns the number of frames discarded.
    pub fn flush(&mut self) -> IoResult<usize> {
        let start = self.clock.now();
        let mut discarded = 0;

        while self.clock.now().duration_since(start) < self.config.flush_limit {
            match self.bus.recv(self.config.poll_timeout)? {
                Some(_) => discarded += 1,
                None => break,
            }
        }
        Ok(discarded)
    }

    /// Sends a single frame and, in a loopback test, verifies its echo.
    ///
    /// Returns the verdict on the echo in a loopback test, or `None`
    /// otherwise. A failure to send or receive is returned as-is; it is
    /// never retried.
    pub fn transmit(&mut self, frame: &Frame) -> IoResult<Option<Verdict>> {
        self.bus.send(frame)?;
        self.reporter.report(&Event::Sent(frame));

        if !self.config.loopback_test {
            if let Some(rx) = self.bus.recv(self.config.poll_timeout)? {
                self.reporter.report(&Event::Received(&rx));
            }
            return Ok(None);
        }

        let received = self.bus.recv(self.config.echo_timeout)?;
        let verdict = Verdict::classify(frame, received);

        match verdict {
            Verdict::Matched => (),
            Verdict::TimedOut => self.reporter.report(&Event::EchoTimeout(frame)),
            Verdict::Mismatched(ref rx) => self.reporter.report(&Event::Mismatch {
                sent: frame,
                received: rx,
            }),
        }

        // give a loopback interface a moment to keep up
        self.clock.sleep(self.config.settle);
        Ok(Some(verdict))
    }

    /// Replays all the frames from `source`.
    ///
    /// The source yields frames in recorded order, or errors reading them.
    /// A source error, like a bus error, ends the session. The returned
    /// summary (or the one inside the error) has already been reported.
    pub fn run<S, E>(&mut self, source: S) -> Result<Summary, SessionError>
    where
        S: IntoIterator<Item = Result<Frame, E>>,
        Error: From<E>,
    {
        let mut stats = SessionStats::default();
        let res = self.replay(source, &mut stats);

        let interrupted = self.stop.load(Ordering::SeqCst);
        let summary = Summary::new(&stats, &self.bus.stats(), interrupted);
        self.reporter.report(&Event::Finished(&summary));

        match res {
            Ok(()) => Ok(summary),
            Err(source) => Err(SessionError { summary, source }),
        }
    }

    fn replay<S, E>(&mut self, source: S, stats: &mut SessionStats) -> Result<(), Error>
    where
        S: IntoIterator<Item = Result<Frame, E>>,
        Error: From<E>,
    {
        self.reporter.report(&Event::Started);

        if self.config.loopback_test {
            let discarded = self.flush()?;
            self.reporter.report(&Event::Flushed { discarded });
        }

        let frames = Pacer::with_clock(source, self.config.pacing(), self.clock.clone())
            .with_cancel(Arc::clone(&self.stop));

        for item in frames {
            let frame = item?;

            if frame.is_error_frame() && !self.config.error_frames {
                stats.record_skipped();
                self.reporter.report(&Event::SkippedErrorFrame(&frame));
                continue;
            }

            let verdict = self.transmit(&frame)?;
            stats.record_sent(verdict.as_ref());
        }
        Ok(())
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::VirtualBus, clock::ManualClock, report::NullReporter};
    use embedded_can::{Frame as EmbeddedFrame, StandardId};
    use std::time::Duration;

    fn frame(id: u16, data: &[u8]) -> Frame {
        Frame::new(StandardId::new(id).unwrap(), data).unwrap()
    }

    // Counts the events of interest
    #[derive(Default)]
    struct Tally {
        timeouts: usize,
        mismatches: usize,
        received: usize,
        finished: usize,
    }

    impl Reporter for Tally {
        fn report(&mut self, event: &Event<'_>) {
            match event {
                Event::EchoTimeout(_) => self.timeouts += 1,
                Event::Mismatch { .. } => self.mismatches += 1,
                Event::Received(_) => self.received += 1,
                Event::Finished(_) => self.finished += 1,
                _ => (),
            }
        }
    }

    fn session(bus: VirtualBus, config: ReplayConfig) -> Replayer<VirtualBus, ManualClock, Tally> {
        Replayer::new(bus, config)
            .unwrap()
            .with_clock(ManualClock::new())
            .with_reporter(Tally::default())
    }

    #[test]
    fn test_classify() {
        let sent = frame(42, &[1, 2, 3]);

        assert_eq!(Verdict::classify(&sent, None), Verdict::TimedOut);
        assert!(Verdict::classify(&sent, Some(frame(42, &[1, 2, 3]))).is_match());

        let rx = frame(42, &[9, 9, 9]);
        assert_eq!(Verdict::classify(&sent, Some(rx)), Verdict::Mismatched(rx));

        let rx = frame(41, &[1, 2, 3]);
        assert_eq!(Verdict::classify(&sent, Some(rx)), Verdict::Mismatched(rx));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = ReplayConfig::default().with_gap(-1.0);
        assert!(Replayer::new(VirtualBus::default(), cfg).is_err());
    }

    #[test]
    fn test_transmit_plain_polls() {
        let mut s = session(VirtualBus::default().with_history(), ReplayConfig::default());

        assert_eq!(s.transmit(&frame(1, &[1])).unwrap(), None);
        // the virtual bus echoes; outside a test it's only reported
        assert_eq!(s.reporter().received, 1);
        assert_eq!(s.bus().sent().len(), 1);
    }

    #[test]
    fn test_transmit_loopback_match() {
        let cfg = ReplayConfig::default().with_loopback_test(true);
        let clock = ManualClock::new();
        let mut s = session(VirtualBus::default(), cfg).with_clock(clock.clone());

        let verdict = s.transmit(&frame(42, &[1, 2, 3])).unwrap();
        assert_eq!(verdict, Some(Verdict::Matched));
        assert_eq!(s.reporter().mismatches, 0);
        assert_eq!(s.reporter().timeouts, 0);

        // settle pause after the check
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(5)]);
    }

    #[test]
    fn test_transmit_loopback_timeout() {
        let mut bus = VirtualBus::default();
        bus.set_echo(false);
        let cfg = ReplayConfig::default().with_loopback_test(true);
        let clock = ManualClock::new();
        let mut s = session(bus, cfg).with_clock(clock.clone());

        let verdict = s.transmit(&frame(42, &[1, 2, 3])).unwrap();
        assert_eq!(verdict, Some(Verdict::TimedOut));
        assert_eq!(s.reporter().timeouts, 1);
        assert_eq!(s.reporter().mismatches, 0);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(5)]);
    }

    #[test]
    fn test_flush_discards_stale() {
        let mut bus = VirtualBus::default();
        bus.push_rx(frame(1, &[]));
        bus.push_rx(frame(2, &[]));

        let cfg = ReplayConfig::default().with_loopback_test(true);
        let mut s = session(bus, cfg);

        assert_eq!(s.flush().unwrap(), 2);
        assert_eq!(s.bus().pending(), 0);
        assert_eq!(s.flush().unwrap(), 0);
    }

    #[test]
    fn test_run_reports_summary_once() {
        let frames = vec![frame(1, &[1]), frame(2, &[2, 2])];
        let mut s = Replayer::new(VirtualBus::default(), ReplayConfig::default())
            .unwrap()
            .with_clock(ManualClock::new())
            .with_reporter(Tally::default());

        let summary = s.run(frames.into_iter().map(Ok::<_, Error>)).unwrap();
        assert_eq!(summary.messages, 2);
        assert!(!summary.interrupted);
        assert_eq!(s.reporter().finished, 1);
    }

    #[test]
    fn test_run_with_null_reporter() {
        let mut bus = VirtualBus::default().with_history();
        let summary = Replayer::new(&mut bus, ReplayConfig::default())
            .unwrap()
            .with_clock(ManualClock::new())
            .with_reporter(NullReporter)
            .run(Vec::<Result<Frame, Error>>::new())
            .unwrap();

        assert_eq!(summary.messages, 0);
        assert_eq!(summary.error_rate_pct, 0.0);
        assert!(bus.sent().is_empty());
    }
}

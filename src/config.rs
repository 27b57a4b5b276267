// canplayer/src/config.rs
//
// Replay session configuration.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Replay session configuration.

use crate::pacer::PacerConfig;
use std::time::Duration;
use thiserror::Error;

/// The default minimum time between frames, in seconds.
pub const DEFAULT_GAP: f64 = 0.0001;

/// The default longest reproduced pause, in seconds (one day).
pub const DEFAULT_SKIP: f64 = 60.0 * 60.0 * 24.0;

/// How long to wait for the echo of each frame in a loopback test.
pub const DEFAULT_ECHO_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to poll for incoming frames after each send, outside of a
/// loopback test, and while flushing.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// The pause after each frame in a loopback test.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(5);

/// The longest time spent discarding stale frames before a loopback test.
pub const DEFAULT_FLUSH_LIMIT: Duration = Duration::from_secs(2);

/// Invalid configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The minimum gap is negative or not a number
    #[error("Invalid gap: {0} (must be a non-negative number of seconds)")]
    InvalidGap(f64),
    /// The skip ceiling is negative or not a number
    #[error("Invalid skip: {0} (must be a non-negative number of seconds)")]
    InvalidSkip(f64),
    /// The echo timeout is zero
    #[error("The echo timeout must be non-zero")]
    ZeroEchoTimeout,
}

/// Configuration of a replay session.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayConfig {
    /// Reproduce the recorded spacing between frames. If false, frames
    /// are sent `gap` apart.
    pub timestamps: bool,
    /// Minimum time between frames, in seconds.
    pub gap: f64,
    /// Recorded pauses longer than this are shortened to it, in seconds.
    pub skip: f64,
    /// Forward error frames to the bus. They are dropped otherwise.
    pub error_frames: bool,
    /// Check that every frame sent is received back unchanged.
    pub loopback_test: bool,
    /// How long to wait for an echo in a loopback test.
    pub echo_timeout: Duration,
    /// How long to poll for incoming frames otherwise.
    pub poll_timeout: Duration,
    /// Pause after each frame in a loopback test.
    pub settle: Duration,
    /// Upper bound on flushing the receive buffer before a loopback test.
    pub flush_limit: Duration,
}

impl ReplayConfig {
    /// Enable or disable honoring the recorded timestamps.
    pub fn with_timestamps(mut self, on: bool) -> Self {
        self.timestamps = on;
        self
    }

    /// Sets the minimum gap between frames, in seconds.
    pub fn with_gap(mut self, gap: f64) -> Self {
        self.gap = gap;
        self
    }

    /// Sets the longest reproduced pause, in seconds.
    pub fn with_skip(mut self, skip: f64) -> Self {
        self.skip = skip;
        self
    }

    /// Enable or disable forwarding error frames.
    pub fn with_error_frames(mut self, on: bool) -> Self {
        self.error_frames = on;
        self
    }

    /// Enable or disable the loopback test.
    pub fn with_loopback_test(mut self, on: bool) -> Self {
        self.loopback_test = on;
        self
    }

    /// The timing rules for the pacer.
    pub fn pacing(&self) -> PacerConfig {
        PacerConfig {
            timestamps: self.timestamps,
            gap: self.gap,
            skip: self.skip,
        }
    }

    /// The time to wait for a frame after each send.
    pub fn response_timeout(&self) -> Duration {
        if self.loopback_test {
            self.echo_timeout
        } else {
            self.poll_timeout
        }
    }

    /// Checks that the configuration can drive a replay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gap.is_finite() && self.gap >= 0.0) {
            return Err(ConfigError::InvalidGap(self.gap));
        }
        // An infinite skip simply never shortens anything
        if self.skip.is_nan() || self.skip < 0.0 {
            return Err(ConfigError::InvalidSkip(self.skip));
        }
        if self.echo_timeout.is_zero() {
            return Err(ConfigError::ZeroEchoTimeout);
        }
        Ok(())
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            timestamps: true,
            gap: DEFAULT_GAP,
            skip: DEFAULT_SKIP,
            error_frames: false,
            loopback_test: false,
            echo_timeout: DEFAULT_ECHO_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            settle: DEFAULT_SETTLE,
            flush_limit: DEFAULT_FLUSH_LIMIT,
        }
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ReplayConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.timestamps);
        assert!(!cfg.error_frames);
        assert!(!cfg.loopback_test);
        assert_eq!(cfg.response_timeout(), DEFAULT_POLL_TIMEOUT);

        let cfg = cfg.with_loopback_test(true);
        assert_eq!(cfg.response_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_pacing() {
        let cfg = ReplayConfig::default()
            .with_timestamps(false)
            .with_gap(0.5)
            .with_skip(3.0);
        let pacing = cfg.pacing();

        assert!(!pacing.timestamps);
        assert_eq!(pacing.gap, 0.5);
        assert_eq!(pacing.skip, 3.0);
    }

    #[test]
    fn test_validate() {
        let cfg = ReplayConfig::default();

        assert_eq!(
            cfg.clone().with_gap(-1.0).validate(),
            Err(ConfigError::InvalidGap(-1.0))
        );
        assert!(cfg.clone().with_gap(f64::NAN).validate().is_err());
        assert_eq!(
            cfg.clone().with_skip(-0.1).validate(),
            Err(ConfigError::InvalidSkip(-0.1))
        );
        assert!(cfg.clone().with_skip(f64::INFINITY).validate().is_ok());
        assert!(cfg.clone().with_gap(0.0).with_skip(0.0).validate().is_ok());

        let mut cfg = cfg;
        cfg.echo_timeout = Duration::ZERO;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroEchoTimeout));
    }
}

// canplayer/src/errors.rs
//
// Implements errors for the Rust 'canplayer' library.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Replay errors.
//!
//! Only two things end a replay early: a frame that could not be written
//! to (or read from) the bus, and a record in the log that could not be
//! parsed. Missing or mismatched echoes are not errors; they are reported
//! and counted in the session statistics. An invalid
//! [`ConfigError`](crate::ConfigError) prevents a session from being
//! created at all.

use crate::stats::Summary;
use std::{convert::Infallible, io};
use thiserror::Error;

#[cfg(feature = "dump")]
use crate::dump::ParseError;

/// A fatal replay error.
#[derive(Error, Debug)]
pub enum Error {
    /// The bus failed to send or receive a frame
    #[error("Bus transport error")]
    Transport(#[from] io::Error),
    /// The frame source could not be read
    #[cfg(feature = "dump")]
    #[error("Error reading frame source")]
    Source(#[from] ParseError),
}

impl From<Infallible> for Error {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}

/// A replay session that ended with a fatal error.
///
/// The session statistics were still computed and reported; they cover
/// all the frames sent before the failure.
#[derive(Error, Debug)]
#[error("Replay aborted")]
pub struct SessionError {
    /// The statistics of the frames sent before the failure
    pub summary: Summary,
    /// The error that ended the session
    #[source]
    pub source: Error,
}

/// A result type for replay operations.
pub type Result<T> = std::result::Result<T, Error>;

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_session_error_chain() {
        let err = SessionError {
            summary: Summary::default(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "link down").into(),
        };

        // each message in the chain is only shown once
        assert_eq!(err.to_string(), "Replay aborted");
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "Bus transport error");
        assert_eq!(source.source().unwrap().to_string(), "link down");
    }
}

// canplayer/src/lib.rs
//
// The main lib file for the Rust 'canplayer' library.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Replay of recorded CAN traffic.
//!
//! This crate takes frames recorded in a `candump` log and plays them back
//! onto a CAN bus, reproducing the recorded spacing between frames as
//! closely as the host allows. It can optionally verify that every frame
//! sent comes back unchanged from the bus (a loopback test), and reports
//! the error rate and bus utilization of the session when it's over.
//!
//! # Pacing
//!
//! Recorded timestamps are reproduced relative to each other, never
//! relative to the wall clock. Two bounds shape every delay between
//! frames: long pauses in the recording are shortened to at most `skip`
//! seconds, and no two frames go out closer than `gap` seconds apart. See
//! [`Pacer`].
//!
//! # Buses
//!
//! The player writes to anything that implements [`Bus`]. On Linux the
//! [`SocketBus`] drives a SocketCAN interface (see
//! <https://www.kernel.org/doc/Documentation/networking/can.txt>), like
//! `can0` or a virtual `vcan0`. The in-process [`VirtualBus`] loops frames
//! back to itself, and needs no interface at all.
//!
//! # Sessions
//!
//! A [`Replayer`] owns the bus for the length of a session. The session
//! ends when the source runs out, when its stop flag is raised, or on the
//! first transport error. Whichever way it ends, the [`Summary`] is
//! computed and reported exactly once.
//!
//! ```no_run
//! use canplayer::{dump::Reader, ReplayConfig, Replayer, SocketBus};
//!
//! let bus = SocketBus::open("vcan0", 500_000)?;
//! let frames = Reader::from_file("candump.log")?.frames();
//!
//! let config = ReplayConfig::default().with_loopback_test(true);
//! let summary = Replayer::new(bus, config)?.run(frames)?;
//! println!("{}", summary);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export the embedded_can crate so that applications can rely on
// finding the same version we use.
pub use embedded_can::{self, ExtendedId, Frame as EmbeddedFrame, Id, StandardId};

pub mod addr;
pub use addr::CanAddr;

pub mod bus;
pub use bus::{Bus, BusStats, TrafficMeter, VirtualBus};

pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

pub mod config;
pub use config::{ConfigError, ReplayConfig};

#[cfg(feature = "dump")]
pub mod dump;

pub mod errors;
pub use errors::{Error, Result, SessionError};

pub mod frame;
pub use frame::Frame;

pub mod id;
pub use id::IdFlags;

pub mod pacer;
pub use pacer::{Pacer, PacerConfig, Timestamped};

pub mod replay;
pub use replay::{Replayer, Verdict};

pub mod report;
pub use report::{Event, LogReporter, NullReporter, Reporter};

pub mod socket;
pub use socket::{CanSocket, ShouldRetry, SocketBus, SocketOptions};

pub mod stats;
pub use stats::{SessionStats, Summary};

pub mod util;

/// An I/O error.
pub type IoError = std::io::Error;

/// The kind of an I/O error.
pub type IoErrorKind = std::io::ErrorKind;

/// An I/O result.
pub type IoResult<T> = std::io::Result<T>;

// ===== Private local helper functions =====

/// Gets a byte slice for any sized variable.
///
/// Only used on plain C structs that are handed to the kernel.
pub(crate) fn as_bytes<T: Sized>(val: &T) -> &[u8] {
    let sz = std::mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts::<'_, u8>(val as *const _ as *const u8, sz) }
}

/// Gets a mutable byte slice for any sized variable.
pub(crate) fn as_bytes_mut<T: Sized>(val: &mut T) -> &mut [u8] {
    let sz = std::mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts_mut(val as *mut _ as *mut u8, sz) }
}

// canplayer/src/socket.rs
//
// Implements a raw CANbus 2.0 socket for SocketCAN on Linux.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Raw SocketCAN sockets, and the [`Bus`] built on them.

use crate::{
    addr::CanAddr,
    as_bytes, as_bytes_mut,
    bus::{Bus, BusStats, TrafficMeter},
    frame::{can_frame_default, Frame},
    util::timestamp_now,
    IoError, IoErrorKind, IoResult,
};
use libc::{socklen_t, AF_CAN, EINPROGRESS};
use socket2::SockAddr;
use std::{
    fmt,
    io::{Read, Write},
    mem,
    os::{
        raw::{c_int, c_void},
        unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd},
    },
    ptr,
    time::Duration,
};

pub use libc::{
    CAN_RAW, CAN_RAW_FILTER, CAN_RAW_LOOPBACK, CAN_RAW_RECV_OWN_MSGS,
    SOL_CAN_BASE, SOL_CAN_RAW,
};

/// The shortest read timeout that can be put on a socket.
/// A zero timeout would mean "block forever".
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Check an error return value for timeouts.
///
/// Due to the fact that timeouts are reported as errors, calling `read_frame`
/// on a socket with a timeout that does not receive a frame in time will
/// result in an error being returned. This trait adds a `should_retry` method
/// to `Error` and `Result` to check for this condition.
pub trait ShouldRetry {
    /// Check for timeout
    ///
    /// If `true`, the error is probably due to a timeout.
    fn should_retry(&self) -> bool;
}

impl ShouldRetry for IoError {
    fn should_retry(&self) -> bool {
        match self.kind() {
            // EAGAIN, EINPROGRESS and EWOULDBLOCK are the three possible codes
            // returned when a timeout occurs. the stdlib already maps EAGAIN
            // and EWOULDBLOCK os WouldBlock
            IoErrorKind::WouldBlock | IoErrorKind::TimedOut => true,
            // however, EINPROGRESS is also valid
            IoErrorKind::Other => {
                matches!(self.raw_os_error(), Some(errno) if errno == EINPROGRESS)
            }
            _ => false,
        }
    }
}

impl<E: fmt::Debug> ShouldRetry for IoResult<E> {
    fn should_retry(&self) -> bool {
        match *self {
            Err(ref e) => e.should_retry(),
            _ => false,
        }
    }
}

// ===== Private local helper functions =====

/// Tries to open the CAN socket by the interface number.
fn raw_open_socket(addr: &CanAddr) -> IoResult<socket2::Socket> {
    let af_can = socket2::Domain::from(AF_CAN);
    let can_raw = socket2::Protocol::from(CAN_RAW);

    let sock = socket2::Socket::new_raw(af_can, socket2::Type::RAW, Some(can_raw))?;
    sock.bind(&SockAddr::from(*addr))?;
    Ok(sock)
}

// ===== SocketOptions =====

/// Traits for setting CAN socket options.
pub trait SocketOptions: AsRawFd {
    /// Sets an option on the socket.
    ///
    /// A type-safe wrapper around libc `setsockopt`. Note that the `val`
    /// parameter must be specified correctly; if an option expects an
    /// integer, pass in a `c_int`, not the default of `i32`.
    fn set_socket_option<T>(&self, level: c_int, name: c_int, val: &T) -> IoResult<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                level,
                name,
                val as *const _ as *const c_void,
                mem::size_of::<T>() as socklen_t,
            )
        };

        match ret {
            0 => Ok(()),
            _ => Err(IoError::last_os_error()),
        }
    }

    /// Disable reception of CAN frames.
    ///
    /// Sets a completely empty filter; disabling all CAN frame reception.
    fn set_filter_drop_all(&self) -> IoResult<()> {
        // can't pass in a ptr to a 0-len slice, pass a null ptr instead
        let ret = unsafe {
            libc::setsockopt(self.as_raw_fd(), SOL_CAN_RAW, CAN_RAW_FILTER, ptr::null(), 0)
        };

        match ret {
            0 => Ok(()),
            _ => Err(IoError::last_os_error()),
        }
    }

    /// Enable or disable loopback.
    ///
    /// By default, loopback is enabled, causing other applications that open
    /// the same CAN bus to see frames emitted by different applications on
    /// the same system.
    fn set_loopback(&self, enabled: bool) -> IoResult<()> {
        let loopback = c_int::from(enabled);
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_LOOPBACK, &loopback)
    }

    /// Enable or disable receiving of own frames.
    ///
    /// When loopback is enabled, this settings controls if CAN frames sent
    /// are received back immediately by sender. Default is off.
    fn set_recv_own_msgs(&self, enabled: bool) -> IoResult<()> {
        let recv_own_msgs = c_int::from(enabled);
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_RECV_OWN_MSGS, &recv_own_msgs)
    }
}

// ===== CanSocket =====

/// A socket for classic CAN 2.0 devices.
///
/// This reads and writes classic CAN 2.0 frames, with up to 8 bytes of
/// data per frame. It wraps a Linux socket descriptor to a Raw SocketCAN
/// socket.
///
/// The socket is automatically closed when the object is dropped.
#[allow(missing_copy_implementations)]
#[derive(Debug)]
pub struct CanSocket(socket2::Socket);

impl CanSocket {
    /// Open a named CAN device, such as "can0" or "vcan0".
    pub fn open(ifname: &str) -> IoResult<Self> {
        let addr = CanAddr::from_iface(ifname)?;
        Self::open_addr(&addr)
    }

    /// Open a CAN socket by address.
    pub fn open_addr(addr: &CanAddr) -> IoResult<Self> {
        let sock = raw_open_socket(addr)?;
        Ok(Self(sock))
    }

    /// Gets a shared reference to the underlying socket object
    pub fn as_raw_socket(&self) -> &socket2::Socket {
        &self.0
    }

    /// Sets the read timeout on the socket
    ///
    /// For convenience, the result value can be checked using
    /// `ShouldRetry::should_retry` when a timeout is set.
    pub fn set_read_timeout<D>(&self, duration: D) -> IoResult<()>
    where
        D: Into<Option<Duration>>,
    {
        self.0.set_read_timeout(duration.into())
    }

    /// Reads a low-level libc `can_frame` from the socket.
    pub fn read_raw_frame(&self) -> IoResult<libc::can_frame> {
        let mut frame = can_frame_default();
        self.as_raw_socket().read_exact(as_bytes_mut(&mut frame))?;
        Ok(frame)
    }

    /// Blocking read a single can frame.
    ///
    /// The frame is marked as received and stamped with the current time.
    pub fn read_frame(&self) -> IoResult<Frame> {
        let raw = self.read_raw_frame()?;
        Frame::from_raw(&raw)
            .map(|frame| frame.with_rx(true).with_timestamp(timestamp_now()))
            .ok_or_else(|| IoError::new(IoErrorKind::InvalidData, "malformed CAN frame"))
    }

    /// Writes a single CAN 2.0 frame to the socket.
    pub fn write_frame(&self, frame: &Frame) -> IoResult<()> {
        let raw = frame.to_raw();
        self.as_raw_socket().write_all(as_bytes(&raw))
    }
}

impl SocketOptions for CanSocket {}

impl AsRawFd for CanSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for CanSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

// ===== SocketBus =====

/// A [`Bus`] on a SocketCAN interface.
#[derive(Debug)]
pub struct SocketBus {
    sock: CanSocket,
    meter: TrafficMeter,
    // the read timeout currently set on the socket
    rx_timeout: Option<Duration>,
}

impl SocketBus {
    /// Opens the named interface, like "can0" or "vcan0".
    ///
    /// The `bitrate` is the nominal rate of the bus, in bits per second,
    /// used for the utilization figure.
    pub fn open(ifname: &str, bitrate: u32) -> IoResult<Self> {
        Ok(Self::from_socket(CanSocket::open(ifname)?, bitrate))
    }

    /// Wraps an already opened socket.
    pub fn from_socket(sock: CanSocket, bitrate: u32) -> Self {
        Self {
            sock,
            meter: TrafficMeter::new(bitrate),
            rx_timeout: None,
        }
    }

    /// Enable or disable receiving the frames this bus sends.
    ///
    /// This lets a loopback test run against a single virtual interface.
    pub fn set_receive_own_messages(&self, enabled: bool) -> IoResult<()> {
        self.sock.set_loopback(true)?;
        self.sock.set_recv_own_msgs(enabled)
    }

    /// Gets the underlying socket.
    pub fn socket(&self) -> &CanSocket {
        &self.sock
    }
}

impl Bus for SocketBus {
    fn send(&mut self, frame: &Frame) -> IoResult<()> {
        self.sock.write_frame(frame)?;
        self.meter.record(frame);
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> IoResult<Option<Frame>> {
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        if self.rx_timeout != Some(timeout) {
            self.sock.set_read_timeout(timeout)?;
            self.rx_timeout = Some(timeout);
        }

        match self.sock.read_frame() {
            Ok(frame) => Ok(Some(frame)),
            Err(err) if err.should_retry() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn stats(&self) -> BusStats {
        self.meter.snapshot()
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry() {
        let err = IoError::from(IoErrorKind::WouldBlock);
        assert!(err.should_retry());

        let err = IoError::from(IoErrorKind::TimedOut);
        assert!(err.should_retry());

        let res: IoResult<()> = Err(IoError::from(IoErrorKind::BrokenPipe));
        assert!(!res.should_retry());

        let res: IoResult<()> = Ok(());
        assert!(!res.should_retry());
    }
}

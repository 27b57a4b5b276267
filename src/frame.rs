// canplayer/src/frame.rs
//
// Implements the recorded CANbus 2.0 frame.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN bus frames.
//!
//! A [`Frame`] is a single classic CAN 2.0 message as it moves through the
//! player: read from a log, paced, written to the bus, and possibly read
//! back again as an echo. Besides the identifier and up to 8 bytes of data
//! it carries the flags needed to decide what to do with it:
//!
//! - whether it is a remote request or an error frame,
//! - whether it was received (`rx`) or is to be sent,
//! - the time at which it was recorded, in seconds since an arbitrary
//!   epoch.
//!
//! At the lowest level, [libc](https://crates.io/crates/libc) defines the
//! binary [can_frame](https://docs.rs/libc/latest/libc/struct.can_frame.html)
//! exchanged with the kernel. Frames convert to and from it with
//! [`Frame::to_raw`] and [`Frame::from_raw`].

use crate::id::{id_is_extended, id_raw, id_to_canid_t, split_id_word, IdFlags, CAN_MAX_DLEN};
use embedded_can::{ExtendedId, Frame as EmbeddedFrame, Id};
use itertools::Itertools;
use libc::{can_frame, canid_t};
use std::{fmt, mem};

/// Creates a default C `can_frame`.
/// This initializes the entire structure to zeros.
#[inline(always)]
pub fn can_frame_default() -> can_frame {
    unsafe { mem::zeroed() }
}

/// A classic CAN 2.0 frame along with its replay metadata.
///
/// Frames are immutable once created; the `with_*` methods return an
/// updated copy.
#[derive(Clone, Copy, PartialEq)]
pub struct Frame {
    timestamp: f64,
    id: Id,
    flags: IdFlags,
    dlc: u8,
    data: [u8; CAN_MAX_DLEN],
    rx: bool,
}

impl Frame {
    /// Creates an error frame.
    ///
    /// The `class` is the error class mask that SocketCAN places in the
    /// identifier bits of an error frame.
    pub fn new_error(class: u32, data: &[u8]) -> Option<Self> {
        let id = ExtendedId::new(class)?;
        let mut frame = Self::new(id, data)?;
        frame.flags |= IdFlags::ERR;
        Some(frame)
    }

    /// Returns a copy of the frame with the recorded timestamp set.
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns a copy of the frame marked as received (`true`) or to be
    /// sent (`false`).
    pub fn with_rx(mut self, rx: bool) -> Self {
        self.rx = rx;
        self
    }

    /// The recorded time of the frame, in seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Whether the frame was received from a bus.
    pub fn is_rx(&self) -> bool {
        self.rx
    }

    /// Check if frame is an error message
    pub fn is_error_frame(&self) -> bool {
        self.flags.contains(IdFlags::ERR)
    }

    /// Return the actual raw CAN ID (without EFF/RTR/ERR flags)
    pub fn raw_id(&self) -> canid_t {
        id_raw(&self.id)
    }

    /// Get the composite SocketCAN ID word, with EFF/RTR/ERR flags
    pub fn id_word(&self) -> canid_t {
        let word = id_to_canid_t(self.id) | self.flags.bits();
        if self.is_error_frame() {
            // error frames never carry the EFF bit
            word & !IdFlags::EFF.bits()
        } else {
            word
        }
    }

    /// The number of payload bytes carried on the wire.
    ///
    /// Remote frames request data without carrying any, so they count as
    /// empty here even though they report a DLC.
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Whether the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Determines if this frame is an echo of `sent`.
    ///
    /// Only the numeric identifier and the payload are compared; the
    /// identifier width, direction and timestamps are ignored.
    pub fn matches(&self, sent: &Frame) -> bool {
        self.raw_id() == sent.raw_id() && self.data() == sent.data()
    }

    /// Converts the frame into the C `can_frame` written to a socket.
    pub fn to_raw(&self) -> can_frame {
        let mut frame = can_frame_default();
        frame.can_id = self.id_word();
        frame.can_dlc = self.dlc;
        frame.data[..self.len()].copy_from_slice(self.data());
        frame
    }

    /// Creates a frame from a C `can_frame` read from a socket.
    ///
    /// Returns `None` if the frame has an invalid identifier or length.
    pub fn from_raw(frame: &can_frame) -> Option<Self> {
        let (id, flags) = split_id_word(frame.can_id)?;
        let dlc = frame.can_dlc as usize;
        if dlc > CAN_MAX_DLEN {
            return None;
        }
        let mut data = [0u8; CAN_MAX_DLEN];
        if !flags.contains(IdFlags::RTR) {
            data[..dlc].copy_from_slice(&frame.data[..dlc]);
        }
        Some(Self {
            timestamp: 0.0,
            id,
            flags: flags & (IdFlags::RTR | IdFlags::ERR),
            dlc: dlc as u8,
            data,
            rx: false,
        })
    }
}

impl EmbeddedFrame for Frame {
    /// Create a new CAN 2.0 data frame
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > CAN_MAX_DLEN {
            return None;
        }
        let mut buf = [0u8; CAN_MAX_DLEN];
        buf[..data.len()].copy_from_slice(data);
        Some(Self {
            timestamp: 0.0,
            id: id.into(),
            flags: IdFlags::empty(),
            dlc: data.len() as u8,
            data: buf,
            rx: false,
        })
    }

    /// Create a new remote transmission request frame.
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > CAN_MAX_DLEN {
            return None;
        }
        Some(Self {
            timestamp: 0.0,
            id: id.into(),
            flags: IdFlags::RTR,
            dlc: dlc as u8,
            data: [0u8; CAN_MAX_DLEN],
            rx: false,
        })
    }

    /// Check if frame uses 29-bit extended ID format.
    fn is_extended(&self) -> bool {
        id_is_extended(&self.id)
    }

    /// Check if frame is a remote transmission request.
    fn is_remote_frame(&self) -> bool {
        self.flags.contains(IdFlags::RTR)
    }

    /// Return the frame identifier.
    fn id(&self) -> Id {
        self.id
    }

    /// Data length code
    fn dlc(&self) -> usize {
        self.dlc as usize
    }

    /// A slice into the actual data. Slice will always be <= 8 bytes in length
    fn data(&self) -> &[u8] {
        if self.is_remote_frame() {
            &[]
        } else {
            &self.data[..self.dlc as usize]
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Frame {{ ")?;
        fmt::UpperHex::fmt(self, f)?;
        write!(f, " @ {:.6}{} }}", self.timestamp, if self.rx { " rx" } else { "" })
    }
}

impl fmt::UpperHex for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_error_frame() || self.is_extended() {
            write!(f, "{:08X}#", self.raw_id())?;
        } else {
            write!(f, "{:03X}#", self.raw_id())?;
        }
        if self.is_remote_frame() {
            return write!(f, "R{}", self.dlc);
        }
        let mut parts = self.data().iter().map(|v| format!("{:02X}", v));
        write!(f, "{}", parts.join(" "))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = if self.is_error_frame() {
            " ERR"
        } else if self.is_remote_frame() {
            " RTR"
        } else {
            ""
        };
        write!(
            f,
            "({:.6}) {} [{}] {:X}{}",
            self.timestamp,
            if self.rx { "RX" } else { "TX" },
            self.dlc,
            self,
            kind
        )
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{CAN_EFF_FLAG, CAN_ERR_FLAG, CAN_RTR_FLAG};
    use embedded_can::StandardId;

    const STD_ID: u16 = 0x042;
    const EXT_ID: u32 = 0x12345;

    const DATA: &[u8] = &[0, 1, 2, 3];

    #[test]
    fn test_data_frame() {
        let id = StandardId::new(STD_ID).unwrap();
        let frame = Frame::new(id, DATA).unwrap();

        assert_eq!(STD_ID as canid_t, frame.raw_id());
        assert_eq!(STD_ID as canid_t, frame.id_word());
        assert!(!frame.is_extended());
        assert!(!frame.is_remote_frame());
        assert!(!frame.is_error_frame());
        assert_eq!(DATA, frame.data());
        assert_eq!(4, frame.len());

        assert!(Frame::new(id, &[0u8; 9]).is_none());
    }

    #[test]
    fn test_remote_frame() {
        let id = ExtendedId::new(EXT_ID).unwrap();
        let frame = Frame::new_remote(id, 4).unwrap();

        assert!(frame.is_extended());
        assert!(frame.is_remote_frame());
        assert_eq!(4, frame.dlc());
        assert!(frame.is_empty());
        assert_eq!(EXT_ID | CAN_EFF_FLAG | CAN_RTR_FLAG, frame.id_word());
    }

    #[test]
    fn test_error_frame() {
        let frame = Frame::new_error(0x04, &[0, 4, 0, 0, 0, 0, 0, 0]).unwrap();

        assert!(frame.is_error_frame());
        assert_eq!(0x04 | CAN_ERR_FLAG, frame.id_word());
        assert_eq!(8, frame.len());
    }

    #[test]
    fn test_raw_conversion() {
        let id = ExtendedId::new(EXT_ID).unwrap();
        let frame = Frame::new(id, DATA).unwrap().with_timestamp(1.5);

        let raw = frame.to_raw();
        assert_eq!(EXT_ID | CAN_EFF_FLAG, raw.can_id);
        assert_eq!(4, raw.can_dlc);
        assert_eq!(DATA, &raw.data[..4]);

        let back = Frame::from_raw(&raw).unwrap();
        assert!(back.is_extended());
        assert_eq!(frame.raw_id(), back.raw_id());
        assert_eq!(frame.data(), back.data());

        let mut raw = can_frame_default();
        raw.can_dlc = 9;
        assert!(Frame::from_raw(&raw).is_none());
    }

    #[test]
    fn test_matches() {
        let sent = Frame::new(StandardId::new(42).unwrap(), &[1, 2, 3]).unwrap();

        let echo = Frame::new(StandardId::new(42).unwrap(), &[1, 2, 3])
            .unwrap()
            .with_rx(true)
            .with_timestamp(99.0);
        assert!(echo.matches(&sent));

        let other_data = Frame::new(StandardId::new(42).unwrap(), &[9, 9, 9]).unwrap();
        assert!(!other_data.matches(&sent));

        let other_id = Frame::new(StandardId::new(43).unwrap(), &[1, 2, 3]).unwrap();
        assert!(!other_id.matches(&sent));

        let wide = Frame::new(ExtendedId::new(42).unwrap(), &[1, 2, 3]).unwrap();
        assert!(wide.matches(&sent));
    }

    #[test]
    fn test_hex_format() {
        let frame = Frame::new(StandardId::new(STD_ID).unwrap(), &[0xDE, 0xAD]).unwrap();
        assert_eq!("042#DE AD", format!("{:X}", frame));

        let frame = Frame::new_remote(ExtendedId::new(EXT_ID).unwrap(), 2).unwrap();
        assert_eq!("00012345#R2", format!("{:X}", frame));
    }
}

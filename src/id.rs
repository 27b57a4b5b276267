// canplayer/src/id.rs
//
// CANbus identifier helpers.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Conversions between `embedded_can` identifiers and the composite
//! SocketCAN ID word.

use bitflags::bitflags;
use embedded_can::{ExtendedId, Id, StandardId};
use libc::canid_t;

pub use libc::{
    CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_ERR_MASK, CAN_MAX_DLEN, CAN_RTR_FLAG,
    CAN_SFF_MASK,
};

bitflags! {
    /// Bit flags in the composite SocketCAN ID word.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct IdFlags: canid_t {
        /// Indicates frame uses a 29-bit extended ID
        const EFF = CAN_EFF_FLAG;
        /// Indicates a remote request frame.
        const RTR = CAN_RTR_FLAG;
        /// Indicates an error frame.
        const ERR = CAN_ERR_FLAG;
    }
}

/// Gets the canid_t value from an Id
/// If it's an extended ID, the CAN_EFF_FLAG bit is also set.
pub fn id_to_canid_t(id: impl Into<Id>) -> canid_t {
    use Id::*;
    match id.into() {
        Standard(id) => id.as_raw() as canid_t,
        Extended(id) => id.as_raw() | CAN_EFF_FLAG,
    }
}

/// Gets the bare numeric value of an Id, without any flags.
#[inline]
pub fn id_raw(id: &Id) -> canid_t {
    match id {
        Id::Standard(id) => id.as_raw() as canid_t,
        Id::Extended(id) => id.as_raw(),
    }
}

/// Determines if the ID is an extended, 29-bit, ID.
#[inline]
pub fn id_is_extended(id: &Id) -> bool {
    matches!(id, Id::Extended(_))
}

/// Creates a CAN ID of an explicit width from a raw integer value.
pub fn id_with_width(id: u32, extended: bool) -> Option<Id> {
    if extended {
        ExtendedId::new(id).map(Id::from)
    } else {
        u16::try_from(id)
            .ok()
            .and_then(StandardId::new)
            .map(Id::from)
    }
}

/// Splits a composite SocketCAN ID word into the identifier and its flags.
///
/// Error frames carry their error class in the ID bits; those are returned
/// as an extended identifier.
pub fn split_id_word(word: canid_t) -> Option<(Id, IdFlags)> {
    let flags = IdFlags::from_bits_truncate(word);
    let id = if flags.contains(IdFlags::ERR) {
        ExtendedId::new(word & CAN_ERR_MASK)?.into()
    } else if flags.contains(IdFlags::EFF) {
        ExtendedId::new(word & CAN_EFF_MASK)?.into()
    } else {
        StandardId::new((word & CAN_SFF_MASK) as u16)?.into()
    };
    Some((id, flags))
}

/////////////////////////////////////////////////////////////////////////////

// canplayer/src/dump.rs
//
// Implements candump format parsing.
//
// This file is part of the Rust 'canplayer' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! candump format parsing
//!
//! Parses the text log format emitted by the `candump` utility, which is
//! part of [can-utils](https://github.com/linux-can/can-utils). This is the
//! source of recorded frames for a replay.
//!
//! Example:
//!
//! ```text
//! (1735270496.916858) can0 110#00112233
//! (1735270509.245511) can0 110#44556677
//! (1735279041.257318) can1 104#R
//! (1735279048.349278) can1 110#R4
//! (1735279049.000000) can1 12345678#DEADBEEF
//! (1735279050.000000) can1 20000004#0004000000000000
//! (1469439874.299654) can1 104#
//! ```
//!
//! Identifiers written with more than three hex digits are extended
//! (29-bit) identifiers. An identifier word carrying the error flag
//! (`0x20000000`) is an error frame. CAN FD records (`##`) are rejected,
//! since only classic frames can be replayed.
//!
//! Can be parsed by a `Reader` object. The API is inspired by the
//! [csv](https://crates.io/crates/csv) crate.

use crate::{
    frame::Frame,
    id::{id_with_width, CAN_ERR_FLAG, CAN_ERR_MASK},
    pacer::Timestamped,
};
use embedded_can::Frame as EmbeddedFrame;
use hex::FromHex;
use itertools::Itertools;
use libc::canid_t;
use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use thiserror::Error;

/// candump line parse error
#[derive(Error, Debug)]
pub enum ParseError {
    /// I/O Error
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Unexpected end of line
    #[error("Unexpected end of line")]
    UnexpectedEndOfLine,
    /// Invalid time stamp
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    /// Invalid device name
    #[error("Invalid device name")]
    InvalidDeviceName,
    /// Invalid CAN frame
    #[error("Invalid CAN frame")]
    InvalidCanFrame,
    /// A CAN FD frame, which can't be replayed
    #[error("CAN FD frames are not supported")]
    FdNotSupported,
}

/// Recorded CAN frame.
/// This corresponds to the information in a line from the candump log.
#[derive(Debug, Clone)]
pub struct CanDumpRecord {
    /// The timestamp, in microseconds
    pub t_us: u64,
    /// The name of the device
    pub device: String,
    /// The parsed frame, stamped with the record time
    pub frame: Frame,
}

impl From<CanDumpRecord> for Frame {
    fn from(rec: CanDumpRecord) -> Self {
        rec.frame
    }
}

impl Timestamped for CanDumpRecord {
    fn timestamp(&self) -> Option<f64> {
        Some(self.t_us as f64 / 1.0e6)
    }
}

impl fmt::Display for CanDumpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = &self.frame;
        write!(
            f,
            "({}.{:06}) {} ",
            self.t_us / 1_000_000,
            self.t_us % 1_000_000,
            self.device
        )?;

        if frame.is_error_frame() {
            write!(f, "{:08X}", frame.raw_id() | CAN_ERR_FLAG)?;
        } else if frame.is_extended() {
            write!(f, "{:08X}", frame.raw_id())?;
        } else {
            write!(f, "{:03X}", frame.raw_id())?;
        }

        if frame.is_remote_frame() {
            return match frame.dlc() {
                0 => f.write_str("#R"),
                n => write!(f, "#R{}", n),
            };
        }
        let mut parts = frame.data().iter().map(|v| format!("{:02X}", v));
        write!(f, "#{}", parts.join(""))
    }
}

// Parses "<secs>.<fraction>" into microseconds.
fn parse_timestamp(ts: &str) -> Result<u64, ParseError> {
    let (num, frac) = ts.split_once('.').ok_or(ParseError::InvalidTimestamp)?;

    if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidTimestamp);
    }

    let num = num
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidTimestamp)?;

    // Normalize the fraction to exactly six digits (microseconds)
    let digits = &frac[..frac.len().min(6)];
    let scale = 10u64.pow(6 - digits.len() as u32);
    let frac = digits
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidTimestamp)?;

    Ok(num.saturating_mul(1_000_000).saturating_add(frac * scale))
}

// Parses the "<canid>#<data>" field of a record.
fn parse_frame(can_raw: &str) -> Result<Frame, ParseError> {
    let (can_id_str, can_data) = can_raw
        .split_once('#')
        .ok_or(ParseError::InvalidCanFrame)?;

    let raw_id =
        canid_t::from_str_radix(can_id_str, 16).map_err(|_| ParseError::InvalidCanFrame)?;

    // Remember...
    //   CAN FD: "<canid>##<flags>[data]"
    //   Remote: "<canid>#R[len]"
    //   Data;   "<canid>#[data]"

    if can_data.starts_with('#') {
        return Err(ParseError::FdNotSupported);
    }

    if raw_id & CAN_ERR_FLAG != 0 {
        return Vec::from_hex(can_data)
            .ok()
            .and_then(|data| Frame::new_error(raw_id & CAN_ERR_MASK, &data))
            .ok_or(ParseError::InvalidCanFrame);
    }

    let can_id =
        id_with_width(raw_id, can_id_str.len() > 3).ok_or(ParseError::InvalidCanFrame)?;

    if let Some(rlen) = can_data.strip_prefix('R') {
        let rlen = rlen.parse::<usize>().unwrap_or(0);
        Frame::new_remote(can_id, rlen)
    } else {
        Vec::from_hex(can_data)
            .ok()
            .and_then(|data| Frame::new(can_id, &data))
    }
    .ok_or(ParseError::InvalidCanFrame)
}

/////////////////////////////////////////////////////////////////////////////
// Reader

#[derive(Debug)]
/// A CAN log reader.
pub struct Reader<R> {
    // The underlying reader
    rdr: R,
    // The line buffer
    buf: String,
}

impl<R: io::Read> Reader<R> {
    /// Creates an I/O buffered reader from a CAN log reader.
    pub fn from_reader(rdr: R) -> Reader<BufReader<R>> {
        Reader {
            rdr: BufReader::new(rdr),
            buf: String::with_capacity(256),
        }
    }
}

impl Reader<File> {
    /// Creates an I/O buffered reader from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Reader<BufReader<File>>> {
        Ok(Reader::from_reader(File::open(path)?))
    }
}

impl<R: BufRead> Reader<R> {
    /// Advance state, returning next record.
    ///
    /// Blank lines are skipped.
    pub fn next_record(&mut self) -> Result<Option<CanDumpRecord>, ParseError> {
        loop {
            self.buf.clear();
            let nread = self.rdr.read_line(&mut self.buf)?;

            // reached EOF
            if nread == 0 {
                return Ok(None);
            }

            if !self.buf.trim().is_empty() {
                break;
            }
        }

        let line = self.buf.trim();

        let mut field_iter = line.split_whitespace();

        // parse timestamp field
        let ts = field_iter.next().ok_or(ParseError::UnexpectedEndOfLine)?;

        let t_us = ts
            .strip_prefix('(')
            .and_then(|ts| ts.strip_suffix(')'))
            .ok_or(ParseError::InvalidTimestamp)
            .and_then(parse_timestamp)?;

        // device name
        let device = field_iter.next().ok_or(ParseError::UnexpectedEndOfLine)?;
        if device.contains('#') {
            return Err(ParseError::InvalidDeviceName);
        }

        // parse packet
        let can_raw = field_iter.next().ok_or(ParseError::UnexpectedEndOfLine)?;
        let frame = parse_frame(can_raw)?.with_timestamp(t_us as f64 / 1.0e6);

        Ok(Some(CanDumpRecord {
            t_us,
            device: device.to_string(),
            frame,
        }))
    }

    /// Converts the reader into an iterator over just the frames.
    pub fn frames(self) -> impl Iterator<Item = Result<Frame, ParseError>> {
        self.map(|rec| rec.map(Frame::from))
    }
}

impl<R: BufRead> Iterator for Reader<R> {
    type Item = Result<CanDumpRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        // lift Option:
        match self.next_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////

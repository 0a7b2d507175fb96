//! DNS message header.
//!
//! The header is a fixed 12-byte structure: a message id, a flags word with
//! embedded opcode and response code, and four section counts.

use crate::error::{Error, Result};
use crate::opcode::OpCode;
use crate::rcode::ResponseCode;
use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Size of the DNS header in bytes.
pub const HEADER_SIZE: usize = 12;

bitflags! {
    /// DNS header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u16 {
        /// Query/Response: 0 = query, 1 = response.
        const QR = 0x8000;
        /// Authoritative Answer.
        const AA = 0x0400;
        /// Truncation.
        const TC = 0x0200;
        /// Recursion Desired.
        const RD = 0x0100;
        /// Recursion Available.
        const RA = 0x0080;
    }
}

impl Default for HeaderFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// DNS message header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    /// Message identifier for matching requests to responses.
    pub id: u16,

    /// QR/AA/TC/RD/RA flags.
    pub flags: HeaderFlags,

    /// Operation code.
    pub opcode: OpCode,

    /// Response code.
    pub rcode: ResponseCode,

    /// Number of questions.
    pub qd_count: u16,

    /// Number of answer records.
    pub an_count: u16,

    /// Number of authority records.
    pub ns_count: u16,

    /// Number of additional records.
    pub ar_count: u16,
}

impl Header {
    /// Creates a query header with a random id and RD set.
    pub fn query() -> Self {
        Self {
            id: rand::random(),
            flags: HeaderFlags::RD,
            opcode: OpCode::Query,
            rcode: ResponseCode::NoError,
            qd_count: 1,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// Creates a response header mirroring a query header.
    ///
    /// Copies the id, opcode, and RD flag; sets QR.
    pub fn response_from(query: &Header) -> Self {
        Self {
            id: query.id,
            flags: HeaderFlags::QR | (query.flags & HeaderFlags::RD),
            opcode: query.opcode,
            rcode: ResponseCode::NoError,
            qd_count: query.qd_count,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// Returns true if this is a query.
    #[inline]
    pub fn is_query(&self) -> bool {
        !self.flags.contains(HeaderFlags::QR)
    }

    /// Returns true if this is a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags.contains(HeaderFlags::QR)
    }

    /// Returns true if the message was truncated.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.flags.contains(HeaderFlags::TC)
    }

    /// Returns true if recursion was requested.
    #[inline]
    pub fn recursion_desired(&self) -> bool {
        self.flags.contains(HeaderFlags::RD)
    }

    /// Returns true if recursion is available.
    #[inline]
    pub fn recursion_available(&self) -> bool {
        self.flags.contains(HeaderFlags::RA)
    }

    /// Sets or clears the AA flag.
    #[inline]
    pub fn set_authoritative(&mut self, aa: bool) {
        self.flags.set(HeaderFlags::AA, aa);
    }

    /// Sets or clears the TC flag.
    #[inline]
    pub fn set_truncated(&mut self, tc: bool) {
        self.flags.set(HeaderFlags::TC, tc);
    }

    /// Sets or clears the RD flag.
    #[inline]
    pub fn set_recursion_desired(&mut self, rd: bool) {
        self.flags.set(HeaderFlags::RD, rd);
    }

    /// Sets or clears the RA flag.
    #[inline]
    pub fn set_recursion_available(&mut self, ra: bool) {
        self.flags.set(HeaderFlags::RA, ra);
    }

    /// Parses a header from the start of a message.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::BufferTooShort {
                needed: HEADER_SIZE,
                have: data.len(),
            });
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let raw_flags = u16::from_be_bytes([data[2], data[3]]);

        Ok(Self {
            id,
            flags: HeaderFlags::from_bits_truncate(raw_flags),
            opcode: OpCode::from_u8(((raw_flags >> 11) & 0x0F) as u8),
            rcode: ResponseCode::from_u8((raw_flags & 0x0F) as u8),
            qd_count: u16::from_be_bytes([data[4], data[5]]),
            an_count: u16::from_be_bytes([data[6], data[7]]),
            ns_count: u16::from_be_bytes([data[8], data[9]]),
            ar_count: u16::from_be_bytes([data[10], data[11]]),
        })
    }

    /// Writes the header in wire format.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let raw_flags = self.flags.bits()
            | ((self.opcode.to_u8() as u16 & 0x0F) << 11)
            | (self.rcode.to_u8() as u16 & 0x0F);

        buf.put_u16(self.id);
        buf.put_u16(raw_flags);
        buf.put_u16(self.qd_count);
        buf.put_u16(self.an_count);
        buf.put_u16(self.ns_count);
        buf.put_u16(self.ar_count);
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "opcode: {}, status: {}, id: {}",
            self.opcode, self.rcode, self.id
        )
    }
}

//! Wire-format definitions for RDT frames.
//!
//! Every datagram exchanged between peers is exactly one [`Packet`] of
//! [`FRAME_LEN`] bytes.  This module is responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a frame with a freshly computed checksum.
//! - Deserialising a raw datagram back into a [`Packet`], rejecting frames of
//!   the wrong size or with a bad checksum.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Seq Num    |    Ack Num    |     Flags     |     RWnd      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Checksum (big-endian)    |                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
//! |                 Payload (100 bytes, zero padded)              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Header: [`HEADER_LEN`] = 6 bytes, payload: [`PAYLOAD_LEN`] = 100 bytes.

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Finish: sender has no more data to send.
    pub const FIN: u8 = 0x01;
    /// Synchronise sequence numbers (handshake).
    pub const SYN: u8 = 0x02;
    /// Reset the connection.
    pub const RST: u8 = 0x04;
    /// Push (unused).
    pub const PSH: u8 = 0x08;
    /// Acknowledgement field is valid.
    pub const ACK: u8 = 0x10;
    /// Urgent (unused).
    pub const URG: u8 = 0x20;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 6;

/// Byte length of the fixed-size payload carried by every frame.
pub const PAYLOAD_LEN: usize = 100;

/// Total size of one frame (one datagram).
pub const FRAME_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

/// Receive window advertised in every frame, in 100-byte units.
pub const DEFAULT_RWND: u8 = 1;

const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 1;
const OFF_FLAGS: usize = 2;
const OFF_RWND: usize = 3;
const OFF_CHECKSUM: usize = 4;

/// Fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Sequence number of this frame (wraps modulo 256).
    pub seqnum: u8,
    /// Sequence number this frame acknowledges.
    pub acknum: u8,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// Receiver window, in 100-byte units.
    pub rwnd: u8,
    /// Checksum as found on the wire.
    ///
    /// Ignored by [`Packet::encode`], which always recomputes it.
    pub checksum: u16,
}

/// A complete RDT frame: header + fixed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Packet {
    /// Build a data frame carrying `chunk` (at most [`PAYLOAD_LEN`] bytes).
    ///
    /// Bytes past the end of `chunk` are zero.  Longer chunks are truncated.
    pub fn data(seqnum: u8, chunk: &[u8]) -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        let n = chunk.len().min(PAYLOAD_LEN);
        payload[..n].copy_from_slice(&chunk[..n]);
        Self {
            header: Header {
                seqnum,
                acknum: 0,
                flags: 0,
                rwnd: DEFAULT_RWND,
                checksum: 0,
            },
            payload,
        }
    }

    /// Build a payload-less control frame (SYN, ACK, FIN, ...).
    pub fn control(seqnum: u8, acknum: u8, flags: u8) -> Self {
        Self {
            header: Header {
                seqnum,
                acknum,
                flags,
                rwnd: DEFAULT_RWND,
                checksum: 0,
            },
            payload: [0u8; PAYLOAD_LEN],
        }
    }

    /// `true` when every bit of `flag` is set in the header.
    pub fn has(&self, flag: u8) -> bool {
        self.header.flags & flag == flag
    }

    /// `true` for a frame that carries application data (no control flags).
    pub fn is_data(&self) -> bool {
        self.header.flags & (flags::SYN | flags::ACK | flags::FIN | flags::RST) == 0
    }

    /// `true` for an ACK (without SYN) acknowledging `seqnum`.
    pub fn acks(&self, seqnum: u8) -> bool {
        self.has(flags::ACK) && !self.has(flags::SYN) && self.header.acknum == seqnum
    }

    /// Serialise into a frame with the checksum computed over the whole frame.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[OFF_SEQ] = self.header.seqnum;
        buf[OFF_ACK] = self.header.acknum;
        buf[OFF_FLAGS] = self.header.flags;
        buf[OFF_RWND] = self.header.rwnd;
        // Checksum field is zero while computing the checksum.
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
        buf
    }

    /// Parse and verify a frame.
    ///
    /// Returns [`Err`] if `buf` is not exactly [`FRAME_LEN`] bytes or the
    /// checksum over the frame does not fold to zero.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let packet = Self::decode_unverified(buf)?;
        if checksum(buf) != 0 {
            return Err(PacketError::ChecksumFailed);
        }
        Ok(packet)
    }

    /// Parse a frame checking only its length.
    pub fn decode_unverified(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != FRAME_LEN {
            return Err(PacketError::BadLength(buf.len()));
        }
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&buf[HEADER_LEN..]);
        Ok(Self {
            header: Header {
                seqnum: buf[OFF_SEQ],
                acknum: buf[OFF_ACK],
                flags: buf[OFF_FLAGS],
                rwnd: buf[OFF_RWND],
                checksum: u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]),
            },
            payload,
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Datagram is not exactly one frame long.
    #[error("datagram of {0} bytes is not a 106-byte frame")]
    BadLength(usize),
    /// Checksum over the received frame did not fold to zero.
    #[error("checksum verification failed")]
    ChecksumFailed,
}

/// RDT checksum over `data`.
///
/// Sums consecutive big-endian 16-bit words (a trailing odd byte is
/// ignored), folds, truncates to 16 bits and flips every bit.  Called on a
/// frame with a zeroed checksum field this yields the value to store; called
/// on a received frame it yields zero when the frame is intact.
///
/// The fold adds the overflow half back *unshifted*, which leaves the sum
/// unchanged; peers on the wire compute it exactly this way, so it must not
/// be replaced with the RFC 1071 end-around carry.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = data.chunks_exact(2).fold(0u32, |acc, word| {
        acc.wrapping_add(u32::from(u16::from_be_bytes([word[0], word[1]])))
    });
    sum = (sum & 0x0000_FFFF).wrapping_add(sum & 0xFFFF_0000);
    sum = (sum & 0x0000_FFFF).wrapping_add(sum & 0xFFFF_0000);
    (sum as u16) ^ 0xFFFF
}

//! Reliability strategy selection and the pieces every strategy shares.
//!
//! A connection picks one [`Protocol`] at `create` time.  `send` chunks the
//! caller's buffer into [`SendUnit`]s and hands them to the matching
//! [`ReliabilityStrategy`]; `receive` hands it the caller's buffer after the
//! read-ahead store has been drained.

use std::fmt;
use std::str::FromStr;

use crate::connection::Connection;
use crate::error::RdtError;
use crate::packet::{Packet, PAYLOAD_LEN};

/// Reliability protocol selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// One frame in flight at a time ("single packet").
    StopAndWait,
    /// Reserved; every transfer fails with [`RdtError::Unsupported`].
    GoBackN,
    /// Sliding window with per-frame acknowledgement.
    SelectiveRepeat,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StopAndWait => "stop-and-wait",
            Self::GoBackN => "go-back-n",
            Self::SelectiveRepeat => "selective-repeat",
        })
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stop-and-wait" | "saw" | "single-packet" => Ok(Self::StopAndWait),
            "go-back-n" | "gbn" => Ok(Self::GoBackN),
            "selective-repeat" | "sr" => Ok(Self::SelectiveRepeat),
            other => Err(format!("unknown protocol `{other}`")),
        }
    }
}

/// One chunk of a `send` call, kept until acknowledged.
#[derive(Debug, Clone)]
pub struct SendUnit {
    pub seqnum: u8,
    pub acked: bool,
    /// How many times this unit has been put on the wire.
    pub tx_count: u32,
    pub packet: Packet,
}

/// Split `data` into ⌈len/100⌉ units numbered from `first_seq` (mod 256).
pub fn chunk(data: &[u8], first_seq: u8) -> Vec<SendUnit> {
    data.chunks(PAYLOAD_LEN)
        .enumerate()
        .map(|(i, piece)| {
            // Sequence space is 8 bits; truncation is the wrap.
            let seqnum = first_seq.wrapping_add(i as u8);
            SendUnit {
                seqnum,
                acked: false,
                tx_count: 0,
                packet: Packet::data(seqnum, piece),
            }
        })
        .collect()
}

/// Send and receive algorithms run against a connection's socket and state.
#[allow(async_fn_in_trait)]
pub trait ReliabilityStrategy {
    /// Deliver every unit to the peer, advancing `conn`'s local sequence
    /// number once per acknowledged unit.
    async fn send_chunks(
        &mut self,
        conn: &mut Connection,
        units: &mut [SendUnit],
    ) -> Result<(), RdtError>;

    /// Fill `out[filled..]` with in-order payload bytes.
    ///
    /// Returns the new fill level; it is short of `out.len()` only when the
    /// peer closed its half.
    async fn receive_chunks(
        &mut self,
        conn: &mut Connection,
        out: &mut [u8],
        filled: usize,
    ) -> Result<usize, RdtError>;
}

/// Go-Back-N placeholder.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoBackN;

impl ReliabilityStrategy for GoBackN {
    async fn send_chunks(
        &mut self,
        _conn: &mut Connection,
        _units: &mut [SendUnit],
    ) -> Result<(), RdtError> {
        Err(RdtError::Unsupported(Protocol::GoBackN))
    }

    async fn receive_chunks(
        &mut self,
        _conn: &mut Connection,
        _out: &mut [u8],
        _filled: usize,
    ) -> Result<usize, RdtError> {
        Err(RdtError::Unsupported(Protocol::GoBackN))
    }
}

//! Error type shared by every RDT operation.
//!
//! Only resource, state and fatal local faults cross the operation boundary.
//! Transient wire faults (bad checksum, wrong flags, stale sequence numbers)
//! are absorbed by the retransmission loops and never show up here.

use thiserror::Error;

use crate::socket::SocketError;
use crate::state::ConnectionState;
use crate::strategy::Protocol;

#[derive(Debug, Error)]
pub enum RdtError {
    /// The underlying datagram socket could not be opened.
    #[error("failed to open datagram socket: {0}")]
    ResourceExhausted(#[source] std::io::Error),

    /// Handle lies outside the connection table.
    #[error("handle {0} is outside the connection table")]
    InvalidHandle(usize),

    /// Handle refers to an empty slot.
    #[error("handle {0} does not refer to a created connection")]
    NotCreated(usize),

    /// Operation invoked in a state that does not permit it.
    #[error("`{op}` is not permitted in state {state}")]
    BadState {
        op: &'static str,
        state: ConnectionState,
    },

    /// Address did not resolve to an IPv4 socket address.
    #[error("could not resolve `{0}` to an IPv4 address")]
    AddrResolution(String),

    /// The datagram primitive itself failed.
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Retransmission budget spent without hearing from the peer.
    #[error("peer unreachable after {retries} retransmissions")]
    PeerUnreachable { retries: u32 },

    /// Nothing arrived within the receive budget.
    #[error("timed out waiting for data")]
    Timeout,

    /// The peer closed its half while we were still sending.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The selected reliability protocol has no implementation.
    #[error("protocol {0} is not implemented")]
    Unsupported(Protocol),
}

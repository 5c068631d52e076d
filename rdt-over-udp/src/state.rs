//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state a [`crate::connection::Connection`] can
//! occupy between `create` and `close`, together with the transitions driven
//! by the teardown handshake.  Handshake transitions (`bind`, `listen`,
//! `accept`, `connect`) are simple assignments guarded in
//! [`crate::connection`]; the close transitions depend on which half finished
//! first, so they live here as exhaustive matches.
//!
//! ```text
//!  Unbound ──bind──▶ Bound ──listen──▶ Listening ──accept──┐
//!                      │                                   ▼
//!                      └──────────connect────────────▶ Connected
//!                                                          │
//!                    local FIN ACKed ┌─────────────────────┴────┐ peer FIN
//!                                    ▼                          ▼
//!                              LocalClosing               RemoteClosing
//!                                    │ peer FIN                 │ local FIN ACKed
//!                                    └──────────▶ Closed ◀──────┘
//! ```
//!
//! A slot that has never been created (or has been closed) holds no
//! connection at all, so there is no "empty" variant here.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Socket opened but not yet bound to a local address.
    #[default]
    Unbound,
    /// Bound to a local address.
    Bound,
    /// Passive side waiting in `accept`.
    Listening,
    /// Three-way handshake complete; data transfer allowed.
    Connected,
    /// Our FIN has been acknowledged; the peer may still be sending.
    LocalClosing,
    /// The peer's FIN has been received and acknowledged.
    RemoteClosing,
    /// Both halves closed.
    Closed,
}

impl ConnectionState {
    /// `true` once a local address has been bound.
    pub fn is_bound(self) -> bool {
        !matches!(self, Self::Unbound)
    }

    /// `true` once the handshake has completed, including every closing state.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::LocalClosing | Self::RemoteClosing | Self::Closed
        )
    }

    /// `true` once our FIN has been acknowledged.
    pub fn is_local_closed(self) -> bool {
        matches!(self, Self::LocalClosing | Self::Closed)
    }

    /// `true` once the peer's FIN has been received.
    pub fn is_remote_closed(self) -> bool {
        matches!(self, Self::RemoteClosing | Self::Closed)
    }

    /// Transition taken when the peer acknowledges our FIN.
    pub fn on_local_fin_acked(self) -> Self {
        match self {
            Self::Connected => Self::LocalClosing,
            Self::RemoteClosing => Self::Closed,
            Self::LocalClosing | Self::Closed => self,
            Self::Unbound | Self::Bound | Self::Listening => self,
        }
    }

    /// Transition taken when the peer's FIN arrives.
    pub fn on_remote_fin(self) -> Self {
        match self {
            Self::Connected => Self::RemoteClosing,
            Self::LocalClosing => Self::Closed,
            Self::RemoteClosing | Self::Closed => self,
            Self::Unbound | Self::Bound | Self::Listening => self,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

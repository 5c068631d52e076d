//! Datagram socket abstraction.
//!
//! [`Socket`] is the raw unreliable primitive the engine sits on.  It is
//! opened unbound through `socket2` (so `create` can fail independently of
//! `bind`) and becomes a `tokio::net::UdpSocket` once bound.  All protocol
//! logic lives elsewhere; this module owns only byte I/O and the single
//! suspension point, [`Socket::recv_until`].

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::packet::FRAME_LEN;

/// Receive buffer size; anything longer than a frame is rejected by length.
const MAX_DATAGRAM: usize = 2048;

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    /// Send or receive attempted before `bind`.
    #[error("socket is not bound")]
    NotBound,
    /// `bind` attempted twice.
    #[error("socket is already bound")]
    AlreadyBound,
}

/// Returns true if the error is likely transient (retry may succeed).
///
/// ICMP port-unreachable replies surface on a connected UDP socket as
/// `ConnectionRefused` on the next call; for this protocol that is the same
/// as silence.
fn is_transient_io_error(e: &io::Error) -> bool {
    use io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}

/// A UDP socket that is either freshly opened or bound.
#[derive(Debug)]
pub struct Socket {
    unbound: Option<socket2::Socket>,
    bound: Option<UdpSocket>,
}

impl Socket {
    /// Open a new, unbound IPv4 datagram socket.
    pub fn open() -> io::Result<Self> {
        let raw = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        Ok(Self {
            unbound: Some(raw),
            bound: None,
        })
    }

    /// Bind to `addr` and hand the socket to the tokio reactor.
    ///
    /// Returns the address actually bound (port 0 resolves to an ephemeral
    /// port).  Must be called from within a tokio runtime.
    pub fn bind(&mut self, addr: SocketAddr) -> Result<SocketAddr, SocketError> {
        let raw = self.unbound.as_ref().ok_or(SocketError::AlreadyBound)?;
        raw.bind(&addr.into())?;
        raw.set_nonblocking(true)?;

        let raw = self.unbound.take().ok_or(SocketError::AlreadyBound)?;
        let std_socket: std::net::UdpSocket = raw.into();
        let bound = UdpSocket::from_std(std_socket)?;
        let local = bound.local_addr()?;
        self.bound = Some(bound);
        Ok(local)
    }

    fn inner(&self) -> Result<&UdpSocket, SocketError> {
        self.bound.as_ref().ok_or(SocketError::NotBound)
    }

    /// Restrict the socket to `peer`: sends go there by default and only its
    /// datagrams are received.
    pub async fn connect(&self, peer: SocketAddr) -> Result<(), SocketError> {
        self.inner()?.connect(peer).await?;
        Ok(())
    }

    /// Send one frame to the connected peer.
    ///
    /// Transient failures are logged and treated as a lost datagram.
    pub async fn send(&self, frame: &[u8]) -> Result<(), SocketError> {
        match self.inner()?.send(frame).await {
            Ok(_) => Ok(()),
            Err(e) if is_transient_io_error(&e) => {
                log::debug!("[socket] send dropped: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Block until a datagram arrives from any address.
    pub async fn recv_any(&self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        let socket = self.inner()?;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, from)) => {
                    buf.truncate(n);
                    return Ok((buf, from));
                }
                Err(e) if is_transient_io_error(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wait for a datagram from the connected peer until `deadline`.
    ///
    /// Returns `Ok(None)` when the deadline passes first.
    pub async fn recv_until(&self, deadline: Instant) -> Result<Option<Vec<u8>>, SocketError> {
        let socket = self.inner()?;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
                Err(_elapsed) => return Ok(None),
                Ok(Ok(n)) => {
                    if n != FRAME_LEN {
                        log::debug!("[socket] received {n}-byte datagram");
                    }
                    buf.truncate(n);
                    return Ok(Some(buf));
                }
                Ok(Err(e)) if is_transient_io_error(&e) => continue,
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}

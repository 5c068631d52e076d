//! Connection table: the public operation set.
//!
//! An [`RdtTable`] is a growable arena of connection slots addressed by
//! [`Handle`].  The arena is created lazily with [`INITIAL_CAPACITY`] slots
//! and doubles whenever `create` finds no free slot.  `close` empties a slot
//! so a later `create` can reuse it.
//!
//! Every operation other than `create` and `close` resolves its handle first
//! and fails with [`RdtError::InvalidHandle`] past the end of the arena or
//! [`RdtError::NotCreated`] for an empty slot.  The `is_*` queries answer
//! `false` for both.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::RdtConfig;
use crate::connection::{resolve_ipv4, Connection};
use crate::error::RdtError;
use crate::state::ConnectionState;
use crate::stats::{ReceiveStats, SendStats};
use crate::strategy::Protocol;

/// Slot count of a freshly created arena.
pub const INITIAL_CAPACITY: usize = 10;

/// Index of a connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    /// Wrap a raw slot index.  The table validates it on use.
    pub fn from_raw(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct RdtTable {
    slots: Vec<Option<Connection>>,
    config: RdtConfig,
}

impl RdtTable {
    pub fn new(config: RdtConfig) -> Self {
        Self {
            slots: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &RdtConfig {
        &self.config
    }

    /// Number of slots, occupied or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, handle: Handle) -> Result<&Connection, RdtError> {
        match self.slots.get(handle.0) {
            None => Err(RdtError::InvalidHandle(handle.0)),
            Some(None) => Err(RdtError::NotCreated(handle.0)),
            Some(Some(conn)) => Ok(conn),
        }
    }

    fn slot_mut(&mut self, handle: Handle) -> Result<&mut Connection, RdtError> {
        match self.slots.get_mut(handle.0) {
            None => Err(RdtError::InvalidHandle(handle.0)),
            Some(None) => Err(RdtError::NotCreated(handle.0)),
            Some(Some(conn)) => Ok(conn),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open a new connection using `protocol` in the first free slot.
    pub fn create(&mut self, protocol: Protocol) -> Result<Handle, RdtError> {
        if self.slots.is_empty() {
            self.slots.resize_with(INITIAL_CAPACITY, || None);
        }
        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => index,
            None => {
                let index = self.slots.len();
                self.slots.resize_with(index * 2, || None);
                log::debug!("[table] grew to {} slots", self.slots.len());
                index
            }
        };
        let conn = Connection::open(protocol, &self.config)?;
        self.slots[index] = Some(conn);
        log::debug!("[table] created {} ({protocol})", Handle(index));
        Ok(Handle(index))
    }

    /// Tear the connection down (if connected) and free its slot.
    ///
    /// Closing an empty or unknown handle does nothing.  The slot is freed
    /// even when teardown fails; the failure is still reported.
    pub async fn close(&mut self, handle: Handle) -> Result<(), RdtError> {
        let Some(mut conn) = self.slots.get_mut(handle.0).and_then(Option::take) else {
            return Ok(());
        };
        let result = conn.teardown().await;
        drop(conn);
        if let Err(e) = &result {
            log::warn!("[table] {handle} closed after failed teardown: {e}");
        } else {
            log::debug!("[table] closed {handle}");
        }
        result
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Bind to `addr:port`; `addr` may be a dotted quad or a host name.
    pub fn bind(&mut self, handle: Handle, addr: &str, port: u16) -> Result<SocketAddr, RdtError> {
        let local = resolve_ipv4(addr, port)?;
        self.bind_addr(handle, local)
    }

    pub fn bind_addr(&mut self, handle: Handle, addr: SocketAddr) -> Result<SocketAddr, RdtError> {
        self.slot_mut(handle)?.bind(addr)
    }

    /// Put a bound connection into passive mode.  `backlog` is accepted for
    /// interface compatibility; one peer is served per connection.
    pub fn listen(&mut self, handle: Handle, backlog: usize) -> Result<(), RdtError> {
        let conn = self.slot_mut(handle)?;
        conn.listen()?;
        log::debug!("[table] {handle} listening (backlog {backlog})");
        Ok(())
    }

    /// Wait for a peer and complete the handshake.
    ///
    /// The listening connection becomes the connected one, so the returned
    /// handle is `handle` itself.
    pub async fn accept(&mut self, handle: Handle) -> Result<Handle, RdtError> {
        self.slot_mut(handle)?.accept().await?;
        Ok(handle)
    }

    pub async fn connect(&mut self, handle: Handle, addr: &str, port: u16) -> Result<(), RdtError> {
        let peer = resolve_ipv4(addr, port)?;
        self.connect_addr(handle, peer).await
    }

    pub async fn connect_addr(&mut self, handle: Handle, peer: SocketAddr) -> Result<(), RdtError> {
        self.slot_mut(handle)?.connect(peer).await
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    /// Reliably deliver all of `data` to the peer.
    pub async fn send(&mut self, handle: Handle, data: &[u8]) -> Result<(), RdtError> {
        self.slot_mut(handle)?.send(data).await
    }

    /// Receive up to `max_len` in-order bytes.
    ///
    /// The result is shorter than `max_len` only after the peer closed (or
    /// when the idle budget ran out mid-read); an empty result means the
    /// peer closed with nothing pending.
    pub async fn receive(&mut self, handle: Handle, max_len: usize) -> Result<Vec<u8>, RdtError> {
        let mut buf = vec![0u8; max_len];
        let n = self.receive_into(handle, &mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }

    /// [`RdtTable::receive`] into a caller-owned buffer.
    pub async fn receive_into(&mut self, handle: Handle, buf: &mut [u8]) -> Result<usize, RdtError> {
        self.slot_mut(handle)?.read(buf).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_created(&self, handle: Handle) -> bool {
        self.slot(handle).is_ok()
    }

    pub fn is_bound(&self, handle: Handle) -> bool {
        self.slot(handle).is_ok_and(|c| c.state().is_bound())
    }

    pub fn is_listening(&self, handle: Handle) -> bool {
        self.slot(handle).is_ok_and(Connection::is_listening)
    }

    pub fn is_connected(&self, handle: Handle) -> bool {
        self.slot(handle).is_ok_and(|c| c.state().is_connected())
    }

    /// Read-only view of a connection.
    pub fn connection(&self, handle: Handle) -> Result<&Connection, RdtError> {
        self.slot(handle)
    }

    pub fn state(&self, handle: Handle) -> Result<ConnectionState, RdtError> {
        self.slot(handle).map(Connection::state)
    }

    pub fn protocol(&self, handle: Handle) -> Result<Protocol, RdtError> {
        self.slot(handle).map(Connection::protocol)
    }

    pub fn local_addr(&self, handle: Handle) -> Result<Option<SocketAddr>, RdtError> {
        self.slot(handle).map(Connection::local_addr)
    }

    pub fn remote_addr(&self, handle: Handle) -> Result<Option<SocketAddr>, RdtError> {
        self.slot(handle).map(Connection::remote_addr)
    }

    /// Override the retransmission timeout of one connection.
    pub fn set_timeout(&mut self, handle: Handle, timeout: Duration) -> Result<(), RdtError> {
        self.slot_mut(handle)?.set_timeout(timeout);
        Ok(())
    }

    pub fn send_stats(&self, handle: Handle) -> Result<Option<SendStats>, RdtError> {
        self.slot(handle).map(Connection::send_stats)
    }

    pub fn receive_stats(&self, handle: Handle) -> Result<ReceiveStats, RdtError> {
        self.slot(handle).map(Connection::receive_stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RdtTable {
        RdtTable::new(RdtConfig::default())
    }

    #[test]
    fn arena_is_lazy_and_starts_at_ten() {
        let mut t = table();
        assert_eq!(t.capacity(), 0);
        let h = t.create(Protocol::StopAndWait).unwrap();
        assert_eq!(h.index(), 0);
        assert_eq!(t.capacity(), INITIAL_CAPACITY);
        assert!(t.is_created(h));
    }

    #[test]
    fn arena_doubles_when_full() {
        let mut t = table();
        let handles: Vec<Handle> = (0..11)
            .map(|_| t.create(Protocol::StopAndWait).unwrap())
            .collect();
        assert_eq!(t.capacity(), 20);
        assert_eq!(handles[10].index(), 10);
        assert_eq!(t.len(), 11);
        assert!(!t.is_created(Handle::from_raw(11)));
    }

    #[tokio::test]
    async fn closed_slot_is_reused() {
        let mut t = table();
        let a = t.create(Protocol::StopAndWait).unwrap();
        let b = t.create(Protocol::SelectiveRepeat).unwrap();
        t.close(a).await.unwrap();
        assert!(!t.is_created(a));
        let c = t.create(Protocol::SelectiveRepeat).unwrap();
        assert_eq!(c, a);
        assert_eq!(t.protocol(b).unwrap(), Protocol::SelectiveRepeat);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut t = table();
        let h = t.create(Protocol::StopAndWait).unwrap();
        t.close(h).await.unwrap();
        t.close(h).await.unwrap();
        t.close(Handle::from_raw(500)).await.unwrap();
    }

    #[tokio::test]
    async fn handle_errors() {
        let mut t = table();
        assert!(matches!(
            t.bind(Handle::from_raw(0), "127.0.0.1", 0),
            Err(RdtError::InvalidHandle(0))
        ));
        let h = t.create(Protocol::StopAndWait).unwrap();
        assert!(matches!(
            t.listen(Handle::from_raw(3), 1),
            Err(RdtError::NotCreated(3))
        ));
        assert!(matches!(
            t.send(Handle::from_raw(99), b"x").await,
            Err(RdtError::InvalidHandle(99))
        ));
        assert!(!t.is_bound(Handle::from_raw(99)));
        assert!(!t.is_connected(h));
    }

    #[tokio::test]
    async fn state_violations_have_no_side_effects() {
        let mut t = table();
        let h = t.create(Protocol::StopAndWait).unwrap();

        assert!(matches!(t.listen(h, 1), Err(RdtError::BadState { .. })));
        assert!(matches!(
            t.connect(h, "127.0.0.1", 9).await,
            Err(RdtError::BadState { .. })
        ));
        assert!(matches!(t.accept(h).await, Err(RdtError::BadState { .. })));
        assert_eq!(t.state(h).unwrap(), ConnectionState::Unbound);

        let local = t.bind(h, "127.0.0.1", 0).unwrap();
        assert_eq!(t.local_addr(h).unwrap(), Some(local));
        assert!(t.is_bound(h));
        assert!(matches!(
            t.bind(h, "127.0.0.1", 0),
            Err(RdtError::BadState { op: "bind", .. })
        ));

        t.listen(h, 5).unwrap();
        assert!(t.is_listening(h));
        assert!(!t.is_connected(h));
        assert!(matches!(
            t.connect(h, "127.0.0.1", 9).await,
            Err(RdtError::BadState { op: "connect", .. })
        ));
        assert_eq!(t.remote_addr(h).unwrap(), None);
    }

    #[tokio::test]
    async fn bad_bind_address_is_reported() {
        let mut t = table();
        let h = t.create(Protocol::StopAndWait).unwrap();
        assert!(matches!(
            t.bind(h, "no.such.host.invalid", 1),
            Err(RdtError::AddrResolution(_))
        ));
        assert!(!t.is_bound(h));
    }

    #[test]
    fn set_timeout_reaches_connection() {
        let mut t = table();
        let h = t.create(Protocol::StopAndWait).unwrap();
        t.set_timeout(h, Duration::from_millis(25)).unwrap();
        assert_eq!(t.connection(h).unwrap().timer.timeout, Duration::from_millis(25));
        assert_eq!(t.send_stats(h).unwrap(), None);
        assert_eq!(t.receive_stats(h).unwrap(), ReceiveStats::default());
    }
}

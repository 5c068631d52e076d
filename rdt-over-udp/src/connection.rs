//! Per-connection record and the I/O helpers every phase shares.
//!
//! A [`Connection`] owns the complete state for one logical peer-to-peer
//! session:
//! - the datagram [`Socket`] and the lifecycle [`ConnectionState`];
//! - the sequence-number pair (`loc_seq`, `rem_seq`);
//! - the read-ahead store and the selective-repeat reorder buffer.
//!
//! The handshake lives in `handshake`, teardown in
//! `teardown`, and data transfer is dispatched to the
//! [`ReliabilityStrategy`] chosen at creation.
//!
//! # Sequence numbers
//!
//! `loc_seq` is the sequence number the next outgoing data frame will carry.
//! `rem_seq` is the last in-order sequence number accepted from the peer;
//! the receiver expects `rem_seq + 1`.  The SYN consumes one number on each
//! side, so after the handshake both ends agree: the first data frame from
//! either side carries its ISN plus one.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

use tokio::time::Instant;

use crate::config::RdtConfig;
use crate::error::RdtError;
use crate::packet::{flags, Packet, PacketError, FRAME_LEN, PAYLOAD_LEN};
use crate::read_ahead::ReadAhead;
use crate::selective_repeat::SelectiveRepeat;
use crate::simulator::{Fault, FaultInjector};
use crate::socket::Socket;
use crate::state::ConnectionState;
use crate::stats::{ReceiveStats, SendStats};
use crate::stop_and_wait::StopAndWait;
use crate::strategy::{chunk, GoBackN, Protocol, ReliabilityStrategy};
use crate::timer::TimerConfig;

/// What a bounded wait for the next frame produced.
#[derive(Debug)]
pub(crate) enum Incoming {
    Frame(Packet),
    /// A datagram arrived but failed length or checksum verification.
    Corrupt(PacketError),
    TimedOut,
}

/// One reliable connection over UDP.
#[derive(Debug)]
pub struct Connection {
    pub(crate) socket: Socket,
    pub(crate) state: ConnectionState,
    /// Set by `listen`; survives `accept` so the passive side stays
    /// identifiable.
    pub(crate) passive: bool,
    pub(crate) protocol: Protocol,
    pub(crate) local: Option<SocketAddr>,
    pub(crate) remote: Option<SocketAddr>,
    pub(crate) loc_seq: u8,
    pub(crate) rem_seq: u8,
    pub(crate) timer: TimerConfig,
    pub(crate) window: u8,
    pub(crate) read_ahead: ReadAhead,
    /// Selective-repeat frames accepted ahead of the in-order point.
    pub(crate) reorder: BTreeMap<u8, [u8; PAYLOAD_LEN]>,
    pub(crate) faults: FaultInjector,
    /// Final handshake ACK, kept so a duplicate SYNACK can be answered.
    pub(crate) handshake_ack: Option<Packet>,
    pub(crate) send_stats: Option<SendStats>,
    pub(crate) receive_stats: ReceiveStats,
}

impl Connection {
    /// Open an unbound socket for a new connection.
    pub fn open(protocol: Protocol, config: &RdtConfig) -> Result<Self, RdtError> {
        let socket = Socket::open().map_err(RdtError::ResourceExhausted)?;
        Ok(Self {
            socket,
            state: ConnectionState::Unbound,
            passive: false,
            protocol,
            local: None,
            remote: None,
            loc_seq: 0,
            rem_seq: 0,
            timer: config.timer,
            window: config.window,
            read_ahead: ReadAhead::new(),
            reorder: BTreeMap::new(),
            faults: FaultInjector::new(config.faults),
            handshake_ack: None,
            send_stats: None,
            receive_stats: ReceiveStats::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// `true` for a socket put into passive mode, before and after `accept`.
    pub fn is_listening(&self) -> bool {
        self.passive
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Sequence number of the next outgoing data frame.
    pub fn local_seq(&self) -> u8 {
        self.loc_seq
    }

    /// Last in-order sequence number accepted from the peer.
    pub fn remote_seq(&self) -> u8 {
        self.rem_seq
    }

    /// Bytes held in the read-ahead store.
    pub fn buffered(&self) -> usize {
        self.read_ahead.len()
    }

    /// Counters from the most recent selective-repeat `send`.
    pub fn send_stats(&self) -> Option<SendStats> {
        self.send_stats
    }

    pub fn receive_stats(&self) -> ReceiveStats {
        self.receive_stats
    }

    pub(crate) fn set_timeout(&mut self, timeout: std::time::Duration) {
        self.timer.timeout = timeout;
    }

    fn bad_state(&self, op: &'static str) -> RdtError {
        RdtError::BadState {
            op,
            state: self.state,
        }
    }

    // -----------------------------------------------------------------------
    // Local setup
    // -----------------------------------------------------------------------

    pub(crate) fn bind(&mut self, addr: SocketAddr) -> Result<SocketAddr, RdtError> {
        if self.state != ConnectionState::Unbound {
            return Err(self.bad_state("bind"));
        }
        let local = self.socket.bind(addr)?;
        self.local = Some(local);
        self.state = ConnectionState::Bound;
        log::debug!("[table] bound {local}");
        Ok(local)
    }

    pub(crate) fn listen(&mut self) -> Result<(), RdtError> {
        match self.state {
            ConnectionState::Bound | ConnectionState::Listening => {
                self.state = ConnectionState::Listening;
                self.passive = true;
                Ok(())
            }
            _ => Err(self.bad_state("listen")),
        }
    }

    // -----------------------------------------------------------------------
    // Frame I/O
    // -----------------------------------------------------------------------

    pub(crate) async fn transmit(&self, pkt: &Packet) -> Result<(), RdtError> {
        self.socket.send(&pkt.encode()).await?;
        Ok(())
    }

    /// Transmit through the fault injector, counting what it did.
    pub(crate) async fn transmit_with_faults(
        &mut self,
        pkt: &Packet,
        stats: &mut SendStats,
    ) -> Result<(), RdtError> {
        let mut frame = pkt.encode();
        match self.faults.apply(&mut frame) {
            Fault::Dropped => {
                stats.drops += 1;
                log::trace!("[sr] fault: dropped seq={}", pkt.header.seqnum);
                return Ok(());
            }
            Fault::Corrupted => {
                stats.corruptions += 1;
                log::trace!("[sr] fault: corrupted seq={}", pkt.header.seqnum);
            }
            Fault::None => {}
        }
        self.socket.send(&frame).await?;
        stats.bytes_sent += FRAME_LEN as u64;
        Ok(())
    }

    /// Acknowledge the frame numbered `acknum`.
    pub(crate) async fn ack(&self, acknum: u8) -> Result<(), RdtError> {
        self.transmit(&Packet::control(self.loc_seq, acknum, flags::ACK))
            .await
    }

    /// Wait for the next datagram from the peer until `deadline`.
    pub(crate) async fn wait(&mut self, deadline: Instant) -> Result<Incoming, RdtError> {
        let Some(raw) = self.socket.recv_until(deadline).await? else {
            return Ok(Incoming::TimedOut);
        };
        match Packet::decode(&raw) {
            Ok(pkt) => Ok(Incoming::Frame(pkt)),
            Err(e) => {
                self.receive_stats.corrupt += 1;
                Ok(Incoming::Corrupt(e))
            }
        }
    }

    /// Handle a frame that does not belong to the loop that received it.
    ///
    /// Answers what the peer is evidently still waiting for: a repeat of our
    /// handshake ACK, an ACK for its FIN, or a re-ACK of a data frame we
    /// already accepted (any of the last `window` under selective repeat).
    /// Everything else is dropped.
    pub(crate) async fn answer_stray(&mut self, pkt: &Packet) -> Result<(), RdtError> {
        let h = pkt.header;
        if pkt.has(flags::SYN | flags::ACK) {
            if let Some(ack) = self.handshake_ack {
                self.transmit(&ack).await?;
                log::debug!("[handshake] duplicate SYNACK; re-sent ACK");
                return Ok(());
            }
        } else if pkt.has(flags::FIN) {
            self.ack(h.seqnum).await?;
            self.state = self.state.on_remote_fin();
            log::debug!("[teardown] ← FIN seq={}; → ACK", h.seqnum);
            return Ok(());
        } else if pkt.is_data() && self.rem_seq.wrapping_sub(h.seqnum) < self.delivered_band() {
            self.ack(h.seqnum).await?;
            self.receive_stats.duplicates += 1;
            log::debug!("← duplicate DATA seq={}; → ACK", h.seqnum);
            return Ok(());
        }
        log::trace!(
            "discarded frame seq={} ack={} flags={:#04x}",
            h.seqnum,
            h.acknum,
            h.flags
        );
        Ok(())
    }

    /// How many of the most recently accepted sequence numbers (ending at
    /// `rem_seq`) the peer may still be retransmitting.
    pub(crate) fn delivered_band(&self) -> u8 {
        match self.protocol {
            Protocol::SelectiveRepeat => SelectiveRepeat::new(self.window).window(),
            Protocol::StopAndWait | Protocol::GoBackN => 1,
        }
    }

    /// Copy an accepted payload into `out[filled..]`, parking the overflow.
    ///
    /// Returns the new fill level.
    pub(crate) fn deliver(
        &mut self,
        payload: &[u8; PAYLOAD_LEN],
        out: &mut [u8],
        filled: usize,
    ) -> usize {
        let take = (out.len() - filled).min(PAYLOAD_LEN);
        out[filled..filled + take].copy_from_slice(&payload[..take]);
        self.read_ahead.stash(&payload[take..]);
        filled + take
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    /// Reliably deliver all of `data` to the peer.
    ///
    /// The data is split into 100-byte frames; the last one is zero-padded.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), RdtError> {
        match self.state {
            ConnectionState::Connected => {}
            ConnectionState::RemoteClosing => return Err(RdtError::PeerClosed),
            _ => return Err(self.bad_state("send")),
        }
        let mut units = chunk(data, self.loc_seq);
        if units.is_empty() {
            return Ok(());
        }
        log::debug!(
            "send {} bytes as {} frames from seq={}",
            data.len(),
            units.len(),
            self.loc_seq
        );

        match self.protocol {
            Protocol::StopAndWait => StopAndWait.send_chunks(self, &mut units).await,
            Protocol::SelectiveRepeat => {
                SelectiveRepeat::new(self.window)
                    .send_chunks(self, &mut units)
                    .await
            }
            Protocol::GoBackN => GoBackN.send_chunks(self, &mut units).await,
        }
    }

    /// Fill `out` with the next in-order bytes from the peer.
    ///
    /// Returns fewer than `out.len()` bytes only once the peer has closed
    /// its half, or when the receive budget ran out after some bytes were
    /// delivered.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, RdtError> {
        if !self.state.is_connected() || self.state.is_local_closed() {
            return Err(self.bad_state("receive"));
        }
        if self.protocol == Protocol::GoBackN {
            return GoBackN.receive_chunks(self, out, 0).await;
        }

        let filled = self.read_ahead.drain_into(out);
        if filled == out.len() || self.state.is_remote_closed() {
            return Ok(filled);
        }

        match self.protocol {
            Protocol::StopAndWait => StopAndWait.receive_chunks(self, out, filled).await,
            Protocol::SelectiveRepeat => {
                SelectiveRepeat::new(self.window)
                    .receive_chunks(self, out, filled)
                    .await
            }
            Protocol::GoBackN => GoBackN.receive_chunks(self, out, filled).await,
        }
    }
}

/// Resolve `host` (numeric or name) and `port` to an IPv4 socket address.
pub fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr, RdtError> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::new(IpAddr::V4(ip), port));
    }
    (host, port)
        .to_socket_addrs()
        .map_err(|e| RdtError::AddrResolution(format!("{host}: {e}")))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| RdtError::AddrResolution(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection::open(Protocol::StopAndWait, &RdtConfig::default()).unwrap()
    }

    #[test]
    fn fresh_connection_is_unbound() {
        let c = connection();
        assert_eq!(c.state(), ConnectionState::Unbound);
        assert!(!c.is_listening());
        assert_eq!(c.local_addr(), None);
        assert_eq!(c.buffered(), 0);
    }

    #[test]
    fn deliver_parks_overflow() {
        let mut c = connection();
        let payload: [u8; PAYLOAD_LEN] = std::array::from_fn(|i| i as u8);
        let mut out = [0u8; 30];
        assert_eq!(c.deliver(&payload, &mut out, 20), 30);
        assert_eq!(&out[20..], &payload[..10]);
        assert_eq!(c.buffered(), 90);

        let mut rest = [0u8; 90];
        assert_eq!(c.read_ahead.drain_into(&mut rest), 90);
        assert_eq!(&rest[..], &payload[10..]);
    }

    #[test]
    fn deliver_exact_fit_parks_nothing() {
        let mut c = connection();
        let mut out = [0u8; 250];
        let filled = c.deliver(&[1; PAYLOAD_LEN], &mut out, 0);
        let filled = c.deliver(&[2; PAYLOAD_LEN], &mut out, filled);
        assert_eq!(filled, 200);
        assert_eq!(c.buffered(), 0);
    }

    #[test]
    fn delivered_band_follows_protocol() {
        let config = RdtConfig::default().with_window(16);
        let saw = Connection::open(Protocol::StopAndWait, &config).unwrap();
        assert_eq!(saw.delivered_band(), 1);
        let mut sr = Connection::open(Protocol::SelectiveRepeat, &config).unwrap();
        assert_eq!(sr.delivered_band(), 16);
        sr.window = 200;
        assert_eq!(sr.delivered_band(), crate::config::MAX_WINDOW);
    }

    #[test]
    fn listen_requires_bind() {
        let mut c = connection();
        assert!(matches!(
            c.listen(),
            Err(RdtError::BadState { op: "listen", .. })
        ));
    }

    #[tokio::test]
    async fn bind_then_listen() {
        let mut c = connection();
        let local = c.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(local.port(), 0);
        c.listen().unwrap();
        assert_eq!(c.state(), ConnectionState::Listening);
        assert!(c.is_listening());
        assert!(matches!(c.bind(local), Err(RdtError::BadState { .. })));
    }

    #[tokio::test]
    async fn transfer_before_connect_is_rejected() {
        let mut c = connection();
        c.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(matches!(c.send(b"x").await, Err(RdtError::BadState { .. })));
        let mut buf = [0u8; 4];
        assert!(matches!(c.read(&mut buf).await, Err(RdtError::BadState { .. })));
    }

    #[test]
    fn resolves_numeric_and_localhost() {
        assert_eq!(
            resolve_ipv4("127.0.0.1", 5791).unwrap(),
            "127.0.0.1:5791".parse().unwrap()
        );
        let local = resolve_ipv4("localhost", 1).unwrap();
        assert!(local.is_ipv4());
        assert!(resolve_ipv4("no.such.host.invalid", 1).is_err());
    }
}

//! Three-way handshake.
//!
//! ```text
//!  connector                              acceptor (Listening)
//!     │ ── SYN  seq=x ──────────────────────▶ │  rem_seq = x
//!     │ ◀──────────── SYN|ACK seq=y ack=x ─── │
//!     │ ── ACK  seq=x+1 ack=y ──────────────▶ │
//!  Connected, loc_seq = x+1           Connected, loc_seq = y+1
//! ```
//!
//! Both sides retransmit their last handshake frame whenever the deadline
//! passes or a frame that does not complete the step is discarded.  The
//! acceptor waits for the first SYN without a deadline.

use std::net::SocketAddr;

use crate::connection::{Connection, Incoming};
use crate::error::RdtError;
use crate::packet::{flags, Packet};
use crate::state::ConnectionState;
use crate::timer::RetransmitTimer;

impl Connection {
    /// Passive open: complete a handshake with the first peer that sends a
    /// SYN.  The listening connection itself becomes the connected one.
    pub(crate) async fn accept(&mut self) -> Result<(), RdtError> {
        if self.state != ConnectionState::Listening {
            return Err(RdtError::BadState {
                op: "accept",
                state: self.state,
            });
        }

        let (syn, peer) = loop {
            let (raw, from) = self.socket.recv_any().await?;
            match Packet::decode(&raw) {
                Ok(pkt) if pkt.has(flags::SYN) && !pkt.has(flags::ACK) => break (pkt, from),
                Ok(pkt) => log::debug!(
                    "[handshake] ignoring flags={:#04x} from {from} while listening",
                    pkt.header.flags
                ),
                Err(e) => {
                    self.receive_stats.corrupt += 1;
                    log::debug!("[handshake] dropped frame from {from}: {e}");
                }
            }
        };

        self.socket.connect(peer).await?;
        self.remote = Some(peer);
        self.rem_seq = syn.header.seqnum;
        log::debug!("[handshake] ← SYN seq={} from {peer}", syn.header.seqnum);

        let isn: u8 = rand::random();
        let synack = Packet::control(isn, self.rem_seq, flags::SYN | flags::ACK);
        self.transmit(&synack).await?;
        log::debug!("[handshake] → SYN|ACK seq={isn} ack={}", self.rem_seq);

        let mut timer = RetransmitTimer::new(&self.timer);
        loop {
            match self.wait(timer.deadline()).await? {
                Incoming::Frame(pkt) if pkt.acks(isn) => break,
                Incoming::Frame(pkt) => log::debug!(
                    "[handshake] discarded flags={:#04x} ack={}",
                    pkt.header.flags,
                    pkt.header.acknum
                ),
                Incoming::Corrupt(e) => log::debug!("[handshake] dropped frame: {e}"),
                Incoming::TimedOut => log::debug!("[handshake] timeout waiting for ACK"),
            }
            timer.on_timeout()?;
            self.transmit(&synack).await?;
            timer.arm();
        }

        self.loc_seq = isn.wrapping_add(1);
        self.state = ConnectionState::Connected;
        log::info!(
            "[handshake] accepted {peer} (loc_seq={}, rem_seq={})",
            self.loc_seq,
            self.rem_seq
        );
        Ok(())
    }

    /// Active open towards `peer`.
    pub(crate) async fn connect(&mut self, peer: SocketAddr) -> Result<(), RdtError> {
        if self.state != ConnectionState::Bound {
            return Err(RdtError::BadState {
                op: "connect",
                state: self.state,
            });
        }

        self.socket.connect(peer).await?;
        self.remote = Some(peer);

        let isn: u8 = rand::random();
        let syn = Packet::control(isn, 0, flags::SYN);
        self.transmit(&syn).await?;
        log::debug!("[handshake] → SYN seq={isn} to {peer}");

        let mut timer = RetransmitTimer::new(&self.timer);
        let synack = loop {
            match self.wait(timer.deadline()).await? {
                Incoming::Frame(pkt)
                    if pkt.has(flags::SYN | flags::ACK) && pkt.header.acknum == isn =>
                {
                    break pkt
                }
                Incoming::Frame(pkt) => log::debug!(
                    "[handshake] discarded flags={:#04x} ack={}",
                    pkt.header.flags,
                    pkt.header.acknum
                ),
                Incoming::Corrupt(e) => log::debug!("[handshake] dropped frame: {e}"),
                Incoming::TimedOut => log::debug!("[handshake] timeout waiting for SYN|ACK"),
            }
            timer.on_timeout()?;
            self.transmit(&syn).await?;
            timer.arm();
        };

        self.rem_seq = synack.header.seqnum;
        self.loc_seq = isn.wrapping_add(1);
        let ack = Packet::control(self.loc_seq, self.rem_seq, flags::ACK);
        self.transmit(&ack).await?;
        self.handshake_ack = Some(ack);
        self.state = ConnectionState::Connected;
        log::info!(
            "[handshake] connected to {peer} (loc_seq={}, rem_seq={})",
            self.loc_seq,
            self.rem_seq
        );
        Ok(())
    }
}

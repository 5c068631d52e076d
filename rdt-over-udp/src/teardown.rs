//! Connection teardown.
//!
//! Each side closes its own half with FIN/ACK.  The closer first waits for
//! its FIN to be acknowledged, answering a crossing FIN from the peer
//! (simultaneous close) along the way.  If the peer's half is still open it
//! then waits, within the retry budget, for the peer's FIN and acknowledges
//! it on a best-effort basis.  There is no TIME_WAIT.

use crate::connection::{Connection, Incoming};
use crate::error::RdtError;
use crate::packet::{checksum, flags, Packet};
use crate::timer::RetransmitTimer;

impl Connection {
    /// Close both halves of a connected connection.
    ///
    /// A connection that never completed the handshake has nothing to tear
    /// down.
    pub(crate) async fn teardown(&mut self) -> Result<(), RdtError> {
        if !self.state.is_connected() {
            return Ok(());
        }
        if !self.state.is_local_closed() {
            self.close_local_half().await?;
        }
        if !self.state.is_remote_closed() {
            self.await_remote_fin().await;
        }
        log::info!("[teardown] closed ({})", self.state);
        Ok(())
    }

    async fn close_local_half(&mut self) -> Result<(), RdtError> {
        let fin_seq = self.loc_seq;
        let fin = Packet::control(fin_seq, self.rem_seq, flags::FIN);
        self.transmit(&fin).await?;
        log::debug!("[teardown] → FIN seq={fin_seq}");

        let mut timer = RetransmitTimer::new(&self.timer);
        let mut read_errors = 0u32;
        while !self.state.is_local_closed() {
            let incoming = match self.wait(timer.deadline()).await {
                Ok(incoming) => incoming,
                Err(e) => {
                    read_errors += 1;
                    if read_errors > self.timer.read_error_retries {
                        return Err(e);
                    }
                    log::warn!("[teardown] receive failed ({read_errors}): {e}");
                    continue;
                }
            };
            match incoming {
                Incoming::TimedOut => {
                    timer.on_timeout()?;
                    self.transmit(&fin).await?;
                    timer.arm();
                    log::debug!("[teardown] timeout: retransmitting FIN seq={fin_seq}");
                }
                Incoming::Corrupt(e) => log::debug!("[teardown] dropped frame: {e}"),
                Incoming::Frame(pkt) => {
                    let acked = pkt.acks(fin_seq);
                    if acked {
                        self.state = self.state.on_local_fin_acked();
                        log::debug!("[teardown] ← ACK ack={fin_seq}");
                    }
                    if !acked || pkt.has(flags::FIN) {
                        self.answer_stray(&pkt).await?;
                    }
                }
            }
        }
        self.loc_seq = self.loc_seq.wrapping_add(1);
        Ok(())
    }

    /// Wait for the peer's FIN and acknowledge it, accepting a damaged frame
    /// as long as the FIN bit is set.
    async fn await_remote_fin(&mut self) {
        let mut timer = RetransmitTimer::new(&self.timer);
        loop {
            let raw = match self.socket.recv_until(timer.deadline()).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    if timer.on_timeout().is_err() {
                        log::warn!("[teardown] peer never sent FIN; closing anyway");
                        return;
                    }
                    timer.arm();
                    continue;
                }
                Err(e) => {
                    log::warn!("[teardown] receive failed while awaiting FIN: {e}");
                    return;
                }
            };
            let Ok(pkt) = Packet::decode_unverified(&raw) else {
                continue;
            };
            if pkt.has(flags::FIN) {
                if let Err(e) = self.ack(pkt.header.seqnum).await {
                    log::warn!("[teardown] could not ACK peer FIN: {e}");
                }
                self.state = self.state.on_remote_fin();
                log::debug!("[teardown] ← FIN seq={}; → ACK", pkt.header.seqnum);
                return;
            }
            if pkt.is_data()
                && self.rem_seq.wrapping_sub(pkt.header.seqnum) < self.delivered_band()
                && checksum(&raw) == 0
            {
                if let Err(e) = self.ack(pkt.header.seqnum).await {
                    log::warn!(
                        "[teardown] could not re-ACK DATA seq={}: {e}",
                        pkt.header.seqnum
                    );
                }
            }
        }
    }
}

//! Stop-and-wait ("single packet") reliability.
//!
//! # Contract
//! - At most **one** unit is in flight at any moment.
//! - A unit is retransmitted unchanged each time the deadline passes.
//! - Only an ACK whose `acknum` equals the in-flight unit's sequence number
//!   completes it; the local sequence number then advances by one.
//! - The receiver accepts only `rem_seq + 1`, ACKs it, and re-ACKs (without
//!   delivering) a repeat of the frame it accepted last.

use crate::connection::{Connection, Incoming};
use crate::error::RdtError;
use crate::packet::flags;
use crate::strategy::{ReliabilityStrategy, SendUnit};
use crate::timer::RetransmitTimer;

#[derive(Debug, Default, Clone, Copy)]
pub struct StopAndWait;

impl ReliabilityStrategy for StopAndWait {
    async fn send_chunks(
        &mut self,
        conn: &mut Connection,
        units: &mut [SendUnit],
    ) -> Result<(), RdtError> {
        let mut timer = RetransmitTimer::new(&conn.timer);

        for unit in units.iter_mut() {
            conn.transmit(&unit.packet).await?;
            unit.tx_count = 1;
            timer.arm();
            log::debug!("[saw] → DATA seq={}", unit.seqnum);

            while !unit.acked {
                match conn.wait(timer.deadline()).await? {
                    Incoming::TimedOut => {
                        timer.on_timeout()?;
                        conn.transmit(&unit.packet).await?;
                        unit.tx_count += 1;
                        timer.arm();
                        log::debug!(
                            "[saw] timeout: retransmitting seq={} (attempt {})",
                            unit.seqnum,
                            unit.tx_count
                        );
                    }
                    Incoming::Corrupt(e) => log::debug!("[saw] dropped frame: {e}"),
                    Incoming::Frame(pkt) if pkt.acks(unit.seqnum) => {
                        unit.acked = true;
                        conn.loc_seq = conn.loc_seq.wrapping_add(1);
                        timer.on_progress();
                        log::debug!("[saw] ← ACK ack={}", pkt.header.acknum);
                    }
                    Incoming::Frame(pkt) => {
                        conn.answer_stray(&pkt).await?;
                        if conn.state.is_remote_closed() {
                            return Err(RdtError::PeerClosed);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn receive_chunks(
        &mut self,
        conn: &mut Connection,
        out: &mut [u8],
        mut filled: usize,
    ) -> Result<usize, RdtError> {
        let mut timer = RetransmitTimer::new(&conn.timer);

        while filled < out.len() {
            let pkt = match conn.wait(timer.deadline()).await? {
                Incoming::TimedOut => {
                    if timer.on_timeout().is_err() {
                        return idle_result(filled);
                    }
                    timer.arm();
                    continue;
                }
                Incoming::Corrupt(e) => {
                    log::debug!("[saw] dropped frame: {e}");
                    continue;
                }
                Incoming::Frame(pkt) => pkt,
            };

            if pkt.has(flags::FIN) {
                conn.ack(pkt.header.seqnum).await?;
                conn.state = conn.state.on_remote_fin();
                log::debug!("[saw] ← FIN seq={}; → ACK", pkt.header.seqnum);
                break;
            }
            if !pkt.is_data() {
                conn.answer_stray(&pkt).await?;
                continue;
            }

            let seq = pkt.header.seqnum;
            if seq == conn.rem_seq.wrapping_add(1) {
                filled = conn.deliver(&pkt.payload, out, filled);
                conn.ack(seq).await?;
                conn.rem_seq = seq;
                conn.receive_stats.accepted += 1;
                timer.on_progress();
                timer.arm();
                log::debug!("[saw] ← DATA seq={seq}; → ACK");
            } else if seq == conn.rem_seq {
                conn.ack(seq).await?;
                conn.receive_stats.duplicates += 1;
                log::debug!("[saw] ← duplicate DATA seq={seq}; → ACK");
            } else {
                log::debug!(
                    "[saw] ← DATA seq={seq} out of order (expected {})",
                    conn.rem_seq.wrapping_add(1)
                );
            }
        }
        Ok(filled)
    }
}

/// Outcome of a receive whose idle budget ran out.
pub(crate) fn idle_result(filled: usize) -> Result<usize, RdtError> {
    if filled > 0 {
        log::warn!("receive idle budget spent; returning {filled} bytes");
        Ok(filled)
    } else {
        Err(RdtError::Timeout)
    }
}

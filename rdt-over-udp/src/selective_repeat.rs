//! Selective-repeat reliability.
//!
//! # Sender
//! - Up to `window` units are in flight; each is ACKed individually.
//! - Outstanding units are keyed by sequence number so an ACK is matched in
//!   `O(log W)`; the low edge slides over the contiguous ACKed prefix and the
//!   local sequence number advances with it.
//! - When the deadline passes every outstanding unit is retransmitted, in
//!   send order.
//! - Every transmission passes through the connection's fault injector.
//!
//! # Receiver
//! With `low = rem_seq + 1` a data frame falls into one of three bands:
//!
//! ```text
//!   [low-W, low)      [low, low+W)            elsewhere
//!   already delivered  receive window          stale or far ahead
//!   re-ACK             ACK, buffer, drain      drop, no ACK
//! ```
//!
//! The window must stay at most half the 8-bit sequence space so the bands
//! never overlap.

use std::collections::BTreeMap;
use std::time::Instant as StdInstant;

use crate::config::MAX_WINDOW;
use crate::connection::{Connection, Incoming};
use crate::error::RdtError;
use crate::packet::flags;
use crate::stats::SendStats;
use crate::stop_and_wait::idle_result;
use crate::strategy::{ReliabilityStrategy, SendUnit};
use crate::timer::RetransmitTimer;

#[derive(Debug, Clone, Copy)]
pub struct SelectiveRepeat {
    window: u8,
}

impl SelectiveRepeat {
    /// The window is clamped to `1..=MAX_WINDOW` whatever the config says.
    pub fn new(window: u8) -> Self {
        Self {
            window: window.clamp(1, MAX_WINDOW),
        }
    }

    pub fn window(&self) -> u8 {
        self.window
    }

    async fn pump(
        &self,
        conn: &mut Connection,
        units: &mut [SendUnit],
        stats: &mut SendStats,
    ) -> Result<(), RdtError> {
        let window = usize::from(self.window);
        let mut timer = RetransmitTimer::new(&conn.timer);
        // seqnum -> index into `units`
        let mut outstanding: BTreeMap<u8, usize> = BTreeMap::new();
        let mut base = 0usize;
        let mut next = 0usize;

        while base < units.len() {
            while next < units.len() && next < base + window {
                let unit = &mut units[next];
                conn.transmit_with_faults(&unit.packet, stats).await?;
                unit.tx_count = 1;
                stats.transmits += 1;
                if outstanding.is_empty() {
                    timer.arm();
                }
                outstanding.insert(unit.seqnum, next);
                log::debug!("[sr] → DATA seq={} in_flight={}", unit.seqnum, outstanding.len());
                next += 1;
            }

            match conn.wait(timer.deadline()).await? {
                Incoming::TimedOut => {
                    stats.timeouts += 1;
                    timer.on_timeout()?;
                    let mut pending: Vec<usize> = outstanding.values().copied().collect();
                    pending.sort_unstable();
                    log::debug!("[sr] timeout: retransmitting {} frames", pending.len());
                    for idx in pending {
                        let unit = &mut units[idx];
                        conn.transmit_with_faults(&unit.packet, stats).await?;
                        unit.tx_count += 1;
                        stats.retransmits += 1;
                    }
                    timer.arm();
                }
                Incoming::Corrupt(e) => log::debug!("[sr] dropped frame: {e}"),
                Incoming::Frame(pkt) if pkt.has(flags::ACK) && !pkt.has(flags::SYN) => {
                    let Some(idx) = outstanding.remove(&pkt.header.acknum) else {
                        log::trace!("[sr] ← stale ACK ack={}", pkt.header.acknum);
                        continue;
                    };
                    units[idx].acked = true;
                    timer.on_progress();
                    timer.arm();
                    while base < units.len() && units[base].acked {
                        base += 1;
                        conn.loc_seq = conn.loc_seq.wrapping_add(1);
                    }
                    log::debug!("[sr] ← ACK ack={} base={base}", pkt.header.acknum);
                }
                Incoming::Frame(pkt) => {
                    conn.answer_stray(&pkt).await?;
                    if conn.state.is_remote_closed() {
                        return Err(RdtError::PeerClosed);
                    }
                }
            }
        }
        Ok(())
    }
}

impl ReliabilityStrategy for SelectiveRepeat {
    async fn send_chunks(
        &mut self,
        conn: &mut Connection,
        units: &mut [SendUnit],
    ) -> Result<(), RdtError> {
        let started = StdInstant::now();
        let mut stats = SendStats::default();
        let result = self.pump(conn, units, &mut stats).await;
        stats.log_summary(started.elapsed());
        conn.send_stats = Some(stats);
        result
    }

    async fn receive_chunks(
        &mut self,
        conn: &mut Connection,
        out: &mut [u8],
        mut filled: usize,
    ) -> Result<usize, RdtError> {
        let mut timer = RetransmitTimer::new(&conn.timer);

        while filled < out.len() {
            let low = conn.rem_seq.wrapping_add(1);
            if let Some(payload) = conn.reorder.remove(&low) {
                filled = conn.deliver(&payload, out, filled);
                conn.rem_seq = low;
                continue;
            }

            let pkt = match conn.wait(timer.deadline()).await? {
                Incoming::TimedOut => {
                    if timer.on_timeout().is_err() {
                        return idle_result(filled);
                    }
                    timer.arm();
                    continue;
                }
                Incoming::Corrupt(e) => {
                    log::debug!("[sr] dropped frame: {e}");
                    continue;
                }
                Incoming::Frame(pkt) => pkt,
            };

            if pkt.has(flags::FIN) {
                conn.ack(pkt.header.seqnum).await?;
                conn.state = conn.state.on_remote_fin();
                log::debug!("[sr] ← FIN seq={}; → ACK", pkt.header.seqnum);
                break;
            }
            if !pkt.is_data() {
                conn.answer_stray(&pkt).await?;
                continue;
            }

            let seq = pkt.header.seqnum;
            match classify(seq, low, self.window) {
                Band::Window => {
                    conn.ack(seq).await?;
                    if conn.reorder.insert(seq, pkt.payload).is_none() {
                        conn.receive_stats.accepted += 1;
                    } else {
                        conn.receive_stats.duplicates += 1;
                    }
                    timer.on_progress();
                    timer.arm();
                    log::debug!("[sr] ← DATA seq={seq} low={low}; → ACK");
                }
                Band::Delivered => {
                    conn.ack(seq).await?;
                    conn.receive_stats.duplicates += 1;
                    log::debug!("[sr] ← duplicate DATA seq={seq}; → ACK");
                }
                Band::Outside => {
                    conn.receive_stats.out_of_window += 1;
                    log::debug!("[sr] ← DATA seq={seq} outside window low={low}; dropped");
                }
            }
        }
        Ok(filled)
    }
}

/// Where a data frame's sequence number falls relative to the receive window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    /// `[low, low+W)`
    Window,
    /// `[low-W, low)`
    Delivered,
    Outside,
}

fn classify(seq: u8, low: u8, window: u8) -> Band {
    if seq.wrapping_sub(low) < window {
        Band::Window
    } else if low.wrapping_sub(seq) <= window {
        Band::Delivered
    } else {
        Band::Outside
    }
}

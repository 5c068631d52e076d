//! Transfer counters.

use std::time::Duration;

/// Counters for one `send` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SendStats {
    /// First transmissions of a unit.
    pub transmits: u64,
    /// Repeat transmissions after a timeout.
    pub retransmits: u64,
    /// Retransmit deadlines that expired.
    pub timeouts: u64,
    /// Frame bytes handed to the socket (including retransmissions).
    pub bytes_sent: u64,
    /// Transmissions deliberately corrupted by the fault injector.
    pub corruptions: u64,
    /// Transmissions deliberately dropped by the fault injector.
    pub drops: u64,
}

impl SendStats {
    pub fn log_summary(&self, elapsed: Duration) {
        log::info!(
            "[sr] sent: {} tx, {} retx, {} timeouts, {} bytes, {} corrupted, {} dropped in {:.3}s",
            self.transmits,
            self.retransmits,
            self.timeouts,
            self.bytes_sent,
            self.corruptions,
            self.drops,
            elapsed.as_secs_f64()
        );
    }
}

/// Counters accumulated by the receive path over a connection's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveStats {
    /// Data frames accepted (delivered or buffered).
    pub accepted: u64,
    /// Already-delivered frames that were re-ACKed.
    pub duplicates: u64,
    /// Frames outside the receive window, dropped without ACK.
    pub out_of_window: u64,
    /// Frames that failed length or checksum verification.
    pub corrupt: u64,
}

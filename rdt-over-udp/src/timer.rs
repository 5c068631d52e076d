//! Retransmission deadline and retry budget.
//!
//! There are no background timers: every loop that may need to retransmit
//! waits for a datagram until a deadline held by a [`RetransmitTimer`].  When
//! the deadline passes the loop retransmits and charges one retry; once
//! [`TimerConfig::max_retries`] consecutive retries have been spent without
//! progress the loop gives up with [`RdtError::PeerUnreachable`].

use std::time::Duration;

use tokio::time::Instant;

use crate::error::RdtError;

/// Adjustable timeout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// How long to wait for a datagram before retransmitting.
    pub timeout: Duration,
    /// Consecutive retransmissions allowed without progress.
    pub max_retries: u32,
    /// Local receive failures tolerated while waiting for a FIN's ACK.
    pub read_error_retries: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            max_retries: 10,
            read_error_retries: 3,
        }
    }
}

/// Deadline plus retry counter for one retransmission loop.
#[derive(Debug)]
pub struct RetransmitTimer {
    timeout: Duration,
    max_retries: u32,
    retries: u32,
    deadline: Instant,
}

impl RetransmitTimer {
    /// Create a timer armed from now.
    pub fn new(config: &TimerConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_retries: config.max_retries,
            retries: 0,
            deadline: Instant::now() + config.timeout,
        }
    }

    /// Restart the deadline from now.
    pub fn arm(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Charge one retry.
    ///
    /// Fails once the budget is spent; otherwise the caller retransmits and
    /// re-arms.
    pub fn on_timeout(&mut self) -> Result<(), RdtError> {
        self.retries += 1;
        if self.retries > self.max_retries {
            return Err(RdtError::PeerUnreachable {
                retries: self.max_retries,
            });
        }
        Ok(())
    }

    /// The peer answered: refill the budget.
    pub fn on_progress(&mut self) {
        self.retries = 0;
    }

    /// Retries charged since the last progress.
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

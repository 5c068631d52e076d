//! Engine configuration.
//!
//! One [`RdtConfig`] is handed to an [`crate::table::RdtTable`]; every
//! connection created by that table starts from a copy of it.

use std::time::Duration;

use crate::simulator::FaultConfig;
use crate::timer::TimerConfig;

/// Largest selective-repeat window that keeps sequence numbers unambiguous
/// modulo 256.
pub const MAX_WINDOW: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RdtConfig {
    /// Receive timeout and retry budget.
    pub timer: TimerConfig,
    /// Selective-repeat window, in frames.
    pub window: u8,
    /// Fault injection applied by the selective-repeat sender.
    pub faults: FaultConfig,
}

impl Default for RdtConfig {
    fn default() -> Self {
        Self {
            timer: TimerConfig::default(),
            window: 8,
            faults: FaultConfig::default(),
        }
    }
}

impl RdtConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timer.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.timer.max_retries = max_retries;
        self
    }

    /// Set the window, clamped to `1..=MAX_WINDOW`.
    pub fn with_window(mut self, window: u8) -> Self {
        self.window = window.clamp(1, MAX_WINDOW);
        self
    }

    pub fn with_faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }
}

//! Fault injection for exercising the reliability strategies.
//!
//! Real networks drop and damage datagrams, but loopback almost never does.
//! The [`FaultInjector`] sits between the selective-repeat sender and the
//! socket and applies a configurable fault model to each outgoing frame:
//!
//! | Fault       | Description                                          |
//! |-------------|------------------------------------------------------|
//! | Corruption  | Flip one random payload bit with `corrupt_rate`.     |
//! | Loss        | Do not send the frame at all with `drop_rate`.       |
//!
//! Corruption is applied after the checksum has been computed, so the
//! receiver sees a checksum failure and the sender's timeout drives the
//! retransmission.  A `seed` makes runs reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::{FRAME_LEN, HEADER_LEN, PAYLOAD_LEN};

/// Configuration for the fault model.
///
/// Probabilities are in `[0.0, 1.0]`; anything else is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaultConfig {
    /// Probability that a frame gets one payload bit flipped.
    pub corrupt_rate: f64,
    /// Probability that a frame is silently not sent.
    pub drop_rate: f64,
    /// Seed for the fault RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Outcome of passing a frame through the injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    Corrupted,
    Dropped,
}

#[derive(Debug)]
pub struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
}

impl FaultInjector {
    pub fn new(config: FaultConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng }
    }

    /// `true` when no fault can ever fire.
    pub fn is_transparent(&self) -> bool {
        !can_fire(self.config.corrupt_rate) && !can_fire(self.config.drop_rate)
    }

    /// Apply the fault model to an encoded frame, possibly in place.
    pub fn apply(&mut self, frame: &mut [u8; FRAME_LEN]) -> Fault {
        if self.roll(self.config.drop_rate) {
            return Fault::Dropped;
        }
        if self.roll(self.config.corrupt_rate) {
            let byte = HEADER_LEN + self.rng.random_range(0..PAYLOAD_LEN);
            let bit = self.rng.random_range(0..8u8);
            frame[byte] ^= 1 << bit;
            return Fault::Corrupted;
        }
        Fault::None
    }

    fn roll(&mut self, p: f64) -> bool {
        can_fire(p) && self.rng.random_bool(p.min(1.0))
    }
}

/// Positive probability; NaN never fires.
fn can_fire(p: f64) -> bool {
    p > 0.0
}

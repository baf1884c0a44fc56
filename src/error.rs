//! Configuration rejection errors.
//!
//! `config()` is the only fallible entry point on the public surface —
//! push/pop/skip never fail (spec §7). Every other recoverable condition is
//! a counted diagnostic event, not a `Result`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("channels ({channels}) x buffer size ({buffer}) exceeds reserved capacity ({capacity})")]
    CapacityExceeded {
        channels: u32,
        buffer: usize,
        capacity: usize,
    },

    #[error("mode {0:#x} sets bits outside the known interpolation/filter/flag groups")]
    UnknownModeBits(u32),

    #[error("channel count must be >= 1, got {0}")]
    ZeroChannels(u32),

    #[error("rate must be finite and positive, got {0}")]
    NonFiniteRate(f32),

    #[error("custom FIR filter selected but no taps have been supplied via set_fir_taps()")]
    MissingFirTaps,
}

//! Input filter chain dispatch.
//!
//! spec.md §4.B composes up to two stages: an anti-alias low-pass (single or
//! cascaded biquad) followed by an optional rate-changing FIR stage
//! (polyphase 2× oversampler or user-supplied custom taps). Like
//! [`crate::interp::Interpolator`], the stage choice is resolved once at
//! `config()` time from [`crate::config::Mode`] rather than re-dispatched
//! per sample.

pub mod biquad;
pub mod fir;

use crate::config::{Config, Mode};
use crate::error::ConfigError;
use biquad::{Biquad, Biquad2};
use fir::{CustomFir, Fir2x};

#[derive(Debug, Clone)]
enum LowpassStage {
    None,
    Single(Biquad),
    Cascaded(Biquad2),
}

#[derive(Debug, Clone)]
enum RateStage {
    None,
    Oversample2x(Fir2x),
    Custom(CustomFir),
}

/// The full per-channel input filter chain. Owns its own state per channel
/// index, so a single instance serves every channel in the stream.
#[derive(Debug, Clone)]
pub struct FilterChain {
    lowpass: LowpassStage,
    rate: RateStage,
}

impl FilterChain {
    /// Builds the chain from `config.mode`'s `FILTER_*` bits.
    ///
    /// If `FILTER_BIQUAD` and `FILTER_BIQUAD2` are both set, the cascaded
    /// (steeper) form wins (spec.md §4.B, §7: not an error). `FILTER_FIR`
    /// (custom taps) takes priority over `FILTER_FIR2X` when both are set,
    /// since custom taps are an explicit user choice; `FILTER_FIR` with no
    /// taps supplied is rejected.
    pub fn new(config: &Config, custom_taps: Option<&[f32]>) -> Result<Self, ConfigError> {
        let bits = config.mode.filter_bits();
        let channels = config.channels as usize;

        let lowpass = if bits & Mode::FILTER_BIQUAD2 != 0 {
            LowpassStage::Cascaded(Biquad2::lowpass(channels, cutoff_hz(config), config.in_rate))
        } else if bits & Mode::FILTER_BIQUAD != 0 {
            LowpassStage::Single(Biquad::lowpass(channels, cutoff_hz(config), config.in_rate))
        } else {
            LowpassStage::None
        };

        let rate = if bits & Mode::FILTER_FIR != 0 {
            let taps = custom_taps.ok_or(ConfigError::MissingFirTaps)?;
            RateStage::Custom(CustomFir::new(channels, taps.to_vec()))
        } else if bits & Mode::FILTER_FIR2X != 0 {
            RateStage::Oversample2x(Fir2x::new(channels, config.in_rate, config.out_rate))
        } else {
            RateStage::None
        };

        Ok(Self { lowpass, rate })
    }

    /// Processes one input sample on `channel`. Returns one sample normally,
    /// or two when the 2× oversampler stage is active — the engine writes
    /// every returned sample into the ring buffer in order.
    #[inline]
    pub fn process(&mut self, input: f32, channel: usize) -> FilterOutput {
        let filtered = match &mut self.lowpass {
            LowpassStage::None => input,
            LowpassStage::Single(b) => b.process(input, channel),
            LowpassStage::Cascaded(b) => b.process(input, channel),
        };

        match &mut self.rate {
            RateStage::None => FilterOutput::One(filtered),
            RateStage::Oversample2x(f) => FilterOutput::Two(f.process(filtered, channel)),
            RateStage::Custom(f) => FilterOutput::One(f.process(filtered, channel)),
        }
    }

    /// Combined group delay of the active stages, in *input* samples, used
    /// to offset the initial read index so the first popped sample isn't
    /// drawn from the filters' startup transient (spec.md §3).
    pub fn group_delay_samples(&self) -> usize {
        let lp = match &self.lowpass {
            LowpassStage::None => 0,
            // Biquads are IIR: no finite group delay to report, they settle.
            LowpassStage::Single(_) | LowpassStage::Cascaded(_) => 0,
        };
        let rate = match &self.rate {
            RateStage::None => 0,
            RateStage::Oversample2x(f) => f.group_delay_samples(),
            RateStage::Custom(f) => f.group_delay_samples(),
        };
        lp + rate
    }

    /// Whether the active rate stage doubles the sample count (affects how
    /// many ring buffer slots the engine must reserve per input sample).
    pub fn oversamples(&self) -> bool {
        matches!(self.rate, RateStage::Oversample2x(_))
    }

    pub fn reset(&mut self) {
        match &mut self.lowpass {
            LowpassStage::None => {}
            LowpassStage::Single(b) => b.reset(),
            LowpassStage::Cascaded(b) => b.reset(),
        }
        match &mut self.rate {
            RateStage::None => {}
            RateStage::Oversample2x(f) => f.reset(),
            RateStage::Custom(f) => f.reset(),
        }
    }
}

fn cutoff_hz(config: &Config) -> f32 {
    config.in_rate.min(config.out_rate) * 0.45
}

/// Result of filtering a single input sample.
pub enum FilterOutput {
    One(f32),
    Two([f32; 2]),
}

impl FilterOutput {
    pub fn as_slice(&self) -> &[f32] {
        match self {
            FilterOutput::One(s) => std::slice::from_ref(s),
            FilterOutput::Two(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filter_bits_is_passthrough() {
        let cfg = Config {
            mode: Mode::new(0),
            ..Config::default()
        };
        let mut chain = FilterChain::new(&cfg, None).unwrap();
        match chain.process(0.42, 0) {
            FilterOutput::One(v) => assert_eq!(v, 0.42),
            FilterOutput::Two(_) => panic!("expected single-sample output"),
        }
    }

    #[test]
    fn biquad2_wins_when_both_bits_set() {
        let cfg = Config {
            mode: Mode::new(Mode::FILTER_BIQUAD | Mode::FILTER_BIQUAD2),
            ..Config::default()
        };
        let chain = FilterChain::new(&cfg, None).unwrap();
        assert!(matches!(chain.lowpass, LowpassStage::Cascaded(_)));
    }

    #[test]
    fn fir_without_taps_is_rejected() {
        let cfg = Config {
            mode: Mode::new(Mode::FILTER_FIR),
            ..Config::default()
        };
        assert_eq!(FilterChain::new(&cfg, None).unwrap_err(), ConfigError::MissingFirTaps);
    }

    #[test]
    fn fir2x_doubles_output_per_input() {
        let cfg = Config {
            mode: Mode::new(Mode::FILTER_FIR2X),
            ..Config::default()
        };
        let mut chain = FilterChain::new(&cfg, None).unwrap();
        match chain.process(0.1, 0) {
            FilterOutput::Two(_) => {}
            FilterOutput::One(_) => panic!("expected oversampled output"),
        }
    }
}

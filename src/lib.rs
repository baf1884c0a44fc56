//! Sample-rate-adaptive resampling and timing-recovery engine.
//!
//! Accepts audio at a nominal input rate whose actual rate drifts against
//! the nominal output rate (independent clocks, network jitter, drifting
//! oscillators) and produces a continuous output stream at the output rate,
//! steering a ring buffer's occupancy back to its target via a PI-controlled
//! resample ratio rather than ever blocking or dropping whole blocks.

mod config;
mod diag;
mod engine;
mod error;
mod estimator;
mod filter;
mod interp;
mod ring;
mod tracker;

pub use config::{Config, Event, Mode, B, RATIO_MAX, RATIO_MIN};
pub use diag::{Chrono, DefaultHistogram, SystemChrono};
pub use engine::{f32_to_q31, q31_to_f32, Ats};
pub use error::ConfigError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_self_consistent() {
        let mut ats = Ats::new();
        assert!(ats.config(Config::default()).is_ok());
    }

    #[test]
    fn end_to_end_push_pop_holds_rough_rate() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.channels = 1;
        cfg.mode = Mode::new(Mode::INTERP_LINEAR | Mode::TRACKING_OFF);
        ats.config(cfg).unwrap();

        let input: Vec<f32> = (0..2000).map(|i| (i as f32 * 0.01).sin()).collect();
        ats.push(&input, input.len());

        let mut out = vec![0.0f32; 500];
        let produced = ats.pop(&mut out, 500);
        assert_eq!(produced, 500);
        assert!(out.iter().all(|s| s.is_finite()));
    }
}

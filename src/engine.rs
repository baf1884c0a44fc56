//! `Ats`: the orchestrator tying ring buffer, filter chain, interpolator,
//! rate estimators, and PI tracker into the push/pop engine spec.md §2
//! describes.
//!
//! Maximum total reserved storage (`channels * B`) is sanity-bounded the way
//! the teacher's ring/jitter buffers cap their own allocation against a
//! runaway channel count rather than trusting caller input unconditionally.

use crate::config::{Config, Event, Mode};
use crate::diag::{Chrono, DefaultHistogram, Diagnostics, SystemChrono};
use crate::error::ConfigError;
use crate::filter::{FilterChain, FilterOutput};
use crate::interp::Interpolator;
use crate::ring::RingBuffer;
use crate::tracker::Tracker;
use std::cell::Cell;

const MAX_TOTAL_SAMPLES: usize = 1 << 20;

/// Symmetric saturating f32 -> Q31 conversion: `+1.0` maps to `i32::MAX`,
/// `-1.0` maps to `-i32::MAX` (not `i32::MIN`), so the mapping has no single
/// value with no inverse.
pub fn f32_to_q31(x: f32) -> i32 {
    let scaled = (x.clamp(-1.0, 1.0) as f64) * i32::MAX as f64;
    scaled.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

pub fn q31_to_f32(x: i32) -> f32 {
    (x as f64 / i32::MAX as f64) as f32
}

/// Sample-rate-adaptive resampling and timing-recovery engine.
///
/// `Send` (may be handed off to another thread wholesale) but not `Sync`:
/// push/pop/skip/config all mutate shared interpolation-window state that
/// isn't safe to call concurrently from two threads, so callers must
/// externally serialize access — the crate does not attempt a lock-free
/// producer/consumer split the way the teacher's ring buffer does, since
/// interpolation taps straddle the read cursor in a way that split can't
/// express without unsafe aliasing (spec.md §5, §9 Open Questions).
pub struct Ats {
    config: Config,
    ring: RingBuffer,
    filter: FilterChain,
    interp: Interpolator,
    push_estimator: crate::estimator::RateEstimator,
    pop_estimator: crate::estimator::RateEstimator,
    tracker: Tracker,
    read_pos: f64,
    custom_fir_taps: Option<Vec<f32>>,
    chrono: Box<dyn Chrono + Send>,
    diag: Diagnostics,
    last_track_ts: Option<i64>,
    _not_sync: Cell<()>,
}

impl Ats {
    pub fn new() -> Self {
        let config = Config::default();
        let filter = FilterChain::new(&config, None).expect("default config is always valid");
        let ring = RingBuffer::new(config.channels as usize);
        let interp = Interpolator::from_mode(config.mode);
        let push_estimator = crate::estimator::RateEstimator::new(config.in_rate, config.filter_push);
        let pop_estimator = crate::estimator::RateEstimator::new(config.out_rate, config.filter_pop);
        let tracker = Tracker::new(&config);
        let read_pos = filter.group_delay_samples() as f64;
        Self {
            config,
            ring,
            filter,
            interp,
            push_estimator,
            pop_estimator,
            tracker,
            read_pos,
            custom_fir_taps: None,
            chrono: Box::new(SystemChrono),
            diag: Diagnostics::new(),
            last_track_ts: None,
            _not_sync: Cell::new(()),
        }
    }

    /// Supplies taps for `Mode::FILTER_FIR`. Must be called before
    /// `config()` selects that filter, else `config()` rejects it with
    /// [`ConfigError::MissingFirTaps`].
    pub fn set_fir_taps(&mut self, taps: Vec<f32>) {
        self.custom_fir_taps = Some(taps);
    }

    /// Overrides the time source used for rate estimation and diagnostic
    /// timestamps (default: wall clock). Intended for deterministic tests.
    pub fn set_chrono(&mut self, chrono: Box<dyn Chrono + Send>) {
        self.chrono = chrono;
    }

    fn validate(config: &Config, has_fir_taps: bool) -> Result<(), ConfigError> {
        if config.channels == 0 {
            return Err(ConfigError::ZeroChannels(config.channels));
        }
        if !config.in_rate.is_finite() || config.in_rate <= 0.0 {
            return Err(ConfigError::NonFiniteRate(config.in_rate));
        }
        if !config.out_rate.is_finite() || config.out_rate <= 0.0 {
            return Err(ConfigError::NonFiniteRate(config.out_rate));
        }
        if config.mode.has_unknown_bits() {
            return Err(ConfigError::UnknownModeBits(config.mode.0));
        }
        if config.mode.filter_bits() & Mode::FILTER_FIR != 0 && !has_fir_taps {
            return Err(ConfigError::MissingFirTaps);
        }
        let total = config.channels as usize * crate::config::B;
        if total > MAX_TOTAL_SAMPLES {
            return Err(ConfigError::CapacityExceeded {
                channels: config.channels,
                buffer: crate::config::B,
                capacity: MAX_TOTAL_SAMPLES,
            });
        }
        Ok(())
    }

    /// Applies a new configuration, rebuilding the ring buffer, filter
    /// chain, interpolator, estimators, and tracker. Rejects the
    /// configuration (leaving the engine in its previous, still-valid
    /// state) rather than partially applying it.
    pub fn config(&mut self, config: Config) -> Result<(), ConfigError> {
        Self::validate(&config, self.custom_fir_taps.is_some())?;
        let filter = FilterChain::new(&config, self.custom_fir_taps.as_deref())?;

        self.ring = RingBuffer::new(config.channels as usize);
        self.interp = Interpolator::from_mode(config.mode);
        self.push_estimator = crate::estimator::RateEstimator::new(config.in_rate, config.filter_push);
        self.pop_estimator = crate::estimator::RateEstimator::new(config.out_rate, config.filter_pop);
        self.tracker = Tracker::new(&config);
        // Offsets the initial read cursor by the filter chain's group delay
        // so the first pop doesn't draw from the filters' startup transient
        // (spec.md §3).
        self.read_pos = filter.group_delay_samples() as f64;
        self.last_track_ts = None;
        self.filter = filter;
        self.config = config;
        Ok(())
    }

    pub fn config_snapshot(&self) -> &Config {
        &self.config
    }

    /// Pushes `n_frames` interleaved frames from `input` (length at least
    /// `n_frames * channels`). Runs the input filter chain per channel;
    /// when a 2x oversampling stage is active, two ring buffer slots are
    /// written per input sample. Returns the number of previously-valid
    /// samples dropped to overrun, per channel.
    pub fn push(&mut self, input: &[f32], n_frames: usize) -> u64 {
        let channels = self.config.channels as usize;
        debug_assert!(input.len() >= n_frames * channels);

        self.diag.mark(Event::PushExec, self.chrono.timestamp());

        let factor = if self.filter.oversamples() { 2 } else { 1 };
        let produced = n_frames * factor;
        let mut interleaved = vec![0.0f32; produced * channels];

        for ch in 0..channels {
            let mut out_f = 0usize;
            for f in 0..n_frames {
                let x = input[f * channels + ch];
                match self.filter.process(x, ch) {
                    FilterOutput::One(s) => {
                        interleaved[out_f * channels + ch] = s;
                        out_f += 1;
                    }
                    FilterOutput::Two(s) => {
                        interleaved[out_f * channels + ch] = s[0];
                        interleaved[(out_f + 1) * channels + ch] = s[1];
                        out_f += 2;
                    }
                }
            }
        }

        let dropped = self.ring.write(&interleaved, produced, channels, 1);

        let ts = self.chrono.timestamp();
        self.push_estimator.update(n_frames as u32, ts);
        self.diag.count(Event::Push, n_frames as u32);
        self.diag.record(Event::PushRate, self.push_estimator.rate());
        self.diag.mark_elapsed(Event::PushExec, self.chrono.timestamp());
        dropped
    }

    pub fn skip(&mut self, n_frames: u64) {
        self.ring.advance_read(n_frames);
        self.read_pos = self.ring.read_ix() as f64;
    }

    pub fn depth(&self) -> u64 {
        self.ring.depth()
    }

    pub fn get_depth(&self) -> u64 {
        self.ring.depth()
    }

    /// Nudges the tracker's target occupancy. Per spec.md §9, this takes
    /// effect gradually via the tracker's own slew limiting rather than
    /// snapping the read cursor, so the very next `get_latency()` call will
    /// not yet reflect the new target exactly.
    pub fn set_depth(&mut self, target_samples: u32) {
        self.config.track_target = target_samples;
        self.tracker = Tracker::new(&self.config);
    }

    pub fn get_latency(&self) -> f32 {
        self.ring.depth() as f32 / self.config.out_rate
    }

    pub fn set_rate(&mut self, in_rate: f32, out_rate: f32) -> Result<(), ConfigError> {
        if !in_rate.is_finite() || in_rate <= 0.0 {
            return Err(ConfigError::NonFiniteRate(in_rate));
        }
        if !out_rate.is_finite() || out_rate <= 0.0 {
            return Err(ConfigError::NonFiniteRate(out_rate));
        }
        let mut cfg = self.config.clone();
        cfg.in_rate = in_rate;
        cfg.out_rate = out_rate;
        self.config(cfg)
    }

    pub fn get_rate(&self) -> (f32, f32) {
        (self.config.in_rate, self.config.out_rate)
    }

    pub fn track_reset(&mut self) {
        self.tracker.reset();
    }

    /// Pops `n_frames` interleaved frames into `out`. Always fills the full
    /// request: once the ring runs dry the interpolator extrapolates rather
    /// than truncating the call short (spec.md §4.6).
    pub fn pop(&mut self, out: &mut [f32], n_frames: usize) -> usize {
        let channels = self.config.channels as usize;
        debug_assert!(out.len() >= n_frames * channels);

        let now = self.chrono.timestamp();
        self.diag.mark(Event::PopExec, now);

        let dt_s = match self.last_track_ts.replace(now) {
            Some(prev) => ((now - prev).max(0) as f64) * 1e-9,
            None => 0.0,
        };

        let nominal_ratio = self.config.in_rate as f64 / self.config.out_rate as f64;
        let ratio_obs = self.push_estimator.rate() as f64 / self.pop_estimator.rate() as f64;

        // The PI correction is a dimensionless multiplier around ratio_obs;
        // with tracking off it is unity, leaving the per-sample step at
        // exactly the nominal inRate/outRate conversion factor.
        let ratio = if self.config.mode.tracking_off() {
            1.0
        } else {
            let depth = self.ring.depth();
            let update = self.tracker.update(depth, ratio_obs, dt_s);
            if update.reset_triggered {
                let target = self.config.track_target as u64;
                if depth > target {
                    self.ring.advance_read(depth - target);
                } else if depth < target {
                    let deficit = target - depth;
                    let new_ix = self.ring.read_ix().saturating_sub(deficit);
                    self.ring.set_read_ix(new_ix);
                }
                self.read_pos = self.ring.read_ix() as f64;
            }
            update.ratio
        };
        let step = nominal_ratio * ratio;

        if self.read_pos < self.ring.read_ix() as f64 {
            self.read_pos = self.ring.read_ix() as f64;
        }

        let mut underrun_frames = 0usize;
        for f in 0..n_frames {
            let mut frame_underrun = false;
            for ch in 0..channels {
                let (v, was_underrun) = self.interp.sample_or_extrapolate(&self.ring, ch, self.read_pos);
                out[f * channels + ch] = v;
                frame_underrun |= was_underrun;
            }
            if frame_underrun {
                underrun_frames += 1;
            }
            self.read_pos += step;
        }

        let new_read_ix = (self.read_pos.floor().max(0.0) as u64).min(self.ring.write_ix());
        if new_read_ix > self.ring.read_ix() {
            self.ring.advance_read(new_read_ix - self.ring.read_ix());
        }

        self.pop_estimator.update(n_frames as u32, now);
        self.diag.count(Event::Pop, n_frames as u32);
        self.diag.record(Event::PopRate, self.pop_estimator.rate());
        self.diag.record(Event::Depth, self.ring.depth() as f32);
        self.diag.record(Event::Offset, ((ratio_obs / nominal_ratio - 1.0) * 1e6) as f32);
        self.diag.record(Event::Latency, self.get_latency());
        self.diag.record(Event::Track, ratio as f32);
        if underrun_frames > 0 {
            self.diag.count(Event::UnderRun, 1);
            self.diag.record(Event::UnderRunSize, underrun_frames as f32);
        }
        self.diag.mark_elapsed(Event::PopExec, self.chrono.timestamp());
        n_frames
    }

    /// Q31 convenience wrapper over [`Ats::push`].
    pub fn push_q31(&mut self, input: &[i32], n_frames: usize) -> u64 {
        let buf: Vec<f32> = input.iter().map(|&s| q31_to_f32(s)).collect();
        self.push(&buf, n_frames)
    }

    /// Q31 convenience wrapper over [`Ats::pop`].
    pub fn pop_q31(&mut self, out: &mut [i32], n_frames: usize) -> usize {
        let channels = self.config.channels as usize;
        let mut buf = vec![0.0f32; n_frames * channels];
        let produced = self.pop(&mut buf, n_frames);
        for (dst, &src) in out.iter_mut().zip(buf.iter()) {
            *dst = f32_to_q31(src);
        }
        produced
    }

    pub fn diag_reset(&mut self, event: Option<Event>) {
        self.diag.reset(event);
    }

    pub fn diag_default(&mut self, bins: usize, t: f32) {
        self.diag.default_ranges(bins, t);
    }

    pub fn histogram(&self, event: Event) -> &DefaultHistogram {
        self.diag.histogram(event)
    }

    /// One-shot human-readable status snapshot, the equivalent of the
    /// original header's `trace(FILE*)` dump.
    pub fn trace(&self) -> String {
        format!(
            "depth={} target={} ratio={:.6} latency={:.4}s push_rate={:.1} pop_rate={:.1}",
            self.ring.depth(),
            self.config.track_target,
            self.tracker.ratio(),
            self.get_latency(),
            self.push_estimator.rate(),
            self.pop_estimator.rate(),
        )
    }
}

impl Default for Ats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn q31_roundtrip_is_symmetric_saturating() {
        assert_eq!(f32_to_q31(1.0), i32::MAX);
        assert_eq!(f32_to_q31(-1.0), -i32::MAX);
        assert_eq!(f32_to_q31(2.0), i32::MAX);
        assert_eq!(f32_to_q31(-2.0), -i32::MAX);
        assert!((q31_to_f32(i32::MAX) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn push_then_pop_round_trips_samples_with_hold_interpolation() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.mode = Mode::new(Mode::INTERP_HOLD | Mode::TRACKING_OFF);
        cfg.channels = 1;
        ats.config(cfg).unwrap();

        let input: Vec<f32> = (0..256).map(|i| i as f32).collect();
        ats.push(&input, input.len());

        let mut out = vec![0.0f32; 100];
        let n = ats.pop(&mut out, 100);
        assert_eq!(n, 100);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 1.0);
    }

    #[test]
    fn config_rejects_unknown_mode_bits() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.mode = Mode::new(0xDEAD_0000);
        assert!(matches!(ats.config(cfg), Err(ConfigError::UnknownModeBits(_))));
    }

    #[test]
    fn config_rejects_zero_channels() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.channels = 0;
        assert!(matches!(ats.config(cfg), Err(ConfigError::ZeroChannels(0))));
    }

    #[test]
    fn config_rejects_custom_fir_without_taps() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.mode = Mode::new(Mode::FILTER_FIR);
        assert_eq!(ats.config(cfg).unwrap_err(), ConfigError::MissingFirTaps);
    }

    #[test]
    fn config_accepts_custom_fir_once_taps_supplied() {
        let mut ats = Ats::new();
        ats.set_fir_taps(vec![1.0]);
        let mut cfg = Config::default();
        cfg.mode = Mode::new(Mode::FILTER_FIR);
        assert!(ats.config(cfg).is_ok());
    }

    #[test]
    fn depth_reflects_pushed_minus_popped() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.channels = 1;
        cfg.mode = Mode::new(Mode::INTERP_HOLD | Mode::TRACKING_OFF);
        ats.config(cfg).unwrap();

        ats.push(&vec![0.0f32; 1000], 1000);
        assert_eq!(ats.depth(), 1000);

        let mut out = vec![0.0f32; 100];
        ats.pop(&mut out, 100);
        assert_eq!(ats.depth(), 900);
    }

    #[test]
    fn skip_advances_without_producing_output() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.channels = 1;
        ats.config(cfg).unwrap();
        ats.push(&vec![0.0f32; 500], 500);
        ats.skip(200);
        assert_eq!(ats.depth(), 300);
    }

    #[test]
    fn half_rate_stretch_doubles_output_tone_frequency() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.channels = 1;
        cfg.in_rate = 48_000.0;
        cfg.out_rate = 24_000.0;
        cfg.mode = Mode::new(Mode::INTERP_HOLD | Mode::TRACKING_OFF);
        ats.config(cfg).unwrap();

        let input: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        ats.push(&input, input.len());

        let mut out = vec![0.0f32; 100];
        let n = ats.pop(&mut out, 100);
        assert_eq!(n, 100);
        // Each output sample steps 2 input samples (inRate/outRate = 2), so
        // a 1 kHz input tone becomes 2 kHz output.
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 2.0);
        assert_eq!(out[10], 20.0);
    }

    #[test]
    fn underrun_extrapolates_rest_of_call_instead_of_truncating() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.channels = 1;
        cfg.mode = Mode::new(Mode::INTERP_LINEAR | Mode::TRACKING_OFF);
        ats.config(cfg).unwrap();

        let input: Vec<f32> = (0..512).map(|i| i as f32).collect();
        ats.push(&input, input.len());

        let mut out = vec![0.0f32; 1024];
        let n = ats.pop(&mut out, 1024);
        assert_eq!(n, 1024);
        assert!(out.iter().all(|s| s.is_finite()));
        assert!((out[100] - 100.0).abs() < 1e-3);
        // Extrapolated tail continues the ramp's slope instead of freezing
        // or falling to silence.
        assert!((out[1000] - 1000.0).abs() < 2.0);
        assert!(ats.histogram(Event::UnderRun).n() >= 1);
        assert!(ats.histogram(Event::UnderRunSize).mean() >= 400.0);
    }

    #[test]
    fn depth_divergence_triggers_reset_and_drops_toward_target() {
        let mut ats = Ats::new();
        let mut cfg = Config::default();
        cfg.channels = 1;
        cfg.mode = Mode::new(Mode::INTERP_HOLD);
        cfg.track_target = 1024;
        cfg.track_range = 200;
        ats.config(cfg).unwrap();

        ats.push(&vec![0.0f32; 1300], 1300);
        assert_eq!(ats.depth(), 1300);

        let mut out = vec![0.0f32; 1];
        ats.pop(&mut out, 1);
        assert!(ats.depth() <= 1024, "depth={}", ats.depth());
    }
}

//! PI (proportional-integral) occupancy tracker with quadratic warp.
//!
//! The controller shape — proportional term for immediate response, integral
//! term for steady-state bias, both expressed in ppm, with the integral
//! clamped against windup — is the one the teacher's AES67 input stream uses
//! to trim its consume rate against buffer occupancy
//! (`bass-aes67/src/input/stream.rs::read_samples`, `KP`/`KI`/
//! `integral_error`/`MAX_TRIM_PPM`). spec.md adds the quadratic warp: the
//! proportional gain is attenuated as error grows past `track_warp`, so a
//! large transient occupancy swing doesn't slam the ratio to its rail the
//! way a plain linear P term would.

use crate::config::{Config, RATIO_MAX, RATIO_MIN};

#[derive(Debug, Clone)]
pub struct Tracker {
    kp: f64,
    ki: f64,
    warp: f64,
    max_slew_ppm_per_s: f64,
    target: f64,
    range: f64,
    tracking_off: bool,

    integral_ppm_s: f64,
    ratio: f64,
    last_ppm: f64,
}

/// Result of one [`Tracker::update`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerUpdate {
    /// The resample ratio to apply for this pop call.
    pub ratio: f64,
    /// Whether `|error| > track_range` fired a divergence reset this call.
    /// When `true`, the caller must reposition `readIx`/phase per spec.md
    /// §4.6 (drop if `depth > target`, duplicate if `depth < target`) — the
    /// tracker itself has no access to the ring.
    pub reset_triggered: bool,
}

impl Tracker {
    pub fn new(config: &Config) -> Self {
        Self {
            kp: config.track_kp as f64,
            ki: config.track_ki as f64,
            warp: (config.track_warp as f64).max(1e-6),
            max_slew_ppm_per_s: config.track_rate as f64,
            target: config.track_target as f64,
            range: config.track_range as f64,
            tracking_off: config.mode.tracking_off(),
            integral_ppm_s: 0.0,
            ratio: 1.0,
            last_ppm: 0.0,
        }
    }

    /// Folds in the current ring buffer occupancy (`depth`, in samples), the
    /// observed clock ratio `ratio_obs = inRate_est / outRate_est`, and
    /// elapsed time (`dt_s`, seconds) since the previous call.
    ///
    /// Implements spec.md §4.E steps 1-6: error, divergence-reset detection,
    /// quadratic-warp proportional gain, clamped integral accumulation,
    /// `ratio_target = ratio_obs * (1 + (Kp_eff*e + I) * 1e-6)`, and
    /// slew-rate-limited final clamp to `[ratio_min, ratio_max]`.
    pub fn update(&mut self, depth: u64, ratio_obs: f64, dt_s: f64) -> TrackerUpdate {
        if self.tracking_off {
            self.ratio = 1.0;
            return TrackerUpdate {
                ratio: self.ratio,
                reset_triggered: false,
            };
        }

        let error = depth as f64 - self.target;

        if self.range > 0.0 && error.abs() > self.range {
            self.integral_ppm_s = 0.0;
            self.last_ppm = 0.0;
            self.ratio = ratio_obs.clamp(RATIO_MIN, RATIO_MAX);
            return TrackerUpdate {
                ratio: self.ratio,
                reset_triggered: true,
            };
        }

        let kp_eff = self.kp / (1.0 + (error / self.warp).powi(2));

        if dt_s > 0.0 {
            self.integral_ppm_s += error * dt_s;
        }
        let max_integral = if self.ki.abs() > 1e-12 {
            (RATIO_MAX - 1.0) * 1e6 / self.ki
        } else {
            0.0
        };
        self.integral_ppm_s = self.integral_ppm_s.clamp(-max_integral.abs(), max_integral.abs());

        let target_ppm = kp_eff * error + self.ki * self.integral_ppm_s;
        let ratio_target = ratio_obs * (1.0 + target_ppm * 1e-6);
        let target_total_ppm = (ratio_target / ratio_obs - 1.0) * 1e6;

        let ppm = if dt_s > 0.0 {
            let max_step = self.max_slew_ppm_per_s * dt_s;
            (target_total_ppm - self.last_ppm).clamp(-max_step, max_step) + self.last_ppm
        } else {
            target_total_ppm
        };
        self.last_ppm = ppm;

        self.ratio = (ratio_obs * (1.0 + ppm / 1e6)).clamp(RATIO_MIN, RATIO_MAX);
        TrackerUpdate {
            ratio: self.ratio,
            reset_triggered: false,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Full reset to defaults — used by `Ats::track_reset()` (spec.md §4.F:
    /// "clears tracker integral, resets phi and smoothed estimators").
    /// Distinct from the in-`update()` divergence reset, which sets `ratio`
    /// to the observed ratio rather than unity.
    pub fn reset(&mut self) {
        self.integral_ppm_s = 0.0;
        self.last_ppm = 0.0;
        self.ratio = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    fn cfg() -> Config {
        Config {
            track_target: 1000,
            track_range: 0,
            track_kp: 2.0,
            track_ki: 0.1,
            track_warp: 10.0,
            track_rate: 1_000_000.0, // effectively unlimited slew for these tests
            ..Config::default()
        }
    }

    #[test]
    fn at_target_ratio_tracks_observed_ratio() {
        let mut t = Tracker::new(&cfg());
        assert_eq!(t.update(1000, 1.0, 0.01).ratio, 1.0);
        assert!((t.update(1000, 1.0002, 0.01).ratio - 1.0002).abs() < 1e-9);
    }

    #[test]
    fn above_target_speeds_up() {
        let mut t = Tracker::new(&cfg());
        let r = t.update(1200, 1.0, 0.01).ratio;
        assert!(r > 1.0, "ratio={r}");
    }

    #[test]
    fn below_target_slows_down() {
        let mut t = Tracker::new(&cfg());
        let r = t.update(800, 1.0, 0.01).ratio;
        assert!(r < 1.0, "ratio={r}");
    }

    #[test]
    fn large_error_is_attenuated_by_warp_relative_to_linear_extrapolation() {
        let mut t = Tracker::new(&cfg());
        let error = 5000.0;
        let r = t.update(1000.0 as u64 + error as u64, 1.0, 0.0001).ratio;
        let linear_ppm = 2.0 * error;
        let actual_ppm = (r - 1.0) * 1e6;
        assert!(actual_ppm.abs() < linear_ppm.abs(), "warp should attenuate: actual={actual_ppm} linear={linear_ppm}");
    }

    #[test]
    fn ratio_is_clamped_to_configured_range() {
        let mut t = Tracker::new(&cfg());
        for _ in 0..10_000 {
            t.update(1_000_000, 1.0, 0.01);
        }
        assert!(t.ratio() <= RATIO_MAX);
    }

    #[test]
    fn tracking_off_always_returns_unity() {
        let mut c = cfg();
        c.mode = Mode::new(Mode::TRACKING_OFF);
        let mut t = Tracker::new(&c);
        assert_eq!(t.update(5000, 1.1, 0.01).ratio, 1.0);
    }

    #[test]
    fn reset_clears_integral_and_ratio() {
        let mut t = Tracker::new(&cfg());
        t.update(1200, 1.0, 0.01);
        t.update(1200, 1.0, 0.01);
        t.reset();
        assert_eq!(t.ratio(), 1.0);
    }

    #[test]
    fn divergence_past_track_range_resets_to_observed_ratio() {
        let mut c = cfg();
        c.track_range = 100;
        let mut t = Tracker::new(&c);
        t.update(1050, 1.0, 0.01);
        let result = t.update(5000, 1.0003, 0.01);
        assert!(result.reset_triggered);
        assert!((result.ratio - 1.0003).abs() < 1e-9);
    }
}

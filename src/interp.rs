//! Output-side interpolation.
//!
//! Resolved once at `config()` time from [`crate::config::Mode`]'s
//! `INTERP_*` bits into a tagged enum — no virtual dispatch per sample, same
//! shape as the teacher's filter-stage selection. Cubic and quintic taps are
//! Catmull-Rom and Olli Niemitalo's "deip" 6-point optimal polynomial
//! respectively; both are well-known public-domain coefficient sets, not
//! lifted from any single file in the pack.

use crate::config::Mode;
use crate::ring::RingBuffer;

#[derive(Debug, Clone, Copy)]
pub enum Interpolator {
    Hold,
    Linear,
    Spline3,
    Spline5,
}

impl Interpolator {
    pub fn from_mode(mode: Mode) -> Self {
        match mode.interp_bits() {
            Mode::INTERP_LINEAR => Interpolator::Linear,
            Mode::INTERP_SPLINE3 => Interpolator::Spline3,
            Mode::INTERP_SPLINE5 => Interpolator::Spline5,
            _ => Interpolator::Hold,
        }
    }

    /// Number of samples before `floor(pos)` and after it that must be
    /// resident in the ring buffer for this interpolator to avoid falling
    /// back to extrapolation.
    pub fn taps_before_after(self) -> (u64, u64) {
        match self {
            Interpolator::Hold => (0, 0),
            Interpolator::Linear => (0, 1),
            Interpolator::Spline3 => (1, 2),
            Interpolator::Spline5 => (2, 3),
        }
    }

    /// Reads the interpolated value at fractional position `pos` (in ring
    /// buffer index units) for `channel`. Taps outside
    /// `[ring.read_ix(), ring.write_ix())` fall back to the nearest
    /// in-range sample (zero-order hold extrapolation, spec.md §4.6).
    pub fn sample(self, ring: &RingBuffer, channel: usize, pos: f64) -> f32 {
        let base = pos.floor() as i64;
        let frac = (pos - base as f64) as f32;

        let tap = |offset: i64| -> f32 {
            let ix = base + offset;
            let clamped = clamp_to_resident(ring, ix);
            ring.sample(channel, clamped)
        };

        match self {
            Interpolator::Hold => tap(0),
            Interpolator::Linear => {
                let y0 = tap(0);
                let y1 = tap(1);
                y0 + (y1 - y0) * frac
            }
            Interpolator::Spline3 => catmull_rom(tap(-1), tap(0), tap(1), tap(2), frac),
            Interpolator::Spline5 => {
                quintic(tap(-2), tap(-1), tap(0), tap(1), tap(2), tap(3), frac)
            }
        }
    }

    /// Like [`Interpolator::sample`], but on underrun (the required right-hand
    /// tap is not yet resident — `readIx + tapRight > writeIx`) falls back to
    /// extrapolation rather than clamping: linear extrapolation from the last
    /// two valid samples for order >= 1 interpolators, zero-order hold for
    /// [`Interpolator::Hold`] (spec.md §4.6). Returns `(value, was_underrun)`.
    pub fn sample_or_extrapolate(self, ring: &RingBuffer, channel: usize, pos: f64) -> (f32, bool) {
        let (_, tap_right) = self.taps_before_after();
        let base = pos.floor() as i64;
        let last_valid = ring.write_ix() as i64 - 1;

        if base + tap_right as i64 <= last_valid {
            return (self.sample(ring, channel, pos), false);
        }
        if last_valid < 0 {
            return (0.0, true);
        }

        let last_valid = last_valid as u64;
        let y_last = ring.sample(channel, last_valid);
        if matches!(self, Interpolator::Hold) {
            return (y_last, true);
        }

        let y_prev = if last_valid > ring.read_ix() {
            ring.sample(channel, last_valid - 1)
        } else {
            y_last
        };
        let slope = (y_last - y_prev) as f64;
        let delta = pos - last_valid as f64;
        ((y_last as f64 + slope * delta) as f32, true)
    }
}

fn clamp_to_resident(ring: &RingBuffer, ix: i64) -> u64 {
    let lo = ring.read_ix();
    let hi = ring.write_ix().saturating_sub(1);
    if ix < 0 {
        lo
    } else {
        (ix as u64).clamp(lo, hi.max(lo))
    }
}

/// 4-point, 3rd-order Catmull-Rom interpolation.
fn catmull_rom(y_m1: f32, y0: f32, y1: f32, y2: f32, t: f32) -> f32 {
    let a0 = -0.5 * y_m1 + 1.5 * y0 - 1.5 * y1 + 0.5 * y2;
    let a1 = y_m1 - 2.5 * y0 + 2.0 * y1 - 0.5 * y2;
    let a2 = -0.5 * y_m1 + 0.5 * y1;
    let a3 = y0;
    ((a0 * t + a1) * t + a2) * t + a3
}

/// 6-point, 5th-order optimal interpolator (Niemitalo "deip" 4th-order
/// 6-point coefficient set), trading a little more compute for lower
/// passband ripple than the cubic form above.
fn quintic(y_m2: f32, y_m1: f32, y0: f32, y1: f32, y2: f32, y3: f32, t: f32) -> f32 {
    let c0 = y0;
    let c1 = 1.0 / 20.0 * y_m2 - 1.0 / 2.0 * y_m1 - 1.0 / 3.0 * y0 + y1 - 1.0 / 4.0 * y2 + 1.0 / 30.0 * y3;
    let c2 = -1.0 / 24.0 * y_m2 + 2.0 / 3.0 * y_m1 - 5.0 / 4.0 * y0 + 2.0 / 3.0 * y1 - 1.0 / 24.0 * y2;
    let c3 = 1.0 / 12.0 * y_m2 - 1.0 / 6.0 * y_m1 - 1.0 / 4.0 * y0 + 2.0 / 3.0 * y1 - 1.0 / 6.0 * y2 - 1.0 / 12.0 * y3;
    let c4 = 1.0 / 24.0 * y_m2 - 1.0 / 6.0 * y_m1 + 1.0 / 4.0 * y0 - 1.0 / 6.0 * y1 + 1.0 / 24.0 * y2;
    let c5 = -1.0 / 120.0 * y_m2 + 1.0 / 24.0 * y_m1 - 1.0 / 12.0 * y0 + 1.0 / 12.0 * y1 - 1.0 / 24.0 * y2 + 1.0 / 120.0 * y3;
    ((((c5 * t + c4) * t + c3) * t + c2) * t + c1) * t + c0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_ring(values: &[f32]) -> RingBuffer {
        let mut r = RingBuffer::new(1);
        r.write(values, values.len(), 1, 0);
        r
    }

    #[test]
    fn hold_returns_floor_sample() {
        let r = filled_ring(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(Interpolator::Hold.sample(&r, 0, 1.9), 2.0);
    }

    #[test]
    fn linear_interpolates_midpoint() {
        let r = filled_ring(&[0.0, 10.0]);
        assert!((Interpolator::Linear.sample(&r, 0, 0.5) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn spline3_reproduces_exact_samples_at_integer_positions() {
        let r = filled_ring(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        for i in 1..4 {
            let v = Interpolator::Spline3.sample(&r, 0, i as f64);
            assert!((v - (i as f32 + 1.0)).abs() < 1e-4, "pos {i} got {v}");
        }
    }

    #[test]
    fn spline5_reproduces_exact_samples_at_integer_positions() {
        let r = filled_ring(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        for i in 2..5 {
            let v = Interpolator::Spline5.sample(&r, 0, i as f64);
            assert!((v - (i as f32 + 1.0)).abs() < 1e-3, "pos {i} got {v}");
        }
    }

    #[test]
    fn out_of_range_tap_extrapolates_instead_of_panicking() {
        let r = filled_ring(&[1.0, 2.0, 3.0]);
        // Position right at the leading edge; Spline5 wants taps beyond
        // write_ix which don't exist yet.
        let v = Interpolator::Spline5.sample(&r, 0, 2.0);
        assert!(v.is_finite());
    }

    #[test]
    fn hold_underrun_holds_last_sample() {
        let r = filled_ring(&[1.0, 2.0, 3.0]);
        let (v, underrun) = Interpolator::Hold.sample_or_extrapolate(&r, 0, 5.0);
        assert!(underrun);
        assert_eq!(v, 3.0);
    }

    #[test]
    fn linear_underrun_extrapolates_along_last_slope() {
        let r = filled_ring(&[0.0, 1.0, 2.0, 3.0]);
        // write_ix=4, last valid tap for Linear (tap_right=1) is at pos<3.
        let (v, underrun) = Interpolator::Linear.sample_or_extrapolate(&r, 0, 4.0);
        assert!(underrun);
        assert!((v - 4.0).abs() < 1e-6, "expected slope continued to 4.0, got {v}");
    }

    #[test]
    fn in_range_position_is_not_flagged_as_underrun() {
        let r = filled_ring(&[0.0, 10.0, 20.0]);
        let (v, underrun) = Interpolator::Linear.sample_or_extrapolate(&r, 0, 0.5);
        assert!(!underrun);
        assert!((v - 5.0).abs() < 1e-6);
    }
}

//! Windowed rate estimation.
//!
//! The smoothing coefficient `alpha = 1 - exp(-n / W)` is the same
//! attack/release time-constant formula the teacher's dynamics code used
//! for its envelope followers, here driven by a sample count instead of a
//! wall-clock time constant: a burst of `n` samples advances the estimate
//! further than a single small arrival would.

/// Tracks a running estimate of the actual sample rate arriving via
/// `update()` calls, each reporting how many samples arrived and when.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    nominal: f32,
    window_samples: f64,
    rate: f32,
    last_ts_ns: Option<i64>,
}

impl RateEstimator {
    pub fn new(nominal_rate: f32, window_samples: u32) -> Self {
        Self {
            nominal: nominal_rate,
            window_samples: window_samples.max(1) as f64,
            rate: nominal_rate,
            last_ts_ns: None,
        }
    }

    /// Folds in a batch of `n_samples` arriving at `timestamp_ns`. Returns
    /// the (possibly unchanged) smoothed rate estimate.
    ///
    /// Rejects the sample as a glitch, keeping the previous estimate
    /// unchanged, when: no samples arrived, the clock didn't advance
    /// (`timestamp_ns <= previous`), or the instantaneous rate implied by
    /// this batch deviates from the current estimate by more than 4x.
    pub fn update(&mut self, n_samples: u32, timestamp_ns: i64) -> f32 {
        if n_samples == 0 {
            return self.rate;
        }
        let prev_ts = match self.last_ts_ns.replace(timestamp_ns) {
            Some(p) => p,
            None => return self.rate,
        };

        let dt_ns = timestamp_ns - prev_ts;
        if dt_ns <= 0 {
            return self.rate;
        }

        let dt_s = dt_ns as f64 * 1e-9;
        let instantaneous = n_samples as f64 / dt_s;
        let current = self.rate as f64;
        if instantaneous > current * 4.0 || instantaneous < current / 4.0 {
            return self.rate;
        }

        let alpha = 1.0 - (-(n_samples as f64) / self.window_samples).exp();
        self.rate = (current + alpha * (instantaneous - current)) as f32;
        self.rate
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn reset(&mut self) {
        self.rate = self.nominal;
        self.last_ts_ns = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_toward_steady_instantaneous_rate() {
        let mut e = RateEstimator::new(48_000.0, 200);
        let mut ts = 0i64;
        let frame = 100u32;
        let period_ns = (frame as f64 / 48_100.0 * 1e9) as i64;
        for _ in 0..500 {
            ts += period_ns;
            e.update(frame, ts);
        }
        assert!((e.rate() - 48_100.0).abs() < 50.0, "rate={}", e.rate());
    }

    #[test]
    fn rejects_large_glitch() {
        let mut e = RateEstimator::new(48_000.0, 200);
        e.update(100, 1_000_000);
        let before = e.rate();
        // Same 100 samples arriving 100x faster than plausible.
        e.update(100, 1_000_100);
        assert_eq!(e.rate(), before);
    }

    #[test]
    fn rejects_non_advancing_clock() {
        let mut e = RateEstimator::new(48_000.0, 200);
        e.update(100, 1_000_000);
        let before = e.rate();
        e.update(100, 1_000_000);
        assert_eq!(e.rate(), before);
    }

    #[test]
    fn reset_restores_nominal() {
        let mut e = RateEstimator::new(48_000.0, 200);
        e.update(100, 1_000_000);
        e.update(100, 3_000_000);
        e.reset();
        assert_eq!(e.rate(), 48_000.0);
    }
}

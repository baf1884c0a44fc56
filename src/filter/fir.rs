//! FIR stages: Kaiser-windowed 2× polyphase oversampler and a user-supplied
//! custom-tap convolver.
//!
//! The windowed-sinc design (Bessel `I0`, Kaiser beta from stopband
//! attenuation) follows the classic `kaiserord`-style construction used by
//! `examples/other_examples/07819970_binaryfields-resid-rs__src-sampler.rs.rs`
//! (`init_fir`/`i0`), simplified to a single fixed-length symmetric
//! low-pass rather than that file's variable-resolution resampling table.

use std::collections::VecDeque;

/// Modified Bessel function of the first kind, order 0 — needed for the
/// Kaiser window weight. Series form, same convergence criterion as the
/// grounding file's `i0`.
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let half_x = x / 2.0;
    let mut k = 1.0;
    loop {
        term *= (half_x / k) * (half_x / k);
        sum += term;
        if term < sum * 1e-9 {
            break;
        }
        k += 1.0;
        if k > 100.0 {
            break;
        }
    }
    sum
}

/// Design a symmetric, odd-length Kaiser-windowed sinc low-pass.
///
/// `cutoff_hz` / `sample_rate_hz` set the normalized cutoff; `atten_db` sets
/// the stopband attenuation target, which in turn sets the Kaiser beta via
/// the Kaiser/Bellanger approximation.
pub fn design_lowpass(taps: usize, cutoff_hz: f32, sample_rate_hz: f32, atten_db: f32) -> Vec<f32> {
    let n = if taps % 2 == 0 { taps + 1 } else { taps };
    let half = (n / 2) as i64;
    let fc = (cutoff_hz / sample_rate_hz).clamp(1e-6, 0.5) as f64;
    let beta = if atten_db as f64 > 50.0 {
        0.1102 * (atten_db as f64 - 8.7)
    } else if atten_db as f64 >= 21.0 {
        0.5842 * (atten_db as f64 - 21.0).powf(0.4) + 0.07886 * (atten_db as f64 - 21.0)
    } else {
        0.0
    };
    let i0_beta = bessel_i0(beta);

    let mut out = vec![0.0f32; n];
    for (i, slot) in out.iter_mut().enumerate() {
        let m = i as i64 - half;
        let sinc = if m == 0 {
            2.0 * fc
        } else {
            (2.0 * std::f64::consts::PI * fc * m as f64).sin() / (std::f64::consts::PI * m as f64)
        };
        let ratio = m as f64 / half as f64;
        let window = if ratio.abs() <= 1.0 {
            bessel_i0(beta * (1.0 - ratio * ratio).sqrt()) / i0_beta
        } else {
            0.0
        };
        *slot = (sinc * window) as f32;
    }
    out
}

/// Polyphase 2× oversampler.
///
/// A prototype low-pass (`design_lowpass`) is split into its even/odd
/// polyphase components. Each input sample yields two output samples: the
/// even branch reconstructs the original (bandlimited) sample, the odd
/// branch is the half-sample-delayed interpolated one — standard
/// zero-stuffing + FIR decomposed to avoid ever multiplying by the
/// known-zero stuffed samples.
#[derive(Debug, Clone)]
pub struct Fir2x {
    even_taps: Vec<f32>,
    odd_taps: Vec<f32>,
    history: Vec<VecDeque<f32>>,
}

impl Fir2x {
    pub fn new(channels: usize, in_rate: f32, out_rate: f32) -> Self {
        let lower = in_rate.min(out_rate);
        let oversampled_rate = 2.0 * in_rate;
        let cutoff = lower / 2.0;
        let prototype = design_lowpass(63, cutoff, oversampled_rate, 80.0);

        let mut even_taps = Vec::new();
        let mut odd_taps = Vec::new();
        for (i, &t) in prototype.iter().enumerate() {
            if i % 2 == 0 {
                even_taps.push(t);
            } else {
                odd_taps.push(t);
            }
        }
        let depth = even_taps.len().max(odd_taps.len()).max(1);
        Self {
            even_taps,
            odd_taps,
            history: (0..channels).map(|_| VecDeque::from(vec![0.0; depth])).collect(),
        }
    }

    /// Group delay of the prototype filter, in *input* samples (the even
    /// branch reconstructs `x[n - delay]`).
    pub fn group_delay_samples(&self) -> usize {
        self.even_taps.len().saturating_sub(1)
    }

    /// Feed one input sample for `channel`; returns the two oversampled
    /// output samples in time order.
    #[inline]
    pub fn process(&mut self, input: f32, channel: usize) -> [f32; 2] {
        let hist = &mut self.history[channel];
        hist.push_front(input);
        hist.truncate(self.even_taps.len().max(self.odd_taps.len()).max(1));

        let even: f32 = self
            .even_taps
            .iter()
            .enumerate()
            .map(|(i, &h)| h * hist.get(i).copied().unwrap_or(0.0))
            .sum();
        let odd: f32 = self
            .odd_taps
            .iter()
            .enumerate()
            .map(|(i, &h)| h * hist.get(i).copied().unwrap_or(0.0))
            .sum();
        [even, odd]
    }

    pub fn reset(&mut self) {
        for h in self.history.iter_mut() {
            h.iter_mut().for_each(|s| *s = 0.0);
        }
    }
}

/// Custom FIR convolver using externally supplied taps (spec.md §4.B / §9
/// Open Question: no embedded default is guessed — `Ats::set_fir_taps`
/// must be called before selecting `ATS_FILTER_FIR`).
#[derive(Debug, Clone)]
pub struct CustomFir {
    taps: Vec<f32>,
    history: Vec<VecDeque<f32>>,
}

impl CustomFir {
    pub fn new(channels: usize, taps: Vec<f32>) -> Self {
        let depth = taps.len().max(1);
        Self {
            taps,
            history: (0..channels).map(|_| VecDeque::from(vec![0.0; depth])).collect(),
        }
    }

    pub fn group_delay_samples(&self) -> usize {
        self.taps.len().saturating_sub(1) / 2
    }

    #[inline]
    pub fn process(&mut self, input: f32, channel: usize) -> f32 {
        let hist = &mut self.history[channel];
        hist.push_front(input);
        hist.truncate(self.taps.len().max(1));
        self.taps
            .iter()
            .enumerate()
            .map(|(i, &h)| h * hist.get(i).copied().unwrap_or(0.0))
            .sum()
    }

    pub fn reset(&mut self) {
        for h in self.history.iter_mut() {
            h.iter_mut().for_each(|s| *s = 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_design_is_symmetric() {
        let h = design_lowpass(31, 4000.0, 48_000.0, 60.0);
        let n = h.len();
        for i in 0..n / 2 {
            assert!((h[i] - h[n - 1 - i]).abs() < 1e-6, "tap {i} not symmetric with {}", n - 1 - i);
        }
    }

    #[test]
    fn fir2x_doubles_sample_count() {
        let mut f = Fir2x::new(1, 48_000.0, 48_000.0);
        let mut produced = 0;
        for i in 0..100 {
            let x = (i as f32 * 0.01).sin();
            let [_a, _b] = f.process(x, 0);
            produced += 2;
        }
        assert_eq!(produced, 200);
    }

    #[test]
    fn custom_fir_identity_tap_is_passthrough() {
        let mut f = CustomFir::new(1, vec![1.0]);
        assert_eq!(f.process(0.5, 0), 0.5);
        assert_eq!(f.process(-0.25, 0), -0.25);
    }
}

//! Diagnostics capability: the `Chrono` / `Histogram` contract spec.md §6
//! declares as an external collaborator, plus a default implementation so
//! the crate runs standalone.
//!
//! The original header (`examples/original_source/chrono/include/hist.h`)
//! describes a lean, lock-free, single-writer histogram with optional
//! stochastic-resonance dither to de-bias quantized statistics. We keep that
//! contract shape (`add`, `config`, `reset`, moments) but drop the C ABI
//! byte-array storage trick — see spec.md §9.

use crate::config::Event;

/// A time-stamper. `timestamp()` returns an arbitrary monotonic or
/// wall-clock count; only deltas between calls are meaningful.
pub trait Chrono {
    fn timestamp(&self) -> i64;
}

/// Wall-clock fallback used when a caller passes `call_time == 0`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemChrono;

impl Chrono for SystemChrono {
    fn timestamp(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }
}

/// Fixed-bin histogram matching the `hist.h` contract: bin centres run
/// linearly from `bin0` to `bin_n` over `bins` bins, with overflow
/// accumulated into the edge bins. Single writer, per spec.md §5 — no
/// internal locking.
#[derive(Debug, Clone)]
pub struct DefaultHistogram {
    bin0: f32,
    bin_n: f32,
    width: f32,
    bins: Vec<f64>,
    dither: bool,
    n: u64,
    sum_x: f64,
    sum_x2: f64,
    rng_state: u64,
}

impl DefaultHistogram {
    pub fn new(bin0: f32, bin_n: f32, bins: usize, dither: bool) -> Self {
        let mut h = Self {
            bin0: 0.0,
            bin_n: 0.0,
            width: 1.0,
            bins: Vec::new(),
            dither,
            n: 0,
            sum_x: 0.0,
            sum_x2: 0.0,
            rng_state: 0x9E3779B97F4A7C15,
        };
        h.config(bin0, bin_n, bins, dither);
        h
    }

    /// Reconfigure range/resolution without allocating on the hot path
    /// (call only from the owning side, same discipline as `hist.h`).
    pub fn config(&mut self, bin0: f32, bin_n: f32, bins: usize, dither: bool) {
        let bins = bins.max(1);
        self.bin0 = bin0;
        self.bin_n = bin_n;
        self.width = if bins > 1 {
            (bin_n - bin0) / (bins - 1) as f32
        } else {
            1.0
        };
        self.dither = dither;
        self.bins = vec![0.0; bins];
        self.reset();
    }

    pub fn reset(&mut self) {
        for b in self.bins.iter_mut() {
            *b = 0.0;
        }
        self.n = 0;
        self.sum_x = 0.0;
        self.sum_x2 = 0.0;
    }

    fn next_dither(&mut self) -> f32 {
        // xorshift64*, uniform in [-0.5, 0.5) bin widths.
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        ((x >> 11) as f64 / (1u64 << 53) as f64) as f32 - 0.5
    }

    /// Record `n` occurrences of value `x`.
    pub fn add(&mut self, x: f32, count: u32) {
        if self.bins.is_empty() || self.width <= 0.0 {
            return;
        }
        let dithered = if self.dither {
            x + self.next_dither() * self.width
        } else {
            x
        };
        let idx = ((dithered - self.bin0) / self.width).round();
        let idx = idx.clamp(0.0, (self.bins.len() - 1) as f32) as usize;
        self.bins[idx] += count as f64;
        self.n += count as u64;
        self.sum_x += x as f64 * count as f64;
        self.sum_x2 += (x as f64) * (x as f64) * count as f64;
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f32 {
        if self.n == 0 {
            0.0
        } else {
            (self.sum_x / self.n as f64) as f32
        }
    }

    pub fn std(&self) -> f32 {
        if self.n == 0 {
            0.0
        } else {
            let mean = self.sum_x / self.n as f64;
            let var = (self.sum_x2 / self.n as f64 - mean * mean).max(0.0);
            var.sqrt() as f32
        }
    }

    pub fn bins(&self) -> &[f64] {
        &self.bins
    }
}

/// One diagnostic channel: a histogram plus the last timestamp recorded on
/// it (used by `*_EXEC` channels to measure call duration).
#[derive(Debug, Clone)]
pub struct DiagChannel {
    pub hist: DefaultHistogram,
    last_timestamp: Option<i64>,
}

impl DiagChannel {
    fn new() -> Self {
        Self {
            hist: DefaultHistogram::new(0.0, 1.0, 101, true),
            last_timestamp: None,
        }
    }
}

/// Fixed array of per-`Event` diagnostic channels, sized the same way the
/// original `chronoDefault(bins, T)` call configures every channel at once.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    channels: [DiagChannel; Event::COUNT],
}

impl Diagnostics {
    pub fn new() -> Self {
        let mut d = Self {
            channels: std::array::from_fn(|_| DiagChannel::new()),
        };
        d.default_ranges(101, 0.01);
        d
    }

    /// Equivalent of the original `chronoDefault(bins, T)`: configures each
    /// channel to a per-event meaningful range. `t` bounds exec-time
    /// histograms in seconds.
    pub fn default_ranges(&mut self, bins: usize, t: f32) {
        use Event::*;
        let set = |h: &mut DefaultHistogram, bin0: f32, bin_n: f32| h.config(bin0, bin_n, bins, true);
        set(&mut self.channels[Push as usize].hist, 0.0, 8192.0);
        set(&mut self.channels[PushRate as usize].hist, 40_000.0, 56_000.0);
        set(&mut self.channels[PushExec as usize].hist, 0.0, t);
        set(&mut self.channels[Pop as usize].hist, 0.0, 8192.0);
        set(&mut self.channels[PopRate as usize].hist, 40_000.0, 56_000.0);
        set(&mut self.channels[PopExec as usize].hist, 0.0, t);
        set(&mut self.channels[UnderRun as usize].hist, 0.0, 1.0);
        set(&mut self.channels[UnderRunSize as usize].hist, 0.0, 8192.0);
        set(&mut self.channels[Offset as usize].hist, -1000.0, 1000.0);
        set(&mut self.channels[Depth as usize].hist, 0.0, crate::config::B as f32);
        set(&mut self.channels[Latency as usize].hist, 0.0, 1.0);
        set(&mut self.channels[Track as usize].hist, crate::config::RATIO_MIN as f32, crate::config::RATIO_MAX as f32);
    }

    pub fn record(&mut self, event: Event, value: f32) {
        self.channels[event as usize].hist.add(value, 1);
    }

    pub fn count(&mut self, event: Event, n: u32) {
        self.channels[event as usize].hist.add(1.0, n);
    }

    pub fn mark(&mut self, event: Event, timestamp: i64) {
        self.channels[event as usize].last_timestamp = Some(timestamp);
    }

    /// Record the elapsed time since the last `mark()` on this channel into
    /// the histogram, in seconds.
    pub fn mark_elapsed(&mut self, event: Event, timestamp: i64) {
        if let Some(start) = self.channels[event as usize].last_timestamp {
            let elapsed_s = (timestamp - start).max(0) as f32 * 1e-9;
            self.channels[event as usize].hist.add(elapsed_s, 1);
        }
        self.channels[event as usize].last_timestamp = Some(timestamp);
    }

    pub fn reset(&mut self, event: Option<Event>) {
        match event {
            Some(e) => self.channels[e as usize].hist.reset(),
            None => {
                for c in self.channels.iter_mut() {
                    c.hist.reset();
                }
            }
        }
    }

    pub fn histogram(&self, event: Event) -> &DefaultHistogram {
        &self.channels[event as usize].hist
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

//! Configuration surface: sample rates, mode bitfield, tracker gains.

/// Mode bitfield: three disjoint mask groups (interpolation, filter, flags).
///
/// Kept as a plain `u32` newtype with associated constants rather than the
/// `bitflags` crate — no crate in the teacher pack reaches for `bitflags`
/// for a handful of named masks, and the original C++ header does the same
/// thing with an enum plus operator overloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode(pub u32);

impl Mode {
    pub const INTERP_MASK: u32 = 0x0000_000F;
    pub const INTERP_HOLD: u32 = 0x0000_0000;
    pub const INTERP_LINEAR: u32 = 0x0000_0001;
    pub const INTERP_SPLINE3: u32 = 0x0000_0002;
    pub const INTERP_SPLINE5: u32 = 0x0000_0003;

    pub const FILTER_MASK: u32 = 0x0000_00F0;
    pub const FILTER_BIQUAD: u32 = 0x0000_0010;
    pub const FILTER_BIQUAD2: u32 = 0x0000_0020;
    pub const FILTER_FIR2X: u32 = 0x0000_0040;
    pub const FILTER_FIR: u32 = 0x0000_0080;

    pub const TRACKING_OFF: u32 = 0x1000_0000;

    /// Union of every bit this crate understands. Anything outside this is
    /// an unknown flag and `config()` must reject it.
    const KNOWN_BITS: u32 = Self::INTERP_MASK | Self::FILTER_MASK | Self::TRACKING_OFF;

    pub const fn new(bits: u32) -> Self {
        Mode(bits)
    }

    pub fn interp_bits(self) -> u32 {
        self.0 & Self::INTERP_MASK
    }

    pub fn filter_bits(self) -> u32 {
        self.0 & Self::FILTER_MASK
    }

    pub fn tracking_off(self) -> bool {
        self.0 & Self::TRACKING_OFF != 0
    }

    pub fn has_unknown_bits(self) -> bool {
        self.0 & !Self::KNOWN_BITS != 0
    }
}

/// Fixed event set, in the order spec.md's diagnostic table defines them.
/// Indexes directly into `Ats`'s diagnostic channel array — no hash lookup
/// on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Event {
    Push = 0,
    PushRate,
    PushExec,
    Pop,
    PopRate,
    PopExec,
    UnderRun,
    UnderRunSize,
    Offset,
    Depth,
    Latency,
    Track,
}

impl Event {
    pub const COUNT: usize = 12;

    pub const ALL: [Event; Self::COUNT] = [
        Event::Push,
        Event::PushRate,
        Event::PushExec,
        Event::Pop,
        Event::PopRate,
        Event::PopExec,
        Event::UnderRun,
        Event::UnderRunSize,
        Event::Offset,
        Event::Depth,
        Event::Latency,
        Event::Track,
    ];
}

/// Hard clamps on the resample ratio the PI tracker can produce.
pub const RATIO_MIN: f64 = 0.5;
pub const RATIO_MAX: f64 = 2.0;

/// Engine configuration. Mirrors the field set and defaults of spec.md §6.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interleaved channel count.
    pub channels: u32,
    /// Bitfield of interpolation / filter / tracking flags.
    pub mode: Mode,
    /// Nominal input sample rate in Hz.
    pub in_rate: f32,
    /// Nominal output sample rate in Hz.
    pub out_rate: f32,
    /// Push-side rate estimator window, in samples.
    pub filter_push: u32,
    /// Pop-side rate estimator window, in samples.
    pub filter_pop: u32,
    /// Target occupancy, in samples.
    pub track_target: u32,
    /// Reset threshold in samples; 0 disables.
    pub track_range: u32,
    /// Proportional gain, ppm per sample of error.
    pub track_kp: f32,
    /// Integral gain, ppm per sample·second.
    pub track_ki: f32,
    /// Quadratic warp scale, in samples.
    pub track_warp: f32,
    /// Slew cap on ratio changes, ppm per second.
    pub track_rate: f32,
}

/// Compile-time ring buffer depth (samples per channel). Must be a power of
/// two; `B / 4` is the default `track_target`.
pub const B: usize = 4096;

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: 2,
            mode: Mode::new(Mode::INTERP_SPLINE5),
            in_rate: 48_000.0,
            out_rate: 48_000.0,
            filter_push: 200,
            filter_pop: 200,
            track_target: (B / 4) as u32,
            track_range: 0,
            track_kp: 2.0,
            track_ki: 0.1,
            track_warp: 10.0,
            track_rate: 10.0,
        }
    }
}

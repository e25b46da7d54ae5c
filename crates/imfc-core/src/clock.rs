//! Cycle bookkeeping between the Z80 and the audio stream.
//!
//! The Z80 runs at 5.9 MHz while audio is requested in blocks of frames.
//! Each audio block grants the CPU `cycles_per_sample × frames` T-states.
//! Two counters convert executed T-states into other time bases:
//!
//! - [`FrameCursor`]: how many output frames the CPU has "reached", which
//!   positions FM register writes inside the block
//! - [`SampleClock::elapsed_us`]: wall time handed to the FM chip timers,
//!   carrying the sub-microsecond remainder from one step to the next so
//!   that long runs do not drift. The remainder is kept exactly, in units of
//!   T-states × 10⁶, since the 5.9 MHz clock is not a whole number of
//!   T-states per microsecond.

/// Z80 clock: the card's 11.8 MHz crystal divided by two.
pub const Z80_CLOCK_HZ: u32 = 5_900_000;

/// Lowest output rate the card accepts; lower requests are raised to this.
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Clamp a requested output rate to the supported range.
pub fn clamp_sample_rate(rate: u32) -> u32 {
    rate.max(MIN_SAMPLE_RATE)
}

/// Z80 T-states per output frame at `sample_rate` (after clamping).
pub fn cycles_per_sample(sample_rate: u32) -> u32 {
    Z80_CLOCK_HZ / clamp_sample_rate(sample_rate)
}

/// Persistent sample clock of one card.
#[derive(Debug, Clone)]
pub struct SampleClock {
    sample_rate: u32,
    cycles_per_sample: u32,
    time_error: u64,
}

const MICROS_PER_SECOND: u64 = 1_000_000;

impl SampleClock {
    /// Create a clock for `sample_rate`, clamped to [`MIN_SAMPLE_RATE`].
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = clamp_sample_rate(sample_rate);
        Self {
            sample_rate,
            cycles_per_sample: cycles_per_sample(sample_rate),
            time_error: 0,
        }
    }

    /// Effective output rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// T-states per output frame.
    pub fn cycles_per_sample(&self) -> u32 {
        self.cycles_per_sample
    }

    /// T-state budget for a block of `frames`.
    pub fn budget(&self, frames: usize) -> i64 {
        self.cycles_per_sample as i64 * frames as i64
    }

    /// Start tracking frame progress for a new block.
    pub fn cursor(&self) -> FrameCursor {
        FrameCursor {
            cycles_per_sample: self.cycles_per_sample,
            accumulated: 0,
        }
    }

    /// Convert a step's T-states to whole microseconds, keeping the remainder.
    pub fn elapsed_us(&mut self, cycles: u32) -> u32 {
        let clock = Z80_CLOCK_HZ as u64;
        let total = cycles as u64 * MICROS_PER_SECOND + self.time_error;
        self.time_error = total % clock;
        (total / clock) as u32
    }

    /// Carried time not yet handed out, in T-states × 10⁶.
    pub fn time_error(&self) -> u64 {
        self.time_error
    }
}

/// Per-block counter turning executed T-states into whole frames.
#[derive(Debug, Clone)]
pub struct FrameCursor {
    cycles_per_sample: u32,
    accumulated: u32,
}

impl FrameCursor {
    /// Add a step's T-states; returns the number of frames completed by it.
    pub fn advance(&mut self, cycles: u32) -> usize {
        self.accumulated += cycles;
        if self.accumulated < self.cycles_per_sample {
            return 0;
        }
        let frames = self.accumulated / self.cycles_per_sample;
        self.accumulated %= self.cycles_per_sample;
        frames as usize
    }
}

/// Counters from the most recent audio block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames produced.
    pub frames: usize,
    /// CPU steps taken (normal instructions and interrupt steps).
    pub instructions: u64,
    /// Steps that began with the INT line asserted, accepted or not.
    pub int_asserted_steps: u64,
    /// Interrupts the CPU acknowledged.
    pub interrupts_taken: u64,
    /// T-states executed.
    pub cycles: u64,
}

//! 8253 programmable interval timer as wired on the card.
//!
//! Three counter channels feed two host-visible timers:
//! - **Timer A**: channel 0 on a 500 kHz input (2 MHz / 4)
//! - **Timer B**: channels 1 and 2 cascaded on the 2 MHz input, so the
//!   period is the product of both reload values
//!
//! Only rate-generator programming is modelled. The counters themselves are
//! not clocked: each completed reload turns into a period that the host
//! scheduler fires repeatedly. The chip has no counter read-back wiring, so
//! reads return 0.

use crate::host::{TimerId, TimerScheduler};
use log::{trace, warn};

/// Input clock of the timer block.
pub const TIMER_CLOCK_HZ: u32 = 2_000_000;

/// Timer A input (channel 0).
pub const TIMER_A_CLOCK_HZ: u32 = TIMER_CLOCK_HZ / 4;

/// Timer B input (channels 1 and 2).
pub const TIMER_B_CLOCK_HZ: u32 = TIMER_CLOCK_HZ;

const CONTROL_PORT: u8 = 3;

/// Channel-select value reserved for read-back on the 8254.
const READ_BACK_SELECT: usize = 3;

/// Load sequence position at which a reload is complete.
const LOAD_COMPLETE: u8 = 3;

/// Position parked after a completed load.
const LOAD_PARKED: u8 = 4;

/// Highest position before folding back to [`LOAD_PARKED`].
const LOAD_MAX: u8 = 5;

/// How data bytes are merged into a channel's reload value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Counter latch command (merged like a low byte).
    LatchCount,
    /// Low byte only.
    LowByte,
    /// High byte only.
    HighByte,
    /// Low byte then high byte.
    LowThenHigh,
}

impl AccessMode {
    fn from_mode(mode: u8) -> Self {
        match (mode >> 4) & 0b11 {
            0b00 => AccessMode::LatchCount,
            0b01 => AccessMode::LowByte,
            0b10 => AccessMode::HighByte,
            _ => AccessMode::LowThenHigh,
        }
    }
}

/// Whether a control word selects binary rate-generator mode.
pub fn is_rate_generator(control: u8) -> bool {
    control & 0x0D == 0x04
}

/// One 8253 counter channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PitChannel {
    mode: u8,
    latch: u16,
    load_state: u8,
}

impl PitChannel {
    /// Access mode selected by the last control word.
    pub fn access_mode(&self) -> AccessMode {
        AccessMode::from_mode(self.mode)
    }

    /// Raw mode bits (control word bits 5..0).
    pub fn mode(&self) -> u8 {
        self.mode
    }

    /// Reload value assembled so far.
    pub fn latch(&self) -> u16 {
        self.latch
    }

    /// Position in the byte-load sequence.
    pub fn load_state(&self) -> u8 {
        self.load_state
    }

    /// Reload value with 0 standing for a full 65536 count.
    pub fn divisor(&self) -> u32 {
        if self.latch == 0 {
            0x10000
        } else {
            self.latch as u32
        }
    }

    fn program(&mut self, control: u8) {
        self.mode = control & 0x3F;
        self.load_state = if self.access_mode() == AccessMode::LowThenHigh {
            1
        } else {
            2
        };
    }

    fn merge(&mut self, value: u8) {
        let high = match self.access_mode() {
            AccessMode::LowThenHigh => self.load_state & 1 == 0,
            AccessMode::HighByte => true,
            AccessMode::LatchCount | AccessMode::LowByte => false,
        };
        if high {
            self.latch = (self.latch & 0x00FF) | ((value as u16) << 8);
        } else {
            self.latch = (self.latch & 0xFF00) | value as u16;
        }
        self.load_state += 1;
        if self.load_state > LOAD_MAX {
            self.load_state = LOAD_PARKED;
        }
    }
}

/// The card's timer block: channel A and the cascaded B pair.
#[derive(Debug, Clone, Default)]
pub struct TimerPair {
    channels: [PitChannel; 3],
    period_a: Option<f64>,
    period_b: Option<f64>,
}

impl TimerPair {
    /// Create an idle timer block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect one of the three counter channels.
    pub fn channel(&self, index: usize) -> &PitChannel {
        &self.channels[index]
    }

    /// Current period of `timer` in milliseconds, once loaded.
    pub fn period_ms(&self, timer: TimerId) -> Option<f64> {
        match timer {
            TimerId::A => self.period_a,
            TimerId::B => self.period_b,
        }
    }

    /// Counter read-back is not wired on the card.
    pub fn read(&self, _addr: u8) -> u8 {
        0
    }

    /// Write a control word (`addr == 3`) or a data byte to channel `addr`.
    pub fn write<S: TimerScheduler + ?Sized>(&mut self, addr: u8, value: u8, scheduler: &mut S) {
        trace!("PIT write {addr}: {value:02X}");
        if addr & 3 == CONTROL_PORT {
            self.write_control(value, scheduler);
        } else {
            self.write_data((addr & 3) as usize, value, scheduler);
        }
    }

    fn write_control<S: TimerScheduler + ?Sized>(&mut self, value: u8, scheduler: &mut S) {
        if !is_rate_generator(value) {
            warn!("unsupported timer mode {value:02X}");
        }
        let select = (value >> 6) as usize;
        if select == READ_BACK_SELECT {
            warn!("timer read-back command {value:02X} ignored");
            return;
        }
        self.channels[select].program(value);
        scheduler.cancel(Self::timer_for(select));
    }

    fn write_data<S: TimerScheduler + ?Sized>(
        &mut self,
        index: usize,
        value: u8,
        scheduler: &mut S,
    ) {
        self.channels[index].merge(value);
        if self.channels[index].load_state != LOAD_COMPLETE {
            return;
        }

        if index == 0 {
            let period = 1000.0 / TIMER_A_CLOCK_HZ as f64 * self.channels[0].divisor() as f64;
            self.period_a = Some(period);
            scheduler.schedule(TimerId::A, period);
        } else if self.channels[1].load_state >= LOAD_COMPLETE
            && self.channels[2].load_state >= LOAD_COMPLETE
        {
            let count = self.channels[1].divisor() as u64 * self.channels[2].divisor() as u64;
            let period = 1000.0 / TIMER_B_CLOCK_HZ as f64 * count as f64;
            self.period_b = Some(period);
            scheduler.schedule(TimerId::B, period);
        }
        self.channels[index].load_state = LOAD_PARKED;
    }

    fn timer_for(channel: usize) -> TimerId {
        if channel == 0 {
            TimerId::A
        } else {
            TimerId::B
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DetachedHost;
    use approx::assert_relative_eq;

    #[test]
    fn timer_a_zero_latch_means_full_count() {
        let mut pit = TimerPair::new();
        let mut host = DetachedHost::new();
        pit.write(3, 0x34, &mut host);
        pit.write(0, 0x00, &mut host);
        assert_eq!(host.scheduled(TimerId::A), None, "half-loaded");
        pit.write(0, 0x00, &mut host);

        let expected = 1000.0 / 500_000.0 * 65_536.0;
        assert_relative_eq!(host.scheduled(TimerId::A).unwrap(), expected);
        assert_relative_eq!(pit.period_ms(TimerId::A).unwrap(), expected);
    }

    #[test]
    fn timer_a_low_then_high_merges_bytes() {
        let mut pit = TimerPair::new();
        let mut host = DetachedHost::new();
        pit.write(3, 0x34, &mut host);
        pit.write(0, 0x10, &mut host);
        pit.write(0, 0x00, &mut host);
        assert_eq!(pit.channel(0).latch(), 0x0010);
        assert_eq!(pit.channel(0).load_state(), LOAD_PARKED);
        assert_relative_eq!(pit.period_ms(TimerId::A).unwrap(), 0.032);
    }

    #[test]
    fn byte_order_flips_after_first_load() {
        let mut pit = TimerPair::new();
        let mut host = DetachedHost::new();
        pit.write(3, 0x34, &mut host);
        pit.write(0, 0x34, &mut host);
        pit.write(0, 0x12, &mut host);
        assert_eq!(pit.channel(0).latch(), 0x1234);

        // Parked at 4: next byte lands high, then low, then folds back to 4.
        host.cancel(TimerId::A);
        pit.write(0, 0xAB, &mut host);
        assert_eq!(pit.channel(0).latch(), 0xAB34);
        pit.write(0, 0xCD, &mut host);
        assert_eq!(pit.channel(0).latch(), 0xABCD);
        assert_eq!(pit.channel(0).load_state(), LOAD_PARKED);
        assert_eq!(host.scheduled(TimerId::A), None, "no reload after parking");
    }

    #[test]
    fn single_byte_modes_complete_on_first_write() {
        let mut pit = TimerPair::new();
        let mut host = DetachedHost::new();
        pit.write(3, 0x14, &mut host);
        pit.write(0, 0x20, &mut host);
        assert_eq!(pit.channel(0).latch(), 0x0020);
        assert!(host.scheduled(TimerId::A).is_some());

        pit.write(3, 0x24, &mut host);
        assert_eq!(host.scheduled(TimerId::A), None, "control word cancels");
        pit.write(0, 0x01, &mut host);
        assert_eq!(pit.channel(0).latch(), 0x0120);
    }

    #[test]
    fn timer_b_waits_for_both_stages() {
        let mut pit = TimerPair::new();
        let mut host = DetachedHost::new();
        pit.write(3, 0x74, &mut host);
        pit.write(3, 0xB4, &mut host);
        pit.write(1, 0x64, &mut host);
        pit.write(1, 0x00, &mut host);
        assert_eq!(host.scheduled(TimerId::B), None);
        assert_eq!(pit.period_ms(TimerId::B), None);

        pit.write(2, 0x0A, &mut host);
        pit.write(2, 0x00, &mut host);
        let expected = 1000.0 / 2_000_000.0 * (100.0 * 10.0);
        assert_relative_eq!(host.scheduled(TimerId::B).unwrap(), expected);
    }

    #[test]
    fn timer_b_zero_stages_use_full_count() {
        let mut pit = TimerPair::new();
        let mut host = DetachedHost::new();
        for ctrl in [0x74, 0xB4] {
            pit.write(3, ctrl, &mut host);
        }
        for ch in [1, 2] {
            pit.write(ch, 0, &mut host);
            pit.write(ch, 0, &mut host);
        }
        let expected = 1000.0 / 2_000_000.0 * 65_536.0 * 65_536.0;
        assert_relative_eq!(pit.period_ms(TimerId::B).unwrap(), expected);
    }

    #[test]
    fn unsupported_mode_is_still_applied() {
        let mut pit = TimerPair::new();
        let mut host = DetachedHost::new();
        assert!(!is_rate_generator(0x30));
        pit.write(3, 0x30, &mut host);
        assert_eq!(pit.channel(0).mode(), 0x30);
        assert_eq!(pit.channel(0).access_mode(), AccessMode::LowThenHigh);
    }

    #[test]
    fn read_back_select_is_ignored() {
        let mut pit = TimerPair::new();
        let mut host = DetachedHost::new();
        host.schedule(TimerId::A, 1.0);
        pit.write(3, 0xC4, &mut host);
        assert_eq!(host.scheduled(TimerId::A), Some(1.0));
        assert_eq!(pit.read(0), 0);
    }
}

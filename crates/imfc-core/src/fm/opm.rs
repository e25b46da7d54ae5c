//! Register file and timer block of an OPM-compatible chip, without audio.
//!
//! Firmware relies on the chip's two timers to pace playback, so the card
//! cannot run without them even when no waveform generator is attached.
//! This backend keeps the full 256-byte register file, models Timer A and
//! Timer B, and renders silence.

use super::{FmSynth, FM_CLOCK_HZ};
use log::trace;

const REG_CLKA_HIGH: u8 = 0x10;
const REG_CLKA_LOW: u8 = 0x11;
const REG_CLKB: u8 = 0x12;
const REG_TIMER_CONTROL: u8 = 0x14;

const CTRL_LOAD_A: u8 = 0x01;
const CTRL_LOAD_B: u8 = 0x02;
const CTRL_IRQ_A: u8 = 0x04;
const CTRL_IRQ_B: u8 = 0x08;
const CTRL_RESET_A: u8 = 0x10;
const CTRL_RESET_B: u8 = 0x20;

const STATUS_TIMER_A: u8 = 0x01;
const STATUS_TIMER_B: u8 = 0x02;

/// Timer A input prescaler (master clock cycles per tick).
const TIMER_A_PRESCALE: f64 = 64.0;
/// Timer B input prescaler.
const TIMER_B_PRESCALE: f64 = 1024.0;

/// Down-counter of one OPM timer, in microseconds.
#[derive(Debug, Clone, Copy, Default)]
struct OpmTimer {
    period_us: f64,
    remaining_us: f64,
    running: bool,
}

impl OpmTimer {
    fn set_period(&mut self, period_us: f64) {
        self.period_us = period_us;
    }

    fn start(&mut self) {
        self.running = true;
        self.remaining_us = self.period_us;
    }

    fn stop(&mut self) {
        self.running = false;
        self.remaining_us = 0.0;
    }

    /// Returns `true` if the counter wrapped at least once.
    fn advance(&mut self, microseconds: f64) -> bool {
        if !self.running || self.period_us <= 0.0 {
            return false;
        }
        self.remaining_us -= microseconds;
        if self.remaining_us > 0.0 {
            return false;
        }
        while self.remaining_us <= 0.0 {
            self.remaining_us += self.period_us;
        }
        true
    }
}

/// Silent OPM core providing the register file and both chip timers.
#[derive(Debug, Clone)]
pub struct OpmTimerCore {
    clock_hz: u32,
    regs: [u8; 256],
    status: u8,
    timer_a: OpmTimer,
    timer_b: OpmTimer,
}

impl OpmTimerCore {
    /// Create a core driven at `clock_hz`.
    pub fn new(clock_hz: u32) -> Self {
        let mut core = Self {
            clock_hz,
            regs: [0; 256],
            status: 0,
            timer_a: OpmTimer::default(),
            timer_b: OpmTimer::default(),
        };
        core.reset();
        core
    }

    /// Last value written to `addr`.
    pub fn register(&self, addr: u8) -> u8 {
        self.regs[addr as usize]
    }

    /// Timer A period in microseconds.
    pub fn timer_a_period_us(&self) -> f64 {
        self.timer_a.period_us
    }

    /// Timer B period in microseconds.
    pub fn timer_b_period_us(&self) -> f64 {
        self.timer_b.period_us
    }

    fn clka(&self) -> u32 {
        ((self.regs[REG_CLKA_HIGH as usize] as u32) << 2)
            | (self.regs[REG_CLKA_LOW as usize] as u32 & 0x03)
    }

    fn update_timer_a(&mut self) {
        let ticks = 1024 - self.clka();
        let period = TIMER_A_PRESCALE * ticks as f64 * 1_000_000.0 / self.clock_hz as f64;
        self.timer_a.set_period(period);
    }

    fn update_timer_b(&mut self) {
        let ticks = 256 - self.regs[REG_CLKB as usize] as u32;
        let period = TIMER_B_PRESCALE * ticks as f64 * 1_000_000.0 / self.clock_hz as f64;
        self.timer_b.set_period(period);
    }

    fn write_timer_control(&mut self, value: u8) {
        let previous = self.regs[REG_TIMER_CONTROL as usize];
        let changed = previous ^ value;
        if value & CTRL_RESET_A != 0 {
            self.status &= !STATUS_TIMER_A;
        }
        if value & CTRL_RESET_B != 0 {
            self.status &= !STATUS_TIMER_B;
        }
        if changed & CTRL_LOAD_A != 0 {
            if value & CTRL_LOAD_A != 0 {
                self.timer_a.start();
            } else {
                self.timer_a.stop();
            }
        }
        if changed & CTRL_LOAD_B != 0 {
            if value & CTRL_LOAD_B != 0 {
                self.timer_b.start();
            } else {
                self.timer_b.stop();
            }
        }
    }
}

impl Default for OpmTimerCore {
    fn default() -> Self {
        Self::new(FM_CLOCK_HZ)
    }
}

impl FmSynth for OpmTimerCore {
    fn reset(&mut self) {
        self.regs = [0; 256];
        self.status = 0;
        self.timer_a = OpmTimer::default();
        self.timer_b = OpmTimer::default();
        self.update_timer_a();
        self.update_timer_b();
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        trace!("OPM {addr:02X} <- {value:02X}");
        if addr == REG_TIMER_CONTROL {
            self.write_timer_control(value);
        }
        self.regs[addr as usize] = value;
        match addr {
            REG_CLKA_HIGH | REG_CLKA_LOW => self.update_timer_a(),
            REG_CLKB => self.update_timer_b(),
            _ => {}
        }
    }

    fn read_status(&self) -> u8 {
        self.status
    }

    fn count(&mut self, microseconds: u32) -> bool {
        let control = self.regs[REG_TIMER_CONTROL as usize];
        let us = microseconds as f64;
        let mut event = false;
        if self.timer_a.advance(us) {
            event = true;
            if control & CTRL_IRQ_A != 0 {
                self.status |= STATUS_TIMER_A;
            }
        }
        if self.timer_b.advance(us) {
            event = true;
            if control & CTRL_IRQ_B != 0 {
                self.status |= STATUS_TIMER_B;
            }
        }
        event
    }

    fn mix(&mut self, _buffer: &mut [i16]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn timer_periods_follow_clock_registers() {
        let mut opm = OpmTimerCore::default();
        assert_relative_eq!(opm.timer_a_period_us(), 64.0 * 1024.0 / 4.0);
        assert_relative_eq!(opm.timer_b_period_us(), 1024.0 * 256.0 / 4.0);

        opm.write_register(0x10, 0xFF);
        opm.write_register(0x11, 0x03);
        assert_relative_eq!(opm.timer_a_period_us(), 16.0);

        opm.write_register(0x12, 0xFE);
        assert_relative_eq!(opm.timer_b_period_us(), 512.0);
    }

    #[test]
    fn timer_a_sets_status_when_enabled() {
        let mut opm = OpmTimerCore::default();
        opm.write_register(0x10, 0xFF);
        opm.write_register(0x11, 0x00);
        // 4 ticks of 16us.
        opm.write_register(0x14, CTRL_LOAD_A | CTRL_IRQ_A);

        assert!(!opm.count(40));
        assert_eq!(opm.read_status(), 0);
        assert!(opm.count(40));
        assert_eq!(opm.read_status() & STATUS_TIMER_A, STATUS_TIMER_A);

        opm.write_register(0x14, CTRL_LOAD_A | CTRL_IRQ_A | CTRL_RESET_A);
        assert_eq!(opm.read_status(), 0);
    }

    #[test]
    fn event_without_status_enable() {
        let mut opm = OpmTimerCore::default();
        opm.write_register(0x12, 0xFF);
        opm.write_register(0x14, CTRL_LOAD_B);
        assert!(opm.count(300));
        assert_eq!(opm.read_status(), 0);
    }

    #[test]
    fn stopped_timers_never_fire() {
        let mut opm = OpmTimerCore::default();
        opm.write_register(0x10, 0xFF);
        opm.write_register(0x11, 0x03);
        assert!(!opm.count(10_000));
        opm.write_register(0x14, CTRL_LOAD_A);
        assert!(opm.count(16));
        opm.write_register(0x14, 0);
        assert!(!opm.count(10_000));
    }

    #[test]
    fn mix_leaves_buffer_untouched() {
        let mut opm = OpmTimerCore::default();
        let mut buf = [7i16; 8];
        opm.mix(&mut buf);
        assert_eq!(buf, [7; 8]);
    }
}

//! Interrupt aggregation for the two domains on the card.
//!
//! - **Host domain**: timer pending bits plus the host-facing handshake
//!   conditions, gated by the TCR global-enable pair and delivered
//!   edge-triggered on the shared ISA IRQ line.
//! - **Card domain**: the Z80's INT input, resampled after every
//!   instruction from the FM chip timers, both handshake directions and the
//!   MIDI USART.

use crate::host::{IrqLine, TimerId};
use bitflags::bitflags;
use log::trace;

bitflags! {
    /// Timer control register, written by the host at offsets 8–B.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TimerControl: u8 {
        /// Keep a pending Timer A interrupt (clearing acknowledges it).
        const ACK_A = 0x01;
        /// Keep a pending Timer B interrupt (clearing acknowledges it).
        const ACK_B = 0x02;
        /// Timer A firings latch a pending bit.
        const ENABLE_A = 0x04;
        /// Timer B firings latch a pending bit.
        const ENABLE_B = 0x08;
        /// Masks the MIDI USART interrupt towards the Z80.
        const MIDI_MASK = 0x10;
        /// Global host interrupt gate, both bits required.
        const IRQ_GATE = 0xC0;
    }
}

bitflags! {
    /// Timer status register, read by the host at offsets C–F.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TimerStatus: u8 {
        /// Timer A interrupt pending.
        const TIMER_A = 0x01;
        /// Timer B interrupt pending.
        const TIMER_B = 0x02;
        /// Bits the hardware always drives high.
        const RESERVED = 0x7C;
        /// Any host interrupt source active (ungated).
        const ANY = 0x80;
    }
}

/// Host-domain interrupt state: TCR, latched timer bits and the delivered level.
#[derive(Debug, Clone, Default)]
pub struct HostIrq {
    irq: u8,
    tcr: TimerControl,
    pending: u8,
    delivered: bool,
}

impl HostIrq {
    /// Create the host domain for ISA line `irq` with everything idle.
    pub fn new(irq: u8) -> Self {
        Self {
            irq,
            ..Self::default()
        }
    }

    /// ISA IRQ number this card drives.
    pub fn irq(&self) -> u8 {
        self.irq
    }

    /// Raw TCR value.
    pub fn tcr(&self) -> u8 {
        self.tcr.bits()
    }

    /// Latched timer bits (`0x01` A, `0x02` B).
    pub fn pending(&self) -> u8 {
        self.pending
    }

    /// Level most recently delivered to the host line.
    pub fn delivered(&self) -> bool {
        self.delivered
    }

    /// Store a new TCR value, dropping pending bits whose acknowledge bit is clear.
    pub fn write_tcr(&mut self, value: u8) {
        self.tcr = TimerControl::from_bits_retain(value);
        self.pending &= value & (TimerControl::ACK_A | TimerControl::ACK_B).bits();
    }

    /// Latch `timer`'s pending bit if its TCR enable is set.
    ///
    /// Returns whether the bit was latched.
    pub fn timer_fired(&mut self, timer: TimerId) -> bool {
        let enable = match timer {
            TimerId::A => TimerControl::ENABLE_A,
            TimerId::B => TimerControl::ENABLE_B,
        };
        if self.tcr.contains(enable) {
            self.pending |= timer.pending_bit();
            true
        } else {
            false
        }
    }

    /// Timer status byte given the current handshake condition.
    pub fn status(&self, handshake_active: bool) -> u8 {
        let mut status = TimerStatus::from_bits_retain(self.pending) | TimerStatus::RESERVED;
        if self.pending != 0 || handshake_active {
            status |= TimerStatus::ANY;
        }
        status.bits()
    }

    /// Recompute the host line and drive it on a level transition only.
    ///
    /// `handshake_active` is the OR of Host→Card tx-interrupt and Card→Host
    /// rx-interrupt.
    pub fn update<L: IrqLine + ?Sized>(&mut self, handshake_active: bool, line: &mut L) {
        let mut active = self.pending != 0 || handshake_active;
        if !self.tcr.contains(TimerControl::IRQ_GATE) {
            active = false;
        }
        if active != self.delivered {
            trace!("host IRQ {}: {} -> {}", self.irq, self.delivered, active);
            if active {
                line.raise_irq(self.irq);
            } else {
                line.lower_irq(self.irq);
            }
        }
        self.delivered = active;
    }
}

/// Card-domain INT input of the Z80, recomputed after each instruction.
pub fn card_int(fm_event: bool, host_rx: bool, card_tx: bool, midi: bool) -> bool {
    fm_event || host_rx || card_tx || midi
}

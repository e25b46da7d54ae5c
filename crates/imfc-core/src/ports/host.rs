//! Host-side I/O map: 16 ports at the configured base address.
//!
//! | Offset | Read                    | Write                  |
//! |--------|-------------------------|------------------------|
//! | 0      | get Card→Host           |                        |
//! | 1      | peek Host→Card          | put Host→Card          |
//! | 2      | PIU status              |                        |
//! | 3      |                         | PIU control word       |
//! | 4–7    | timer (reads 0)         | 8253 port `offset & 3` |
//! | 8–B    |                         | TCR                    |
//! | C–F    | TSR                     |                        |
//!
//! The FM chip and the MIDI USART are not reachable from here; the host
//! talks to them only through firmware.

use super::{decode_control, PiuControl, PiuFlag};
use crate::handshake::Handshake;
use bitflags::bitflags;

/// Read operations the host can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostRead {
    /// Destructive read of the Card→Host mailbox.
    GetCardToHost,
    /// Non-destructive look at the Host→Card mailbox.
    PeekHostToCard,
    /// Host-side PIU status byte.
    PiuStatus,
    /// Timer counter (no read-back wiring).
    Timer(u8),
    /// Timer status register.
    TimerStatus,
    /// Nothing decoded at this offset.
    Unmapped,
}

/// Write operations the host can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostWrite {
    /// Deposit a byte in the Host→Card mailbox.
    PutHostToCard,
    /// PIU control word.
    PiuControl,
    /// 8253 data (0–2) or control (3) port.
    Timer(u8),
    /// Timer control register.
    TimerControl,
    /// Nothing decoded at this offset.
    Unmapped,
}

/// Read decode, indexed by offset from the base port.
pub const READS: [HostRead; 16] = [
    HostRead::GetCardToHost,
    HostRead::PeekHostToCard,
    HostRead::PiuStatus,
    HostRead::Unmapped,
    HostRead::Timer(0),
    HostRead::Timer(1),
    HostRead::Timer(2),
    HostRead::Timer(3),
    HostRead::Unmapped,
    HostRead::Unmapped,
    HostRead::Unmapped,
    HostRead::Unmapped,
    HostRead::TimerStatus,
    HostRead::TimerStatus,
    HostRead::TimerStatus,
    HostRead::TimerStatus,
];

/// Write decode, indexed by offset from the base port.
pub const WRITES: [HostWrite; 16] = [
    HostWrite::Unmapped,
    HostWrite::PutHostToCard,
    HostWrite::Unmapped,
    HostWrite::PiuControl,
    HostWrite::Timer(0),
    HostWrite::Timer(1),
    HostWrite::Timer(2),
    HostWrite::Timer(3),
    HostWrite::TimerControl,
    HostWrite::TimerControl,
    HostWrite::TimerControl,
    HostWrite::TimerControl,
    HostWrite::Unmapped,
    HostWrite::Unmapped,
    HostWrite::Unmapped,
    HostWrite::Unmapped,
];

/// Control word field → flag on the host side.
const CONTROL_FLAGS: [Option<PiuFlag>; 8] = [
    None,
    None,
    Some(PiuFlag::HostToCardTx),
    None,
    Some(PiuFlag::CardToHostRx),
    None,
    None,
    None,
];

/// Mode word pair accepted on the host side (0xBC/0xBD).
const MODE_BASE: u8 = 0xBC;

/// Decode a host read at `offset` (0..16).
pub fn decode_read(offset: u8) -> HostRead {
    READS[(offset & 0x0F) as usize]
}

/// Decode a host write at `offset` (0..16).
pub fn decode_write(offset: u8) -> HostWrite {
    WRITES[(offset & 0x0F) as usize]
}

/// Decode a host-side PIU control word.
pub fn decode_piu_control(value: u8) -> PiuControl {
    decode_control(value, MODE_BASE, &CONTROL_FLAGS)
}

bitflags! {
    /// PIU status byte as read by the host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HostPiuStatus: u8 {
        /// Host→Card transmit interrupt condition.
        const H2C_TX_INT = 0x01;
        /// Host→Card mailbox is free.
        const H2C_NOT_READY = 0x02;
        /// Host→Card transmit interrupt enabled.
        const H2C_TX_ENABLE = 0x04;
        /// Card→Host receive interrupt condition.
        const C2H_RX_INT = 0x08;
        /// Card→Host receive interrupt enabled.
        const C2H_RX_ENABLE = 0x10;
        /// Card→Host holds an unread byte.
        const C2H_READY = 0x20;
        /// Extra flag.
        const EXTRA = 0x80;
    }
}

/// Compose the host-side PIU status byte.
pub fn piu_status(h2c: &Handshake, c2h: &Handshake, extra: bool) -> u8 {
    let mut status = HostPiuStatus::empty();
    status.set(HostPiuStatus::EXTRA, extra);
    status.set(HostPiuStatus::H2C_NOT_READY, !h2c.is_ready());
    status.set(HostPiuStatus::H2C_TX_INT, h2c.tx_interrupt());
    status.set(HostPiuStatus::C2H_READY, c2h.is_ready());
    status.set(HostPiuStatus::C2H_RX_INT, c2h.rx_interrupt());
    status.set(HostPiuStatus::H2C_TX_ENABLE, h2c.tx_interrupt_enabled());
    status.set(HostPiuStatus::C2H_RX_ENABLE, c2h.rx_interrupt_enabled());
    status.bits()
}

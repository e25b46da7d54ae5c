//! Z80-side I/O map.
//!
//! Bits 5..4 of the port select a block of 16:
//!
//! | Group | Ports     | Device                                     |
//! |-------|-----------|--------------------------------------------|
//! | 0     | 0x00–0x0F | YM2164: even = address, odd = data/status  |
//! | 1     | 0x10–0x1F | MIDI USART: even = data, odd = cmd/status  |
//! | 2     | 0x20–0x2F | PIU, card side of the handshake link       |
//! | 3     | 0x30–0x3F | nothing (reads float high)                 |

use super::{decode_control, PiuControl, PiuFlag};
use crate::handshake::Handshake;
use bitflags::bitflags;

/// Read operations the Z80 can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardRead {
    /// YM2164 status register.
    FmStatus,
    /// USART data (`false`) or status (`true`).
    Midi(bool),
    /// Non-destructive look at the Card→Host mailbox.
    PeekCardToHost,
    /// Destructive read of the Host→Card mailbox.
    GetHostToCard,
    /// Card-side PIU status byte.
    PiuStatus,
    /// Nothing decoded at this port.
    Unmapped,
}

/// Write operations the Z80 can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardWrite {
    /// Latch a YM2164 register address.
    FmAddress,
    /// Write the latched YM2164 register.
    FmData,
    /// USART data (`false`) or mode/command (`true`).
    Midi(bool),
    /// Deposit a byte in the Card→Host mailbox.
    PutCardToHost,
    /// PIU control word.
    PiuControl,
    /// Nothing decoded at this port.
    Unmapped,
}

const PIU_READS: [CardRead; 16] = {
    let mut table = [CardRead::Unmapped; 16];
    table[0] = CardRead::PeekCardToHost;
    table[1] = CardRead::GetHostToCard;
    table[2] = CardRead::PiuStatus;
    table
};

const PIU_WRITES: [CardWrite; 16] = {
    let mut table = [CardWrite::Unmapped; 16];
    table[0] = CardWrite::PutCardToHost;
    table[3] = CardWrite::PiuControl;
    table
};

/// Control word field → flag on the card side.
const CONTROL_FLAGS: [Option<PiuFlag>; 8] = [
    None,
    None,
    Some(PiuFlag::HostToCardRx),
    None,
    None,
    Some(PiuFlag::Extra),
    Some(PiuFlag::CardToHostTx),
    None,
];

/// Mode word pair accepted on the card side (0xA6/0xA7).
const MODE_BASE: u8 = 0xA6;

fn group(port: u8) -> u8 {
    (port >> 4) & 0x03
}

fn odd(port: u8) -> bool {
    port & 0x01 != 0
}

/// Decode a Z80 `IN`.
pub fn decode_read(port: u8) -> CardRead {
    match group(port) {
        0 if odd(port) => CardRead::FmStatus,
        1 => CardRead::Midi(odd(port)),
        2 => PIU_READS[(port & 0x0F) as usize],
        _ => CardRead::Unmapped,
    }
}

/// Decode a Z80 `OUT`.
pub fn decode_write(port: u8) -> CardWrite {
    match group(port) {
        0 if odd(port) => CardWrite::FmData,
        0 => CardWrite::FmAddress,
        1 => CardWrite::Midi(odd(port)),
        2 => PIU_WRITES[(port & 0x0F) as usize],
        _ => CardWrite::Unmapped,
    }
}

/// Decode a card-side PIU control word.
pub fn decode_piu_control(value: u8) -> PiuControl {
    decode_control(value, MODE_BASE, &CONTROL_FLAGS)
}

bitflags! {
    /// PIU status byte as read by the Z80.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CardPiuStatus: u8 {
        /// Host→Card receive interrupt condition.
        const H2C_RX_INT = 0x01;
        /// Host→Card holds an unread byte.
        const H2C_READY = 0x02;
        /// Host→Card receive interrupt enabled.
        const H2C_RX_ENABLE = 0x04;
        /// Card→Host transmit interrupt condition.
        const C2H_TX_INT = 0x08;
        /// Extra flag.
        const EXTRA = 0x20;
        /// Card→Host transmit interrupt enabled.
        const C2H_TX_ENABLE = 0x40;
        /// Card→Host mailbox is free.
        const C2H_NOT_READY = 0x80;
    }
}

/// Compose the card-side PIU status byte.
pub fn piu_status(h2c: &Handshake, c2h: &Handshake, extra: bool) -> u8 {
    let mut status = CardPiuStatus::empty();
    status.set(CardPiuStatus::EXTRA, extra);
    status.set(CardPiuStatus::H2C_READY, h2c.is_ready());
    status.set(CardPiuStatus::H2C_RX_INT, h2c.rx_interrupt());
    status.set(CardPiuStatus::C2H_NOT_READY, !c2h.is_ready());
    status.set(CardPiuStatus::C2H_TX_INT, c2h.tx_interrupt());
    status.set(CardPiuStatus::H2C_RX_ENABLE, h2c.rx_interrupt_enabled());
    status.set(CardPiuStatus::C2H_TX_ENABLE, c2h.tx_interrupt_enabled());
    status.bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_follow_bits_5_4() {
        assert_eq!(decode_read(0x01), CardRead::FmStatus);
        assert_eq!(decode_read(0x00), CardRead::Unmapped);
        assert_eq!(decode_write(0x00), CardWrite::FmAddress);
        assert_eq!(decode_write(0x0F), CardWrite::FmData);
        assert_eq!(decode_read(0x10), CardRead::Midi(false));
        assert_eq!(decode_read(0x11), CardRead::Midi(true));
        assert_eq!(decode_write(0x13), CardWrite::Midi(true));
        assert_eq!(decode_read(0x35), CardRead::Unmapped);
        assert_eq!(decode_write(0x30), CardWrite::Unmapped);
        // Bits 7..6 are not decoded.
        assert_eq!(decode_read(0xE1), CardRead::GetHostToCard);
    }

    #[test]
    fn piu_group_table() {
        assert_eq!(decode_read(0x20), CardRead::PeekCardToHost);
        assert_eq!(decode_read(0x21), CardRead::GetHostToCard);
        assert_eq!(decode_read(0x22), CardRead::PiuStatus);
        assert_eq!(decode_read(0x23), CardRead::Unmapped);
        assert_eq!(decode_write(0x20), CardWrite::PutCardToHost);
        assert_eq!(decode_write(0x21), CardWrite::Unmapped);
        assert_eq!(decode_write(0x23), CardWrite::PiuControl);
        assert_eq!(decode_write(0x2F), CardWrite::Unmapped);
    }

    #[test]
    fn control_fields() {
        assert_eq!(
            decode_piu_control(0x0D),
            PiuControl::Set(PiuFlag::CardToHostTx, true)
        );
        assert_eq!(
            decode_piu_control(0x05),
            PiuControl::Set(PiuFlag::HostToCardRx, true)
        );
        assert_eq!(
            decode_piu_control(0x0A),
            PiuControl::Set(PiuFlag::Extra, false)
        );
        assert_eq!(decode_piu_control(0x08), PiuControl::Unmapped { field: 4 });
        assert!(matches!(
            decode_piu_control(0xA6),
            PiuControl::Mode { supported: true, .. }
        ));
        assert!(matches!(
            decode_piu_control(0xBC),
            PiuControl::Mode { supported: false, .. }
        ));
    }

    #[test]
    fn status_layout() {
        let mut h2c = Handshake::new();
        let mut c2h = Handshake::new();
        assert_eq!(piu_status(&h2c, &c2h, false), 0x80);

        h2c.put(1);
        h2c.set_rx_interrupt(true);
        assert_eq!(piu_status(&h2c, &c2h, false), 0x80 | 0x04 | 0x02 | 0x01);

        c2h.set_tx_interrupt(true);
        assert_eq!(
            piu_status(&h2c, &c2h, true),
            0x80 | 0x40 | 0x20 | 0x08 | 0x04 | 0x02 | 0x01
        );

        c2h.put(2);
        assert_eq!(piu_status(&h2c, &c2h, true), 0x40 | 0x20 | 0x04 | 0x02 | 0x01);
    }
}

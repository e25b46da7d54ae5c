//! Address decoding for the card's two I/O spaces.
//!
//! The Z80 inside the card and the host PC reach the same device state
//! through different port maps. Both maps are expressed here as data
//! (decode enums and lookup tables) so they can be tested without a card;
//! [`crate::card`] applies the decoded operations to the shared state.
//!
//! The PIU control word format is common to both sides: bit 7 set selects a
//! mode word, otherwise bits 3..1 pick a flag and bit 0 is its new value.

pub mod card;
pub mod host;

/// Flag of the handshake link a PIU control word can set or clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiuFlag {
    /// Host→Card receive interrupt (card side).
    HostToCardRx,
    /// Host→Card transmit interrupt (host side).
    HostToCardTx,
    /// Card→Host receive interrupt (host side).
    CardToHostRx,
    /// Card→Host transmit interrupt (card side).
    CardToHostTx,
    /// General-purpose flag the card exposes in both status bytes.
    Extra,
}

/// Decoded PIU control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiuControl {
    /// Mode-set word, `supported` when it matches the wiring of the card.
    Mode {
        /// Raw value.
        value: u8,
        /// Whether the value is one the card's wiring expects.
        supported: bool,
    },
    /// Bit set/reset of a mapped flag.
    Set(PiuFlag, bool),
    /// Bit set/reset of a port C line with nothing behind it.
    Unmapped {
        /// Bit field (`(value >> 1) & 7`).
        field: u8,
    },
}

const MODE_WORD: u8 = 0x80;

/// Split a control word using a side-specific field map.
fn decode_control(value: u8, mode_base: u8, flags: &[Option<PiuFlag>; 8]) -> PiuControl {
    if value & MODE_WORD != 0 {
        return PiuControl::Mode {
            value,
            supported: value & 0xFE == mode_base,
        };
    }
    let field = (value >> 1) & 0x07;
    match flags[field as usize] {
        Some(flag) => PiuControl::Set(flag, value & 0x01 != 0),
        None => PiuControl::Unmapped { field },
    }
}

//! # imfc
//!
//! Device model of the IBM Music Feature Card (IMFC), an ISA sound card
//! built around a Z80 running its own firmware and a Yamaha YM2164 (OPP) FM
//! chip.
//!
//! The crate models what sits between the host bus and the chips:
//!
//! - **Z80 co-simulation**: the embedded CPU runs in lockstep with audio
//!   generation, so FM register writes land on the exact sample they were
//!   issued at ([`MusicCard::render`])
//! - **YM2164 bridge**: two-step register access, OPP register quirks and
//!   render flushing in front of a pluggable [`FmSynth`] backend
//! - **PIU handshake**: one-byte mailboxes in each direction, reached through
//!   two independent port maps (host and Z80)
//! - **MIDI USART**: a 64-byte input FIFO fed from any thread through
//!   [`MidiInput`]
//! - **8253 timer pair** and the host interrupt logic (TCR/TSR, edge-triggered
//!   IRQ delivery)
//!
//! The host environment (interrupt controller and periodic scheduler) is
//! supplied per call through [`HostBus`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use imfc::{CardConfig, DetachedHost, MusicCard};
//!
//! let config = CardConfig {
//!     firmware: Some("imfc.bin".into()),
//!     ..CardConfig::default()
//! };
//! let mut card = MusicCard::from_config(config);
//! let mut host = DetachedHost::new();
//!
//! // Host writes a byte to the card's command mailbox.
//! card.io_write(0x2A21, 0x10, &mut host);
//!
//! // One 20 ms block of stereo audio.
//! let samples = card.render(882, &mut host);
//! assert_eq!(samples.len(), 882 * 2);
//! ```

#![warn(missing_docs)]

pub mod card;
pub mod clock;
pub mod config;
pub mod cpu_backend;
mod error;
pub mod fm;
pub mod handshake;
pub mod host;
pub mod irq;
pub mod memory;
pub mod midi;
pub mod pit;
pub mod ports;

pub use card::{CardState, MusicCard};
pub use clock::{RenderStats, SampleClock, MIN_SAMPLE_RATE, Z80_CLOCK_HZ};
pub use config::CardConfig;
pub use cpu_backend::{CpuBus, DefaultCpu, Iz80Backend, Z80Cpu, HALT_NOP_CYCLES};
pub use error::{ImfcError, Result};
pub use fm::{FmSynth, OpmTimerCore, FM_CLOCK_HZ};
pub use host::{DetachedHost, HostBus, IrqLine, TimerId, TimerScheduler};
pub use midi::{MidiInput, MIDI_QUEUE_CAPACITY};

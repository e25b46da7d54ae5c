//! YM2164 (OPP) access from the Z80 side.
//!
//! The sound generator itself is a collaborator behind [`FmSynth`]; this
//! module owns everything the card's wiring adds on top of it:
//!
//! - the two-step register access (latch an address, then write data)
//! - the OPP register quirks (0x00–0x07 swallowed, 0x09 aliased to 0x01)
//! - sample-accurate render flushing: before any register write the chip is
//!   asked to render every frame owed up to the current position in the
//!   active audio buffer, so a write only affects later frames

mod opm;

pub use opm::OpmTimerCore;

use log::{debug, trace};

/// FM chip master clock on the card.
pub const FM_CLOCK_HZ: u32 = 4_000_000;

/// Registers below this index are undocumented on the OPP and never reach the chip.
const FIRST_FORWARDED_REGISTER: u8 = 0x08;

/// OPP register that stands in for the OPM test register.
const ALIAS_REGISTER: u8 = 0x09;

/// OPM register the alias is redirected to.
const ALIAS_TARGET: u8 = 0x01;

/// Interleaved stereo output.
pub const OUTPUT_CHANNELS: usize = 2;

/// Common interface for FM synthesis backends.
///
/// Implementations own waveform generation and the chip's internal timers.
/// The card drives them with elapsed time and register writes and asks them
/// to render into its mix buffer.
pub trait FmSynth: Send {
    /// Return the chip to its power-on state.
    fn reset(&mut self);

    /// Write an OPM register (already remapped by the card).
    fn write_register(&mut self, addr: u8, value: u8);

    /// Status register (timer flags and busy bit).
    fn read_status(&self) -> u8;

    /// Advance the chip's timers by `microseconds`.
    ///
    /// Returns `true` when a timer event occurred during the interval.
    fn count(&mut self, microseconds: u32) -> bool;

    /// Render `buffer.len() / 2` stereo frames, adding onto what is already there.
    fn mix(&mut self, buffer: &mut [i16]);
}

/// State of the register-address latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterLatch {
    /// No address written since reset; data writes are dropped.
    #[default]
    Unlatched,
    /// Address selected for subsequent data writes.
    Latched(u8),
}

/// Card-side view of the FM chip plus the audio buffer it renders into.
pub struct FmPort {
    chip: Box<dyn FmSynth>,
    latch: RegisterLatch,
    mix: Vec<i16>,
    frames: usize,
    position: usize,
    rendered: usize,
}

impl FmPort {
    /// Wrap a backend, resetting it.
    pub fn new(mut chip: Box<dyn FmSynth>) -> Self {
        chip.reset();
        Self {
            chip,
            latch: RegisterLatch::Unlatched,
            mix: Vec::new(),
            frames: 0,
            position: 0,
            rendered: 0,
        }
    }

    /// Current register-address latch.
    pub fn latch(&self) -> RegisterLatch {
        self.latch
    }

    /// Status port read.
    pub fn read_status(&self) -> u8 {
        self.chip.read_status()
    }

    /// Address port write.
    pub fn write_address(&mut self, reg: u8) {
        self.latch = RegisterLatch::Latched(reg);
    }

    /// Data port write: flush owed frames, then update the latched register.
    pub fn write_data(&mut self, value: u8) {
        let RegisterLatch::Latched(reg) = self.latch else {
            debug!("FM data write {value:02X} before any address latch");
            return;
        };
        self.flush();
        self.set_register(reg, value);
    }

    fn set_register(&mut self, reg: u8, value: u8) {
        if reg < FIRST_FORWARDED_REGISTER {
            trace!("write {value:02X} to undocumented OPP register {reg:02X}");
        } else if reg == ALIAS_REGISTER {
            self.chip.write_register(ALIAS_TARGET, value);
        } else {
            self.chip.write_register(reg, value);
        }
    }

    /// Advance the chip timers; `true` on a timer event.
    pub fn count(&mut self, microseconds: u32) -> bool {
        self.chip.count(microseconds)
    }

    /// Start a new audio buffer of `frames` stereo frames, zeroed.
    pub fn begin_buffer(&mut self, frames: usize) {
        self.mix.clear();
        self.mix.resize(frames * OUTPUT_CHANNELS, 0);
        self.frames = frames;
        self.position = 0;
        self.rendered = 0;
    }

    /// Move the render position forward by `frames`, clamped to the buffer.
    pub fn advance(&mut self, frames: usize) {
        self.position = (self.position + frames).min(self.frames);
    }

    /// Render every frame owed up to the current position.
    pub fn flush(&mut self) {
        if self.position <= self.rendered {
            return;
        }
        let start = self.rendered * OUTPUT_CHANNELS;
        let end = self.position * OUTPUT_CHANNELS;
        self.chip.mix(&mut self.mix[start..end]);
        self.rendered = self.position;
    }

    /// Render the rest of the buffer and hand it out.
    pub fn finish_buffer(&mut self) -> &[i16] {
        self.position = self.frames;
        self.flush();
        &self.mix
    }

    /// Frames the render position has reached in the active buffer.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Frames already rendered into the active buffer.
    pub fn rendered(&self) -> usize {
        self.rendered
    }

    /// Reset the chip and drop the address latch.
    pub fn reset(&mut self) {
        self.chip.reset();
        self.latch = RegisterLatch::Unlatched;
    }
}

impl std::fmt::Debug for FmPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FmPort")
            .field("latch", &self.latch)
            .field("frames", &self.frames)
            .field("position", &self.position)
            .field("rendered", &self.rendered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// What the recording backend saw, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum ChipEvent {
        Write(u8, u8),
        Mix(usize),
    }

    /// Backend that records writes and renders a constant level per frame.
    #[derive(Clone, Default)]
    struct RecordingSynth {
        events: Arc<Mutex<Vec<ChipEvent>>>,
        level: i16,
    }

    impl FmSynth for RecordingSynth {
        fn reset(&mut self) {}

        fn write_register(&mut self, addr: u8, value: u8) {
            self.level = value as i16;
            self.events.lock().push(ChipEvent::Write(addr, value));
        }

        fn read_status(&self) -> u8 {
            0x03
        }

        fn count(&mut self, _microseconds: u32) -> bool {
            false
        }

        fn mix(&mut self, buffer: &mut [i16]) {
            for sample in buffer.iter_mut() {
                *sample += self.level;
            }
            self.events.lock().push(ChipEvent::Mix(buffer.len() / 2));
        }
    }

    fn port() -> (FmPort, Arc<Mutex<Vec<ChipEvent>>>) {
        let synth = RecordingSynth::default();
        let events = Arc::clone(&synth.events);
        (FmPort::new(Box::new(synth)), events)
    }

    #[test]
    fn data_without_address_is_dropped() {
        let (mut fm, events) = port();
        fm.write_data(0x12);
        assert!(events.lock().is_empty());
        assert_eq!(fm.latch(), RegisterLatch::Unlatched);
    }

    #[test]
    fn latch_persists_across_data_writes() {
        let (mut fm, events) = port();
        fm.write_address(0x20);
        fm.write_data(0xC0);
        fm.write_data(0xC7);
        assert_eq!(
            *events.lock(),
            vec![ChipEvent::Write(0x20, 0xC0), ChipEvent::Write(0x20, 0xC7)]
        );
        assert_eq!(fm.latch(), RegisterLatch::Latched(0x20));
    }

    #[test]
    fn opp_register_remap() {
        let (mut fm, events) = port();
        for reg in 0x00..0x08 {
            fm.write_address(reg);
            fm.write_data(0xAA);
        }
        fm.write_address(0x08);
        fm.write_data(0x01);
        fm.write_address(0x09);
        fm.write_data(0x02);
        assert_eq!(
            *events.lock(),
            vec![ChipEvent::Write(0x08, 0x01), ChipEvent::Write(0x01, 0x02)]
        );
    }

    #[test]
    fn writes_flush_owed_frames_first() {
        let (mut fm, events) = port();
        fm.begin_buffer(10);
        fm.write_address(0x20);
        fm.write_data(1);
        fm.advance(4);
        fm.write_data(2);
        fm.advance(3);
        fm.write_data(3);
        let out = fm.finish_buffer().to_vec();

        assert_eq!(
            *events.lock(),
            vec![
                ChipEvent::Write(0x20, 1),
                ChipEvent::Mix(4),
                ChipEvent::Write(0x20, 2),
                ChipEvent::Mix(3),
                ChipEvent::Write(0x20, 3),
                ChipEvent::Mix(3),
            ]
        );
        // Each register value only colours frames rendered after it.
        assert_eq!(out.len(), 20);
        assert!(out[..8].iter().all(|&s| s == 1));
        assert!(out[8..14].iter().all(|&s| s == 2));
        assert!(out[14..].iter().all(|&s| s == 3));
    }

    #[test]
    fn position_is_clamped_to_buffer() {
        let (mut fm, _events) = port();
        fm.begin_buffer(5);
        fm.advance(9);
        assert_eq!(fm.position(), 5);
        fm.flush();
        assert_eq!(fm.rendered(), 5);
        fm.flush();
        assert_eq!(fm.rendered(), 5);
    }
}

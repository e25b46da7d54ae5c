//! The card itself: shared device state, both port decoders and the
//! sample-synchronized Z80 loop.
//!
//! ```text
//!            host ports (16)                      Z80 ports
//!   PC ───► HostWrite/HostRead ──┐      ┌── CardWrite/CardRead ◄─── Z80
//!                                ▼      ▼
//!                        ┌──────────────────────┐
//!                        │      CardState       │
//!                        │  h2c / c2h mailboxes │
//!                        │  TCR + timer pair    │
//!                        │  MIDI USART, FM port │
//!                        └──────────────────────┘
//! ```
//!
//! Everything host-visible that can change the interrupt picture (mailbox
//! traffic, PIU control words, TCR writes, timer firings) recomputes the host
//! IRQ immediately. The Z80's INT input is resampled after every step.

use crate::clock::{RenderStats, SampleClock};
use crate::config::CardConfig;
use crate::cpu_backend::{CpuBus, DefaultCpu, Z80Cpu, HALT_NOP_CYCLES};
use crate::fm::{FmPort, FmSynth, OpmTimerCore, FM_CLOCK_HZ, OUTPUT_CHANNELS};
use crate::handshake::Handshake;
use crate::host::{HostBus, IrqLine, TimerId};
use crate::irq::{card_int, HostIrq};
use crate::memory::MemoryImage;
use crate::midi::{MidiInput, MidiPort};
use crate::pit::TimerPair;
use crate::ports::card::{self as card_ports, CardRead, CardWrite};
use crate::ports::host::{self as host_ports, HostRead, HostWrite};
use crate::ports::{PiuControl, PiuFlag};
use log::{debug, info, trace, warn};

/// Value driven on the bus for unmapped reads.
const OPEN_BUS: u8 = 0xFF;

/// Mutable device state shared by both decoders.
#[derive(Debug)]
pub struct CardState {
    host_to_card: Handshake,
    card_to_host: Handshake,
    extra_flag: bool,
    midi: MidiPort,
    timers: TimerPair,
    irq: HostIrq,
    fm: FmPort,
}

impl CardState {
    /// Fresh state: mailboxes empty, timers idle, FM backend reset.
    pub fn new(irq: u8, fm: Box<dyn FmSynth>) -> Self {
        Self {
            host_to_card: Handshake::new(),
            card_to_host: Handshake::new(),
            extra_flag: false,
            midi: MidiPort::new(),
            timers: TimerPair::new(),
            irq: HostIrq::new(irq),
            fm: FmPort::new(fm),
        }
    }

    /// Host→Card mailbox.
    pub fn host_to_card(&self) -> &Handshake {
        &self.host_to_card
    }

    /// Card→Host mailbox.
    pub fn card_to_host(&self) -> &Handshake {
        &self.card_to_host
    }

    /// PIU extra flag.
    pub fn extra_flag(&self) -> bool {
        self.extra_flag
    }

    /// Host interrupt domain.
    pub fn host_irq(&self) -> &HostIrq {
        &self.irq
    }

    /// Timer block.
    pub fn timers(&self) -> &TimerPair {
        &self.timers
    }

    /// MIDI USART.
    pub fn midi(&self) -> &MidiPort {
        &self.midi
    }

    /// FM chip façade.
    pub fn fm(&self) -> &FmPort {
        &self.fm
    }

    fn handshake_irq(&self) -> bool {
        self.host_to_card.tx_interrupt() || self.card_to_host.rx_interrupt()
    }

    fn update_host_irq<L: IrqLine + ?Sized>(&mut self, line: &mut L) {
        let handshake = self.handshake_irq();
        self.irq.update(handshake, line);
    }

    /// Sources of the Z80 INT line apart from the FM chip.
    fn card_int_sources(&self) -> bool {
        card_int(
            false,
            self.host_to_card.rx_interrupt(),
            self.card_to_host.tx_interrupt(),
            self.midi.interrupt_pending(self.irq.tcr()),
        )
    }

    fn apply_control(&mut self, control: PiuControl, side: &str, host: &mut dyn HostBus) {
        match control {
            PiuControl::Mode { supported: true, .. } => {}
            PiuControl::Mode { value, .. } => {
                warn!("{side}: unsupported PIU mode {value:02X}");
            }
            PiuControl::Unmapped { field } => {
                debug!("{side}: PIU set/reset of unmapped bit {field}");
            }
            PiuControl::Set(flag, on) => {
                match flag {
                    PiuFlag::HostToCardRx => self.host_to_card.set_rx_interrupt(on),
                    PiuFlag::HostToCardTx => self.host_to_card.set_tx_interrupt(on),
                    PiuFlag::CardToHostRx => self.card_to_host.set_rx_interrupt(on),
                    PiuFlag::CardToHostTx => self.card_to_host.set_tx_interrupt(on),
                    PiuFlag::Extra => self.extra_flag = on,
                }
                self.update_host_irq(host);
            }
        }
    }

    /// Z80 `IN` from `port`.
    pub fn card_read(&mut self, port: u8, host: &mut dyn HostBus) -> u8 {
        let value = match card_ports::decode_read(port) {
            CardRead::FmStatus => self.fm.read_status(),
            CardRead::Midi(odd) => self.midi.read(odd, self.irq.tcr()),
            CardRead::PeekCardToHost => self.card_to_host.peek(),
            CardRead::GetHostToCard => {
                let value = self.host_to_card.get();
                self.update_host_irq(host);
                value
            }
            CardRead::PiuStatus => card_ports::piu_status(
                &self.host_to_card,
                &self.card_to_host,
                self.extra_flag,
            ),
            CardRead::Unmapped => {
                debug!("card: read of unmapped port {port:02X}");
                OPEN_BUS
            }
        };
        trace!("card IN {port:02X} -> {value:02X}");
        value
    }

    /// Z80 `OUT` to `port`.
    pub fn card_write(&mut self, port: u8, value: u8, host: &mut dyn HostBus) {
        trace!("card OUT {port:02X} <- {value:02X}");
        match card_ports::decode_write(port) {
            CardWrite::FmAddress => self.fm.write_address(value),
            CardWrite::FmData => self.fm.write_data(value),
            CardWrite::Midi(odd) => self.midi.write(odd, value),
            CardWrite::PutCardToHost => {
                self.card_to_host.put(value);
                self.update_host_irq(host);
            }
            CardWrite::PiuControl => {
                self.apply_control(card_ports::decode_piu_control(value), "card", host);
            }
            CardWrite::Unmapped => {
                debug!("card: write {value:02X} to unmapped port {port:02X}");
            }
        }
    }

    /// Host read at `offset` from the base port.
    pub fn host_read(&mut self, offset: u8, host: &mut dyn HostBus) -> u8 {
        let value = match host_ports::decode_read(offset) {
            HostRead::GetCardToHost => {
                let value = self.card_to_host.get();
                self.update_host_irq(host);
                value
            }
            HostRead::PeekHostToCard => self.host_to_card.peek(),
            HostRead::PiuStatus => host_ports::piu_status(
                &self.host_to_card,
                &self.card_to_host,
                self.extra_flag,
            ),
            HostRead::Timer(addr) => self.timers.read(addr),
            HostRead::TimerStatus => self.irq.status(self.handshake_irq()),
            HostRead::Unmapped => {
                debug!("host: read of unmapped offset {offset:X}");
                OPEN_BUS
            }
        };
        trace!("host IN +{offset:X} -> {value:02X}");
        value
    }

    /// Host write at `offset` from the base port.
    pub fn host_write(&mut self, offset: u8, value: u8, host: &mut dyn HostBus) {
        trace!("host OUT +{offset:X} <- {value:02X}");
        match host_ports::decode_write(offset) {
            HostWrite::PutHostToCard => {
                self.host_to_card.put(value);
                self.update_host_irq(host);
            }
            HostWrite::PiuControl => {
                self.apply_control(host_ports::decode_piu_control(value), "host", host);
            }
            HostWrite::Timer(addr) => self.timers.write(addr, value, host),
            HostWrite::TimerControl => {
                self.irq.write_tcr(value);
                self.update_host_irq(host);
            }
            HostWrite::Unmapped => {
                debug!("host: write {value:02X} to unmapped offset {offset:X}");
            }
        }
    }

    /// A scheduled timer expired: latch, update the IRQ, re-arm.
    pub fn timer_expired(&mut self, timer: TimerId, host: &mut dyn HostBus) {
        if self.irq.timer_fired(timer) {
            trace!("timer {timer:?} pending");
        }
        self.update_host_irq(host);
        if let Some(period) = self.timers.period_ms(timer) {
            host.schedule(timer, period);
        }
    }
}

/// The Z80's view of the card for the duration of one step.
struct CardBus<'a> {
    memory: &'a mut MemoryImage,
    state: &'a mut CardState,
    host: &'a mut dyn HostBus,
}

impl CpuBus for CardBus<'_> {
    fn read(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.memory.write(addr, value);
    }

    fn port_in(&mut self, port: u8) -> u8 {
        self.state.card_read(port, &mut *self.host)
    }

    fn port_out(&mut self, port: u8, value: u8) {
        self.state.card_write(port, value, &mut *self.host);
    }
}

/// IBM Music Feature Card.
///
/// One instance per emulated card. The host drives it through
/// [`io_read`](Self::io_read)/[`io_write`](Self::io_write), reports timer
/// expiry through [`timer_expired`](Self::timer_expired) and pulls audio
/// with [`render`](Self::render).
pub struct MusicCard<C: Z80Cpu = DefaultCpu> {
    config: CardConfig,
    memory: Option<MemoryImage>,
    state: CardState,
    cpu: C,
    clock: SampleClock,
    int_line: bool,
    stats: RenderStats,
    silence: Vec<i16>,
}

impl MusicCard<DefaultCpu> {
    /// Build a card from `config`, loading its firmware.
    ///
    /// A missing or unreadable ROM is logged and leaves the card constructed
    /// but disabled: ports still respond, audio is silence, the Z80 never runs.
    pub fn from_config(config: CardConfig) -> Self {
        let memory = match config.firmware.as_ref() {
            Some(path) => match MemoryImage::load(path) {
                Ok(image) => Some(image),
                Err(err) => {
                    warn!("{err}");
                    None
                }
            },
            None => {
                warn!("no IMFC ROM image configured, card disabled");
                None
            }
        };
        Self::build(config, memory, Box::new(OpmTimerCore::new(FM_CLOCK_HZ)))
    }
}

impl<C: Z80Cpu> MusicCard<C> {
    /// Build an enabled card from an in-memory firmware image and FM backend.
    pub fn with_firmware(config: CardConfig, firmware: &[u8], fm: Box<dyn FmSynth>) -> Self {
        Self::build(config, Some(MemoryImage::from_bytes(firmware)), fm)
    }

    /// Build a card with no firmware (always silent).
    pub fn disabled(config: CardConfig, fm: Box<dyn FmSynth>) -> Self {
        Self::build(config, None, fm)
    }

    fn build(config: CardConfig, memory: Option<MemoryImage>, fm: Box<dyn FmSynth>) -> Self {
        let clock = SampleClock::new(config.sample_rate);
        let mut cpu = C::new();
        cpu.reset();
        if memory.is_some() {
            info!(
                "IMFC at {:#06X}, IRQ {}, {} Hz ({} T-states/sample)",
                config.base_port,
                config.irq,
                clock.sample_rate(),
                clock.cycles_per_sample()
            );
        }
        Self {
            state: CardState::new(config.irq, fm),
            config,
            memory,
            cpu,
            clock,
            int_line: false,
            stats: RenderStats::default(),
            silence: Vec::new(),
        }
    }

    /// Whether firmware is loaded and audio is produced.
    pub fn is_enabled(&self) -> bool {
        self.memory.is_some()
    }

    /// Configuration the card was built with.
    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Effective output rate.
    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    /// Shared device state (read-only).
    pub fn state(&self) -> &CardState {
        &self.state
    }

    /// The embedded CPU.
    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    /// The embedded CPU, mutably.
    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    /// Counters from the most recent [`render`](Self::render).
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Producer handle for the MIDI input FIFO.
    pub fn midi_input(&self) -> MidiInput {
        self.state.midi.input()
    }

    /// Host `IN` from absolute `port`.
    pub fn io_read(&mut self, port: u16, host: &mut dyn HostBus) -> u8 {
        if !self.config.decodes(port) {
            debug!("host read {port:#06X} outside card window");
            return OPEN_BUS;
        }
        let offset = (port - self.config.base_port) as u8;
        self.state.host_read(offset, host)
    }

    /// Host `OUT` to absolute `port`.
    pub fn io_write(&mut self, port: u16, value: u8, host: &mut dyn HostBus) {
        if !self.config.decodes(port) {
            debug!("host write {port:#06X} outside card window");
            return;
        }
        let offset = (port - self.config.base_port) as u8;
        self.state.host_write(offset, value, host);
    }

    /// Host scheduler callback for an expired timer.
    pub fn timer_expired(&mut self, timer: TimerId, host: &mut dyn HostBus) {
        self.state.timer_expired(timer, host);
    }

    /// Produce `frames` stereo frames, running the Z80 in lockstep.
    ///
    /// Returns `frames × 2` interleaved samples. A disabled card returns
    /// silence without touching the CPU.
    pub fn render(&mut self, frames: usize, host: &mut dyn HostBus) -> &[i16] {
        self.stats = RenderStats {
            frames,
            ..RenderStats::default()
        };
        let Some(memory) = self.memory.as_mut() else {
            self.silence.clear();
            self.silence.resize(frames * OUTPUT_CHANNELS, 0);
            return &self.silence;
        };

        self.state.fm.begin_buffer(frames);
        let mut budget = self.clock.budget(frames);
        let mut cursor = self.clock.cursor();

        while budget > 0 {
            let mut bus = CardBus {
                memory: &mut *memory,
                state: &mut self.state,
                host: &mut *host,
            };
            let mut cycles = 0;
            if self.int_line {
                self.stats.int_asserted_steps += 1;
                cycles = self.cpu.interrupt(&mut bus);
                if cycles > 0 {
                    self.stats.interrupts_taken += 1;
                }
            }
            if cycles == 0 {
                cycles = self.cpu.step(&mut bus);
            }
            if cycles == 0 {
                // A backend that stalls still burns the budget like a halted Z80.
                cycles = HALT_NOP_CYCLES;
            }
            self.stats.instructions += 1;
            self.stats.cycles += cycles as u64;

            budget -= cycles as i64;
            let reached = cursor.advance(cycles);
            if reached > 0 {
                self.state.fm.advance(reached);
            }

            let us = self.clock.elapsed_us(cycles);
            let fm_event = self.state.fm.count(us);
            self.int_line = fm_event || self.state.card_int_sources();
        }

        self.state.fm.finish_buffer()
    }
}

impl<C: Z80Cpu> std::fmt::Debug for MusicCard<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicCard")
            .field("config", &self.config)
            .field("enabled", &self.is_enabled())
            .field("state", &self.state)
            .field("int_line", &self.int_line)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DetachedHost, TimerScheduler};

    fn state() -> CardState {
        CardState::new(3, Box::new(OpmTimerCore::default()))
    }

    #[derive(Default)]
    struct Recorder {
        edges: Vec<bool>,
        scheduled: Vec<(TimerId, f64)>,
    }

    impl IrqLine for Recorder {
        fn raise_irq(&mut self, _irq: u8) {
            self.edges.push(true);
        }

        fn lower_irq(&mut self, _irq: u8) {
            self.edges.push(false);
        }
    }

    impl TimerScheduler for Recorder {
        fn schedule(&mut self, timer: TimerId, period_ms: f64) {
            self.scheduled.push((timer, period_ms));
        }

        fn cancel(&mut self, _timer: TimerId) {}
    }

    #[test]
    fn host_to_card_round_trip() {
        let mut s = state();
        let mut host = DetachedHost::new();
        s.host_write(1, 0x42, &mut host);
        assert!(s.host_to_card().is_ready());
        assert_eq!(s.host_read(1, &mut host), 0x42, "host peek");
        assert!(s.host_to_card().is_ready());

        assert_eq!(s.card_read(0x21, &mut host), 0x42);
        assert!(!s.host_to_card().is_ready());
        assert_eq!(s.card_read(0x22, &mut host) & 0x02, 0, "card view not ready");
        assert_eq!(s.host_read(2, &mut host) & 0x02, 0x02, "host view not ready");
    }

    #[test]
    fn card_to_host_round_trip() {
        let mut s = state();
        let mut host = DetachedHost::new();
        s.card_write(0x20, 0x99, &mut host);
        assert_eq!(s.card_read(0x20, &mut host), 0x99, "card peek");
        assert_eq!(s.host_read(2, &mut host) & 0x20, 0x20);
        assert_eq!(s.host_read(0, &mut host), 0x99);
        assert!(!s.card_to_host().is_ready());
        assert_eq!(s.card_read(0x22, &mut host) & 0x80, 0x80);
    }

    #[test]
    fn handshake_raises_host_irq_once_gated() {
        let mut s = state();
        let mut rec = Recorder::default();
        // Card→Host rx interrupt from the host side.
        s.host_write(3, 0x09, &mut rec);
        s.card_write(0x20, 0x01, &mut rec);
        assert!(rec.edges.is_empty(), "TCR gate still closed");

        s.host_write(8, 0xC0, &mut rec);
        assert_eq!(rec.edges, vec![true]);
        s.host_write(8, 0xC0, &mut rec);
        assert_eq!(rec.edges, vec![true]);

        s.host_read(0, &mut rec);
        assert_eq!(rec.edges, vec![true, false]);
    }

    #[test]
    fn timer_expiry_latches_and_rearms() {
        let mut s = state();
        let mut rec = Recorder::default();
        s.host_write(8, 0xC7, &mut rec);
        s.host_write(7, 0x34, &mut rec);
        s.host_write(4, 0x10, &mut rec);
        s.host_write(4, 0x00, &mut rec);
        assert_eq!(rec.scheduled.len(), 1);

        s.timer_expired(TimerId::A, &mut rec);
        assert_eq!(rec.edges, vec![true]);
        assert_eq!(rec.scheduled.len(), 2);
        assert_eq!(rec.scheduled[0], rec.scheduled[1]);
        assert_eq!(s.host_read(0x0C, &mut rec), 0xFD);

        // Clearing the acknowledge bit drops the pending timer.
        s.host_write(9, 0xC6, &mut rec);
        assert_eq!(rec.edges, vec![true, false]);
        assert_eq!(s.host_read(0x0F, &mut rec), 0x7C);
    }

    #[test]
    fn card_control_words() {
        let mut s = state();
        let mut host = DetachedHost::new();
        s.card_write(0x23, 0x0B, &mut host);
        assert!(s.extra_flag());
        assert_eq!(s.host_read(2, &mut host) & 0x80, 0x80);
        s.card_write(0x23, 0x05, &mut host);
        assert!(s.host_to_card().rx_interrupt_enabled());
        s.card_write(0x23, 0x0D, &mut host);
        assert!(s.card_to_host().tx_interrupt_enabled());
        assert!(s.card_int_sources(), "empty Card→Host with tx enabled");

        s.card_write(0x23, 0xA6, &mut host);
        s.card_write(0x23, 0x80, &mut host);
        assert!(s.card_to_host().tx_interrupt_enabled(), "mode words change nothing");
    }

    #[test]
    fn unmapped_ports_float_high() {
        let mut s = state();
        let mut host = DetachedHost::new();
        assert_eq!(s.card_read(0x30, &mut host), 0xFF);
        assert_eq!(s.card_read(0x24, &mut host), 0xFF);
        assert_eq!(s.card_read(0x00, &mut host), 0xFF);
        assert_eq!(s.host_read(3, &mut host), 0xFF);
        assert_eq!(s.host_read(8, &mut host), 0xFF);
        assert_eq!(s.host_read(5, &mut host), 0x00, "timer read-back");
        s.host_write(0x0C, 0x12, &mut host);
        s.card_write(0x2F, 0x12, &mut host);
    }

    #[test]
    fn midi_interrupt_follows_tcr_bit() {
        let mut s = state();
        let mut host = DetachedHost::new();
        for _ in 0..3 {
            s.card_write(0x11, 0x4E, &mut host);
        }
        s.card_write(0x11, 0x05, &mut host);
        s.host_write(8, 0x10, &mut host);
        assert!(!s.card_int_sources());
        s.host_write(8, 0x00, &mut host);
        assert!(s.card_int_sources());
        assert_eq!(s.card_read(0x11, &mut host), 0x80 | 0x04 | 0x01);
    }

    #[test]
    fn fm_ports_reach_the_chip() {
        let mut s = state();
        let mut host = DetachedHost::new();
        s.card_write(0x00, 0x12, &mut host);
        s.card_write(0x01, 0xFF, &mut host);
        s.card_write(0x00, 0x14, &mut host);
        s.card_write(0x01, 0x0A, &mut host);
        assert!(s.fm.count(300));
        assert_eq!(s.card_read(0x01, &mut host) & 0x02, 0x02);
    }
}

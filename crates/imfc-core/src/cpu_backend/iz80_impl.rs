//! `iz80` backend implementation.
//!
//! `iz80` wants a `Machine` for the duration of each instruction. The card's
//! bus is borrowed for exactly one step, so a thin adapter wraps it and is
//! dropped as soon as the instruction finishes.
//!
//! Interrupt acknowledge is done here rather than inside `iz80`: the engine
//! only knows IM 1, while the card's firmware may run in any mode. The data
//! bus floats during the acknowledge cycle, so IM 0 fetches `RST 38h` and
//! IM 2 reads its vector from `(I << 8) | 0xFF`. IFF1, the interrupt mode
//! and the halt latch are only reachable through the engine's state
//! snapshot.

use super::{CpuBus, Z80Cpu};
use iz80::{Cpu, Machine, Reg16, Reg8};
use log::warn;

/// T-states of the internal NOP a halted Z80 repeats.
pub const HALT_NOP_CYCLES: u32 = 4;

/// Byte the card presents on the data bus during interrupt acknowledge.
const FLOATING_BUS: u8 = 0xFF;

/// Restart target for IM 0 (`RST 38h` from the floating bus) and IM 1.
const RST38_VECTOR: u16 = 0x0038;

/// Acknowledge cost for IM 0 with `RST` on the bus, and for IM 1.
const IM0_IM1_ACK_CYCLES: u32 = 13;

/// Acknowledge cost for IM 2.
const IM2_ACK_CYCLES: u32 = 19;

// Offsets into `Cpu::serialize`: 16 registers, 16 shadows, PC (2), IFF1,
// IFF2, IM, then the 64-bit cycle counter and the execution latches.
const SNAP_IFF1: usize = 34;
const SNAP_IFF2: usize = 35;
const SNAP_IM: usize = 36;
const SNAP_HALTED: usize = 46;
const SNAP_INT_JUST_ENABLED: usize = 50;
const SNAP_LEN: usize = 53;

/// Interrupt-relevant view of the engine state.
struct Snapshot {
    bytes: Vec<u8>,
}

impl Snapshot {
    fn capture(cpu: &Cpu) -> Option<Self> {
        let bytes = cpu.serialize();
        if bytes.len() < SNAP_LEN {
            warn!("iz80 state snapshot is {} bytes, expected {SNAP_LEN}", bytes.len());
            return None;
        }
        Some(Self { bytes })
    }

    fn accepts_interrupt(&self) -> bool {
        self.bytes[SNAP_IFF1] != 0 && self.bytes[SNAP_INT_JUST_ENABLED] == 0
    }

    fn interrupt_mode(&self) -> u8 {
        self.bytes[SNAP_IM]
    }

    /// Clear IFF1/IFF2 and leave the halt state.
    fn acknowledge(&mut self) {
        self.bytes[SNAP_IFF1] = 0;
        self.bytes[SNAP_IFF2] = 0;
        self.bytes[SNAP_HALTED] = 0;
    }
}

/// Borrowed view of a [`CpuBus`] as an `iz80::Machine`.
struct BusAdapter<'a, B: CpuBus> {
    bus: &'a mut B,
}

impl<B: CpuBus> Machine for BusAdapter<'_, B> {
    fn peek(&self, address: u16) -> u8 {
        self.bus.read(address)
    }

    fn poke(&mut self, address: u16, value: u8) {
        self.bus.write(address, value);
    }

    fn port_in(&mut self, address: u16) -> u8 {
        self.bus.port_in(address as u8)
    }

    fn port_out(&mut self, address: u16, value: u8) {
        self.bus.port_out(address as u8, value);
    }
}

/// Z80 engine backed by the `iz80` crate.
pub struct Iz80Backend {
    cpu: Cpu,
    /// T-states spent outside `execute_instruction` (halt NOPs, acknowledges).
    extra_cycles: u64,
}

impl Iz80Backend {
    fn run<B: CpuBus>(&mut self, bus: &mut B) -> u32 {
        let before = self.cpu.cycle_count();
        let mut machine = BusAdapter { bus };
        self.cpu.execute_instruction(&mut machine);
        match (self.cpu.cycle_count() - before) as u32 {
            // Halted: iz80 returns without fetching.
            0 => {
                self.extra_cycles += HALT_NOP_CYCLES as u64;
                HALT_NOP_CYCLES
            }
            cycles => cycles,
        }
    }

    fn push<B: CpuBus>(&mut self, bus: &mut B, value: u16) {
        let regs = self.cpu.registers();
        let sp = regs.get16(Reg16::SP).wrapping_sub(2);
        regs.set16(Reg16::SP, sp);
        bus.write(sp.wrapping_add(1), (value >> 8) as u8);
        bus.write(sp, value as u8);
    }

    /// Current program counter.
    pub fn pc(&self) -> u16 {
        self.cpu.immutable_registers().pc()
    }

    /// Stack pointer.
    pub fn sp(&self) -> u16 {
        self.cpu.immutable_registers().get16(Reg16::SP)
    }

    /// Whether the CPU is sitting in `HALT`.
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }
}

impl Z80Cpu for Iz80Backend {
    fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            extra_cycles: 0,
        }
    }

    fn reset(&mut self) {
        self.cpu = Cpu::new();
        self.extra_cycles = 0;
    }

    fn step<B: CpuBus>(&mut self, bus: &mut B) -> u32 {
        self.run(bus)
    }

    fn interrupt<B: CpuBus>(&mut self, bus: &mut B) -> u32 {
        let Some(mut snapshot) = Snapshot::capture(&self.cpu) else {
            return 0;
        };
        if !snapshot.accepts_interrupt() {
            return 0;
        }

        let mode = snapshot.interrupt_mode();
        snapshot.acknowledge();
        if let Err(err) = self.cpu.deserialize(&snapshot.bytes) {
            warn!("iz80 rejected its own state snapshot: {err}");
            return 0;
        }

        let (target, cycles) = match mode {
            2 => {
                let table = (u16::from(self.cpu.immutable_registers().get8(Reg8::I)) << 8)
                    | u16::from(FLOATING_BUS);
                let vector = u16::from_le_bytes([bus.read(table), bus.read(table.wrapping_add(1))]);
                (vector, IM2_ACK_CYCLES)
            }
            // IM 0 executes the floating bus byte, RST 38h.
            _ => (RST38_VECTOR, IM0_IM1_ACK_CYCLES),
        };
        let pc = self.pc();
        self.push(bus, pc);
        self.cpu.registers().set_pc(target);
        self.extra_cycles += cycles as u64;
        cycles
    }

    fn total_cycles(&self) -> u64 {
        self.cpu.cycle_count() + self.extra_cycles
    }
}

impl Default for Iz80Backend {
    fn default() -> Self {
        <Self as Z80Cpu>::new()
    }
}

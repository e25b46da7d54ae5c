//! Abstraction layer for the card's Z80.
//!
//! The device model only needs "run one instruction" and "offer a maskable
//! interrupt" plus a cycle count. Keeping that behind a trait lets tests
//! drive the co-simulation loop with a deterministic fake CPU, while the
//! default backend runs real firmware through `iz80`.

mod iz80_impl;

pub use iz80_impl::{Iz80Backend, HALT_NOP_CYCLES};

/// Default CPU backend type alias.
pub type DefaultCpu = Iz80Backend;

/// Memory and I/O interface seen by the Z80 during execution.
///
/// Implementations route memory to the ROM/RAM image and port accesses to
/// the card's internal port decoder.
pub trait CpuBus {
    /// Read a byte from memory.
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory.
    fn write(&mut self, addr: u16, value: u8);

    /// `IN` from an 8-bit I/O port.
    fn port_in(&mut self, port: u8) -> u8;

    /// `OUT` to an 8-bit I/O port.
    fn port_out(&mut self, port: u8, value: u8);
}

/// Unified Z80 interface.
pub trait Z80Cpu {
    /// Create a CPU in reset state.
    fn new() -> Self;

    /// Return to the power-on state (PC = 0, interrupts disabled).
    fn reset(&mut self);

    /// Execute a single instruction and return the number of T-states consumed.
    ///
    /// A halted CPU still reports the cost of its internal NOP, never 0.
    fn step<B: CpuBus>(&mut self, bus: &mut B) -> u32;

    /// Offer a maskable interrupt at the current instruction boundary.
    ///
    /// On acceptance the CPU leaves `HALT`, pushes PC and jumps to the
    /// handler; the acknowledge cost is returned. Returns 0 when interrupts
    /// are masked, and nothing executes. Callers fall back to
    /// [`Z80Cpu::step`] on 0.
    fn interrupt<B: CpuBus>(&mut self, bus: &mut B) -> u32;

    /// Total T-states executed since reset.
    fn total_cycles(&self) -> u64;
}

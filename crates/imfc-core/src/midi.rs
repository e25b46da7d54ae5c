//! MIDI input path: a 64-byte FIFO behind the card's 8251-style USART.
//!
//! The FIFO is the only structure shared across threads. A producer (the
//! host-side MIDI source) appends through a [`MidiInput`] handle while the
//! emulation loop drains it one byte at a time through the USART data port.
//! Every access holds the queue lock for a single O(1) buffer operation and
//! never calls out to another component while holding it.
//!
//! USART register layout seen by the Z80 (sub-address parity):
//!
//! | Port | Read                  | Write                       |
//! |------|-----------------------|-----------------------------|
//! | even | receive data (FIFO)   | transmit data (ignored)     |
//! | odd  | status                | mode / command              |
//!
//! Status bits: `0x01` FIFO not full, `0x02` FIFO not empty, `0x04` FIFO
//! empty, `0x80` TCR bit `0x10` clear.

use log::trace;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Capacity of the MIDI receive FIFO in bytes.
pub const MIDI_QUEUE_CAPACITY: usize = 64;

/// TCR bit that masks USART interrupt eligibility.
const TCR_MIDI_MASK: u8 = 0x10;

/// Command bit selecting receive-interrupt eligibility.
const CMD_RX_ENABLE: u8 = 0x01;

/// Command bit requesting an internal reset (back to mode-word setup).
const CMD_INTERNAL_RESET: u8 = 0x40;

/// Writes to the command port that are consumed as mode/sync words after reset.
const SETUP_WRITES: u8 = 3;

const STATUS_NOT_FULL: u8 = 0x01;
const STATUS_NOT_EMPTY: u8 = 0x02;
const STATUS_EMPTY: u8 = 0x04;
const STATUS_TCR_UNMASKED: u8 = 0x80;

/// Bounded FIFO shared by the producer thread and the emulation loop.
#[derive(Debug)]
pub struct MidiQueue {
    bytes: Mutex<VecDeque<u8>>,
}

impl MidiQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(VecDeque::with_capacity(MIDI_QUEUE_CAPACITY)),
        }
    }

    /// Append as many bytes as fit; the overflow is dropped silently.
    ///
    /// Returns the number of bytes accepted.
    pub fn enqueue(&self, data: &[u8]) -> usize {
        let mut bytes = self.bytes.lock();
        let room = MIDI_QUEUE_CAPACITY - bytes.len();
        let take = data.len().min(room);
        bytes.extend(&data[..take]);
        take
    }

    /// Remove the oldest byte, if any.
    pub fn dequeue_one(&self) -> Option<u8> {
        self.bytes.lock().pop_front()
    }

    /// Number of bytes currently queued.
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Whether the queue holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue has room for at least one more byte.
    pub fn is_not_full(&self) -> bool {
        self.len() < MIDI_QUEUE_CAPACITY
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.bytes.lock().clear();
    }
}

impl Default for MidiQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle for feeding MIDI bytes into a card from any thread.
#[derive(Debug, Clone)]
pub struct MidiInput {
    queue: Arc<MidiQueue>,
}

impl MidiInput {
    /// Append bytes, truncating whatever does not fit in the FIFO.
    pub fn enqueue(&self, data: &[u8]) -> usize {
        let accepted = self.queue.enqueue(data);
        if accepted < data.len() {
            trace!(
                "MIDI FIFO full: dropped {} of {} bytes",
                data.len() - accepted,
                data.len()
            );
        }
        accepted
    }

    /// Bytes waiting for the firmware.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// USART register state owned by the emulation loop.
#[derive(Debug)]
pub struct MidiPort {
    queue: Arc<MidiQueue>,
    command: u8,
    setup_remaining: u8,
}

impl MidiPort {
    /// Create a port with an empty FIFO, awaiting its mode words.
    pub fn new() -> Self {
        Self {
            queue: Arc::new(MidiQueue::new()),
            command: 0,
            setup_remaining: SETUP_WRITES,
        }
    }

    /// Hand out a producer handle sharing this port's FIFO.
    pub fn input(&self) -> MidiInput {
        MidiInput {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Direct access to the shared FIFO.
    pub fn queue(&self) -> &MidiQueue {
        &self.queue
    }

    /// Last command word accepted after setup.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Z80 read of the data (`odd == false`) or status (`odd == true`) port.
    pub fn read(&self, odd: bool, tcr: u8) -> u8 {
        if odd {
            self.status(tcr)
        } else {
            self.queue.dequeue_one().unwrap_or(0)
        }
    }

    /// Z80 write of the data (`odd == false`) or command (`odd == true`) port.
    pub fn write(&mut self, odd: bool, value: u8) {
        if !odd {
            trace!("MIDI out byte {value:02X} ignored");
            return;
        }
        if self.setup_remaining > 0 {
            self.setup_remaining -= 1;
            return;
        }
        self.command = value;
        if value & CMD_INTERNAL_RESET != 0 {
            self.setup_remaining = SETUP_WRITES;
        }
    }

    /// Status byte, sampled under a single lock.
    pub fn status(&self, tcr: u8) -> u8 {
        let len = self.queue.len();
        let mut status = 0;
        if len < MIDI_QUEUE_CAPACITY {
            status |= STATUS_NOT_FULL;
        }
        if len > 0 {
            status |= STATUS_NOT_EMPTY;
        } else {
            status |= STATUS_EMPTY;
        }
        if tcr & TCR_MIDI_MASK == 0 {
            status |= STATUS_TCR_UNMASKED;
        }
        status
    }

    /// Whether the USART asserts its interrupt towards the Z80.
    ///
    /// Eligibility is the receive-enable command bit combined with TCR bit
    /// `0x10` being clear. FIFO fill level does not participate.
    pub fn interrupt_pending(&self, tcr: u8) -> bool {
        self.command & CMD_RX_ENABLE != 0 && tcr & TCR_MIDI_MASK == 0
    }
}

impl Default for MidiPort {
    fn default() -> Self {
        Self::new()
    }
}

//! One direction of the PIU handshake link between host and card.
//!
//! Each direction is a single-byte mailbox. The writer side deposits a byte
//! and raises "ready"; the reader side takes it (clearing "ready") or peeks at
//! it without side effects. Two gates decide whether the mailbox state counts
//! as an interrupt:
//!
//! - **rx**: a byte is waiting for the reader (`ready && rx_enabled`)
//! - **tx**: the mailbox is empty and can accept a new byte (`!ready && tx_enabled`)
//!
//! Interrupt recomputation is the caller's job; the mailbox only answers the
//! two predicates.

/// Single-byte mailbox with ready and interrupt-enable flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    data: u8,
    ready: bool,
    rx_int_enabled: bool,
    tx_int_enabled: bool,
}

impl Handshake {
    /// Create an empty mailbox with both interrupt gates closed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a byte and mark it ready.
    pub fn put(&mut self, value: u8) {
        self.data = value;
        self.ready = true;
    }

    /// Take the stored byte, clearing ready.
    pub fn get(&mut self) -> u8 {
        self.ready = false;
        self.data
    }

    /// Read the stored byte without consuming it.
    pub fn peek(&self) -> u8 {
        self.data
    }

    /// Whether a byte is waiting.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Open or close the receive interrupt gate.
    pub fn set_rx_interrupt(&mut self, enabled: bool) {
        self.rx_int_enabled = enabled;
    }

    /// Open or close the transmit interrupt gate.
    pub fn set_tx_interrupt(&mut self, enabled: bool) {
        self.tx_int_enabled = enabled;
    }

    /// Receive interrupt gate state.
    pub fn rx_interrupt_enabled(&self) -> bool {
        self.rx_int_enabled
    }

    /// Transmit interrupt gate state.
    pub fn tx_interrupt_enabled(&self) -> bool {
        self.tx_int_enabled
    }

    /// A byte is waiting and the receive gate is open.
    pub fn rx_interrupt(&self) -> bool {
        self.ready && self.rx_int_enabled
    }

    /// The mailbox is free and the transmit gate is open.
    pub fn tx_interrupt(&self) -> bool {
        !self.ready && self.tx_int_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_consumes_once() {
        let mut mb = Handshake::new();
        assert!(!mb.is_ready());
        mb.put(0x5A);
        assert!(mb.is_ready());
        assert_eq!(mb.get(), 0x5A);
        assert!(!mb.is_ready());
        // Data latch survives the destructive read.
        assert_eq!(mb.get(), 0x5A);
        assert!(!mb.is_ready());
    }

    #[test]
    fn peek_never_changes_state() {
        let mut mb = Handshake::new();
        mb.put(0x11);
        let before = mb.clone();
        for _ in 0..4 {
            assert_eq!(mb.peek(), 0x11);
        }
        assert_eq!(mb, before);
    }

    #[test]
    fn ready_tracks_put_get_sequences() {
        let mut mb = Handshake::new();
        let script: &[(bool, u8)] = &[
            (true, 1),
            (true, 2),
            (false, 0),
            (false, 0),
            (true, 3),
            (false, 0),
        ];
        let mut expected_ready = false;
        let mut last = 0;
        for &(is_put, value) in script {
            if is_put {
                mb.put(value);
                last = value;
                expected_ready = true;
            } else {
                assert_eq!(mb.get(), last);
                expected_ready = false;
            }
            assert_eq!(mb.is_ready(), expected_ready);
        }
    }

    #[test]
    fn interrupt_predicates_follow_gates() {
        let mut mb = Handshake::new();
        assert!(!mb.rx_interrupt());
        assert!(!mb.tx_interrupt());

        mb.set_tx_interrupt(true);
        assert!(mb.tx_interrupt(), "empty mailbox with tx gate open");
        mb.put(0x42);
        assert!(!mb.tx_interrupt());
        assert!(!mb.rx_interrupt(), "rx gate still closed");

        mb.set_rx_interrupt(true);
        assert!(mb.rx_interrupt());
        mb.get();
        assert!(!mb.rx_interrupt());
        assert!(mb.tx_interrupt());
    }
}

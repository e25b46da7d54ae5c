//! Services the host machine provides to the card.
//!
//! The card never owns real time or the host interrupt controller. It asks
//! the host to raise or lower its IRQ line and to schedule one-shot timer
//! callbacks; the host reports expiry back through
//! [`MusicCard::timer_expired`](crate::MusicCard::timer_expired).

/// The two host-visible interval timers built from the 8253 channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Channel 0, clocked at 500 kHz.
    A,
    /// Channels 1 and 2 cascaded, clocked at 2 MHz.
    B,
}

impl TimerId {
    /// Bit this timer occupies in the pending/status register.
    pub const fn pending_bit(self) -> u8 {
        match self {
            TimerId::A => 0x01,
            TimerId::B => 0x02,
        }
    }
}

/// Host interrupt controller line.
pub trait IrqLine {
    /// Assert the shared IRQ line.
    fn raise_irq(&mut self, irq: u8);

    /// Release the shared IRQ line.
    fn lower_irq(&mut self, irq: u8);
}

/// Host periodic-event scheduler.
pub trait TimerScheduler {
    /// Fire `timer` once after `period_ms` milliseconds.
    fn schedule(&mut self, timer: TimerId, period_ms: f64);

    /// Drop every pending event for `timer`.
    fn cancel(&mut self, timer: TimerId);
}

/// Everything the card needs from the host side.
pub trait HostBus: IrqLine + TimerScheduler {}

impl<T: IrqLine + TimerScheduler + ?Sized> HostBus for T {}

/// Host stand-in for running the card without a PC around it.
///
/// The IRQ line is tracked as a level and scheduled timers are remembered but
/// never fire on their own; callers that want timer activity poll
/// [`DetachedHost::scheduled`] and call back into the card themselves.
#[derive(Debug, Default, Clone)]
pub struct DetachedHost {
    irq_active: bool,
    scheduled: [Option<f64>; 2],
}

impl DetachedHost {
    /// Create a host with the line released and nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level of the IRQ line.
    pub fn irq_active(&self) -> bool {
        self.irq_active
    }

    /// Period of the pending event for `timer`, if any.
    pub fn scheduled(&self, timer: TimerId) -> Option<f64> {
        self.scheduled[timer as usize]
    }

    /// Remove and return the pending event for `timer`.
    pub fn take_scheduled(&mut self, timer: TimerId) -> Option<f64> {
        self.scheduled[timer as usize].take()
    }
}

impl IrqLine for DetachedHost {
    fn raise_irq(&mut self, _irq: u8) {
        self.irq_active = true;
    }

    fn lower_irq(&mut self, _irq: u8) {
        self.irq_active = false;
    }
}

impl TimerScheduler for DetachedHost {
    fn schedule(&mut self, timer: TimerId, period_ms: f64) {
        self.scheduled[timer as usize] = Some(period_ms);
    }

    fn cancel(&mut self, timer: TimerId) {
        self.scheduled[timer as usize] = None;
    }
}

//! Offline host: emulated-time timer queue and an IRQ edge counter.

use imfc::{IrqLine, TimerId, TimerScheduler};

/// Host environment driven by the renderer's own notion of time.
#[derive(Debug, Default)]
pub struct OfflineHost {
    now_ms: f64,
    deadlines: [Option<f64>; 2],
    irq_active: bool,
    raised: u64,
}

impl OfflineHost {
    /// Host at t = 0 with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulated time in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Number of rising edges seen on the IRQ line.
    pub fn irq_raised(&self) -> u64 {
        self.raised
    }

    /// Whether the IRQ line is currently asserted.
    pub fn irq_active(&self) -> bool {
        self.irq_active
    }

    /// Move time forward to `now_ms`.
    pub fn advance_to(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
    }

    /// Pop the earliest timer due at or before the current time.
    ///
    /// Time is rewound to the deadline so the callback reschedules from it.
    pub fn next_due(&mut self) -> Option<(TimerId, f64)> {
        let target = self.now_ms;
        let (timer, deadline) = [TimerId::A, TimerId::B]
            .into_iter()
            .filter_map(|t| self.deadlines[t as usize].map(|at| (t, at)))
            .filter(|&(_, at)| at <= target)
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        self.deadlines[timer as usize] = None;
        self.now_ms = deadline;
        Some((timer, target))
    }
}

impl IrqLine for OfflineHost {
    fn raise_irq(&mut self, _irq: u8) {
        self.irq_active = true;
        self.raised += 1;
    }

    fn lower_irq(&mut self, _irq: u8) {
        self.irq_active = false;
    }
}

impl TimerScheduler for OfflineHost {
    fn schedule(&mut self, timer: TimerId, period_ms: f64) {
        self.deadlines[timer as usize] = Some(self.now_ms + period_ms);
    }

    fn cancel(&mut self, timer: TimerId) {
        self.deadlines[timer as usize] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_timers_fire_in_deadline_order() {
        let mut host = OfflineHost::new();
        host.schedule(TimerId::B, 3.0);
        host.schedule(TimerId::A, 1.0);
        host.advance_to(5.0);

        let (first, resume) = host.next_due().unwrap();
        assert_eq!(first, TimerId::A);
        assert_eq!(host.now_ms(), 1.0);
        // Re-arm from the deadline, as the card does on expiry.
        host.schedule(TimerId::A, 1.0);
        host.advance_to(resume);

        let order: Vec<TimerId> = std::iter::from_fn(|| {
            let (timer, resume) = host.next_due()?;
            host.advance_to(resume);
            Some(timer)
        })
        .collect();
        assert_eq!(order, vec![TimerId::A, TimerId::B]);
    }

    #[test]
    fn cancel_drops_deadline() {
        let mut host = OfflineHost::new();
        host.schedule(TimerId::A, 1.0);
        host.cancel(TimerId::A);
        host.advance_to(10.0);
        assert!(host.next_due().is_none());
    }
}

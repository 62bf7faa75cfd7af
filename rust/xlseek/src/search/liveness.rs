//! Stall and deadlock supervision.
//!
//! [`LivenessMonitor`] only looks at a progress counter, deciding when a
//! deadlock probe is worth running. Probes are rare because a quiet period
//! is usually legitimate (one very large scan, a slow disk), and each quiet
//! probe pushes the next one further out.

use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    Progressed,
    Quiet,
    /// Quiet for long enough that a deadlock probe should run.
    ProbeDue,
}

#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    last_count: u64,
    quiet_polls: u64,
    probe_after: u64,
    next_probe: u64,
    widening: u64,
    probes: u32,
}

impl LivenessMonitor {
    pub fn new(probe_after: u64, widening: u64) -> Self {
        let probe_after = probe_after.max(1);
        Self {
            last_count: 0,
            quiet_polls: 0,
            probe_after,
            next_probe: probe_after,
            widening: widening.max(1),
            probes: 0,
        }
    }

    /// Feeds the current value of the progress counter.
    pub fn observe(&mut self, count: u64) -> LivenessEvent {
        if count != self.last_count {
            self.last_count = count;
            self.quiet_polls = 0;
            self.next_probe = self.probe_after;
            return LivenessEvent::Progressed;
        }
        self.quiet_polls += 1;
        if self.quiet_polls >= self.next_probe {
            self.next_probe = self.next_probe.saturating_mul(self.widening);
            self.probes += 1;
            LivenessEvent::ProbeDue
        } else {
            LivenessEvent::Quiet
        }
    }

    pub fn quiet_polls(&self) -> u64 {
        self.quiet_polls
    }

    /// Quiet polls until the next probe is due.
    pub fn next_probe(&self) -> u64 {
        self.next_probe
    }

    pub fn probes(&self) -> u32 {
        self.probes
    }
}

/// Looks for threads blocked on each other.
pub trait DeadlockProbe: Send + Sync {
    /// A description of every cycle found, `None` when there is none.
    fn check(&self) -> Option<String>;
}

/// Inspects the lock graph of every `parking_lot` lock in the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParkingLotProbe;

impl DeadlockProbe for ParkingLotProbe {
    fn check(&self) -> Option<String> {
        let deadlocks = parking_lot::deadlock::check_deadlock();
        if deadlocks.is_empty() {
            return None;
        }
        let mut dump = String::new();
        for (i, threads) in deadlocks.iter().enumerate() {
            let _ = writeln!(dump, "Deadlock #{i}");
            for t in threads {
                let _ = writeln!(dump, "Thread Id {:#?}", t.thread_id());
                let _ = writeln!(dump, "{:#?}", t.backtrace());
            }
        }
        Some(dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_interval_widens() {
        let mut monitor = LivenessMonitor::new(3, 10);
        assert_eq!(monitor.observe(5), LivenessEvent::Progressed);
        assert_eq!(monitor.observe(5), LivenessEvent::Quiet);
        assert_eq!(monitor.observe(5), LivenessEvent::Quiet);
        assert_eq!(monitor.observe(5), LivenessEvent::ProbeDue);
        assert_eq!(monitor.next_probe(), 30);

        let events: Vec<LivenessEvent> = (0..27).map(|_| monitor.observe(5)).collect();
        assert_eq!(events[25], LivenessEvent::Quiet);
        assert_eq!(events[26], LivenessEvent::ProbeDue);
        assert_eq!(monitor.probes(), 2);

        // Progress resets the schedule.
        assert_eq!(monitor.observe(6), LivenessEvent::Progressed);
        assert_eq!(monitor.next_probe(), 3);
        assert_eq!(monitor.quiet_polls(), 0);
    }

    #[test]
    fn test_no_deadlock_without_locks() {
        assert!(ParkingLotProbe.check().is_none());
    }
}

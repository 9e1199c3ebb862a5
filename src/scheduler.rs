use std::time::{Duration, Instant};

/// Fixed-interval trigger for stats dumps, driven by the caller's loop.
///
/// The first trigger is due immediately so the initial enumeration happens at
/// startup. A loop that falls behind gets one trigger, not a burst.
#[derive(Clone, Debug)]
pub struct PollScheduler {
    interval: Duration,
    next_due: Instant,
}

impl PollScheduler {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self { interval, next_due: now }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Record a trigger fired at `now` and schedule the next one.
    pub fn mark_fired(&mut self, now: Instant) {
        let next = self.next_due + self.interval;
        self.next_due = if next <= now { now + self.interval } else { next };
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::PollScheduler;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn first_trigger_is_immediate() {
        let t0 = Instant::now();
        let sched = PollScheduler::new(SEC, t0);
        assert!(sched.is_due(t0));
        assert_eq!(sched.time_until_due(t0), Duration::ZERO);
    }

    #[test]
    fn fires_once_per_interval() {
        let t0 = Instant::now();
        let mut sched = PollScheduler::new(SEC, t0);
        sched.mark_fired(t0);

        assert!(!sched.is_due(t0 + Duration::from_millis(999)));
        assert_eq!(sched.time_until_due(t0 + Duration::from_millis(400)), Duration::from_millis(600));
        assert!(sched.is_due(t0 + SEC));
    }

    #[test]
    fn late_fire_keeps_cadence_without_drift() {
        let t0 = Instant::now();
        let mut sched = PollScheduler::new(SEC, t0);
        sched.mark_fired(t0);
        sched.mark_fired(t0 + Duration::from_millis(1050));
        assert_eq!(sched.time_until_due(t0 + Duration::from_millis(1050)), Duration::from_millis(950));
    }

    #[test]
    fn stalled_loop_does_not_burst() {
        let t0 = Instant::now();
        let mut sched = PollScheduler::new(SEC, t0);
        sched.mark_fired(t0);

        let late = t0 + Duration::from_secs(10);
        assert!(sched.is_due(late));
        sched.mark_fired(late);
        assert!(!sched.is_due(late));
        assert_eq!(sched.time_until_due(late), SEC);
    }
}

//! Deadline-based debouncing.
//!
//! The binding never spawns timers itself. A `Debouncer` records when its
//! payload becomes due; the host's event loop calls `poll` with the current
//! instant (or `flush` to force delivery).

use std::time::Duration;

use web_time::Instant;

/// Coalesces scheduled work into at most one delivery per quiet interval.
///
/// Each `schedule` call merges into the pending payload and pushes the
/// deadline back to `now + delay`.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    deadline: Option<Instant>,
    pending: Option<T>,
}

impl<T: Default> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            pending: None,
        }
    }

    pub fn schedule(&mut self, now: Instant, update: impl FnOnce(&mut T)) {
        update(self.pending.get_or_insert_with(T::default));
        self.deadline = Some(now + self.delay);
    }

    /// Take the payload if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Take the payload regardless of the deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn test_reschedule_pushes_deadline_and_merges() {
        let start = Instant::now();
        let mut debouncer: Debouncer<BTreeSet<u64>> = Debouncer::new(Duration::from_millis(10));

        debouncer.schedule(start, |set| {
            set.insert(1);
        });
        debouncer.schedule(start + Duration::from_millis(8), |set| {
            set.insert(2);
        });

        assert_eq!(debouncer.poll(start + Duration::from_millis(12)), None);
        let fired = debouncer.poll(start + Duration::from_millis(18)).unwrap();
        assert_eq!(fired.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.poll(start + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_zero_delay_fires_on_next_poll() {
        let now = Instant::now();
        let mut debouncer: Debouncer<()> = Debouncer::new(Duration::ZERO);
        debouncer.schedule(now, |_| {});
        assert_eq!(debouncer.poll(now), Some(()));
    }

    #[test]
    fn test_cancel_and_flush() {
        let now = Instant::now();
        let mut debouncer: Debouncer<Vec<u8>> = Debouncer::new(Duration::from_secs(60));
        debouncer.schedule(now, |v| v.push(1));
        debouncer.cancel();
        assert_eq!(debouncer.flush(), None);

        debouncer.schedule(now, |v| v.push(2));
        assert_eq!(debouncer.deadline(), Some(now + Duration::from_secs(60)));
        assert_eq!(debouncer.flush(), Some(vec![2]));
    }
}

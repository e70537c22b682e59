use std::time::Duration;

/// Decides when the capture loop persists a snapshot.
///
/// Time only accumulates across successful capture cycles, so a stalled
/// camera does not produce a burst of snapshots once it recovers.
#[derive(Debug, Clone)]
pub struct SnapshotCadence {
    interval: Duration,
    accumulated: Duration,
}

impl SnapshotCadence {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
        }
    }

    /// Account for one capture cycle that took `elapsed`.
    /// Returns true when a snapshot is due.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        if self.interval.is_zero() {
            return true;
        }

        self.accumulated += elapsed;
        if self.accumulated < self.interval {
            return false;
        }

        self.accumulated -= self.interval;
        if self.accumulated >= self.interval {
            // At most one snapshot per cycle
            let remainder = self.accumulated.as_nanos() % self.interval.as_nanos();
            self.accumulated = Duration::from_nanos(remainder as u64);
        }
        true
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Capture time banked toward the next snapshot
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }
}

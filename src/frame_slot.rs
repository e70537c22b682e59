use crate::frame::FrameSet;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Single-slot handoff of the latest [`FrameSet`] from the capture loop to
/// the analysis loop.
///
/// Publishing replaces whatever set was waiting, so no backlog can build up.
/// The set is swapped in as one `Arc`, so a reader sees either the previous
/// set or the new one, never a mix.
pub struct LatestFrameSlot {
    slot: Mutex<Option<Arc<FrameSet>>>,
    last_read_sequence: AtomicU64,
    stats: FrameSlotStats,
}

/// Counters for slot traffic
#[derive(Debug, Default)]
pub struct FrameSlotStats {
    /// Sets published by the writer
    pub published: AtomicU64,
    /// Sets replaced before any reader fetched them
    pub overwritten_unread: AtomicU64,
    /// Successful reads
    pub reads: AtomicU64,
}

/// Snapshot of slot statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlotStatsSnapshot {
    pub published: u64,
    pub overwritten_unread: u64,
    pub reads: u64,
}

impl FrameSlotStats {
    pub fn snapshot(&self) -> FrameSlotStatsSnapshot {
        FrameSlotStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            overwritten_unread: self.overwritten_unread.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
        }
    }
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            last_read_sequence: AtomicU64::new(0),
            stats: FrameSlotStats::default(),
        }
    }

    /// Replace the current set with `set`.
    ///
    /// Sequences are expected to start at 1 and increase per publication.
    pub fn publish(&self, set: FrameSet) {
        let sequence = set.sequence;
        let previous = self.slot.lock().replace(Arc::new(set));

        if let Some(previous) = previous {
            if previous.sequence != self.last_read_sequence.load(Ordering::Relaxed) {
                self.stats.overwritten_unread.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        trace!("Published frame set {}", sequence);
    }

    /// Latest published set, if any
    pub fn latest(&self) -> Option<Arc<FrameSet>> {
        let latest = self.slot.lock().clone();
        if let Some(set) = &latest {
            self.stats.reads.fetch_add(1, Ordering::Relaxed);
            self.last_read_sequence.store(set.sequence, Ordering::Relaxed);
        }
        latest
    }

    /// Sequence of the latest published set
    pub fn latest_sequence(&self) -> Option<u64> {
        self.slot.lock().as_ref().map(|set| set.sequence)
    }

    /// Whether a set is waiting in the slot
    pub fn has_frames(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn stats(&self) -> FrameSlotStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

//! Capture counters
//!
//! Updated from the trace callback context with relaxed atomics and read as
//! a plain snapshot by pollers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the engine's counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    /// Records handed to the engine (ALPC and stack walk)
    pub records: u64,
    /// Events appended to the event buffer
    pub events_recorded: u64,
    /// ALPC records ignored because the engine was not running
    pub ignored_inactive: u64,
    /// ALPC records with an opcode outside the event model
    pub unknown_opcodes: u64,
    pub sends: u64,
    pub receives: u64,
    /// Receives paired with a pending send
    pub messages_matched: u64,
    /// Receives with no pending send for their id
    pub unmatched_receives: u64,
    pub stacks_attached: u64,
    /// Stack walks with no pending event on their thread
    pub stacks_dropped: u64,
    /// Events dropped by the buffer's high-water mark
    pub events_evicted: u64,
    /// Unmatched sends dropped by the pending-send bound
    pub pending_evicted: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);

impl Counter {
    pub(crate) fn inc(&self) {
        self.add(1);
    }

    pub(crate) fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Live counters owned by the engine
#[derive(Debug, Default)]
pub(crate) struct CaptureCounters {
    pub(crate) records: Counter,
    pub(crate) events_recorded: Counter,
    pub(crate) ignored_inactive: Counter,
    pub(crate) unknown_opcodes: Counter,
    pub(crate) sends: Counter,
    pub(crate) receives: Counter,
    pub(crate) messages_matched: Counter,
    pub(crate) unmatched_receives: Counter,
    pub(crate) stacks_attached: Counter,
    pub(crate) stacks_dropped: Counter,
    pub(crate) events_evicted: Counter,
    pub(crate) pending_evicted: Counter,
}

impl CaptureCounters {
    pub(crate) fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            records: self.records.get(),
            events_recorded: self.events_recorded.get(),
            ignored_inactive: self.ignored_inactive.get(),
            unknown_opcodes: self.unknown_opcodes.get(),
            sends: self.sends.get(),
            receives: self.receives.get(),
            messages_matched: self.messages_matched.get(),
            unmatched_receives: self.unmatched_receives.get(),
            stacks_attached: self.stacks_attached.get(),
            stacks_dropped: self.stacks_dropped.get(),
            events_evicted: self.events_evicted.get(),
            pending_evicted: self.pending_evicted.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let counters = CaptureCounters::default();
        counters.records.inc();
        counters.records.inc();
        counters.events_evicted.add(100);

        let stats = counters.snapshot();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.events_evicted, 100);
        assert_eq!(stats.sends, 0);
    }
}

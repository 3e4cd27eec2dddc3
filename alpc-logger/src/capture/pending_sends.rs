//! Sends awaiting their receive
//!
//! Message ids are recycled by the kernel, so several entries may share an id
//! at once. Lookups always resolve to the oldest one.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::lock;
use crate::domain::MessageId;
use crate::trace_data::PendingSend;

/// Insertion-ordered table of unmatched sends
#[derive(Debug, Default)]
pub struct PendingSendTable {
    entries: Mutex<VecDeque<PendingSend>>,
    /// `None` = unbounded
    bound: Option<usize>,
}

impl PendingSendTable {
    /// Create an unbounded table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table that drops its oldest entry once `bound` is reached
    #[must_use]
    pub fn with_bound(bound: Option<usize>) -> Self {
        Self { entries: Mutex::new(VecDeque::new()), bound }
    }

    /// Append a send
    ///
    /// Returns the entry dropped to respect the bound, if any.
    pub fn push(&self, send: PendingSend) -> Option<PendingSend> {
        let mut entries = lock(&self.entries);
        let evicted = match self.bound {
            Some(bound) if entries.len() >= bound => entries.pop_front(),
            _ => None,
        };
        entries.push_back(send);
        evicted
    }

    /// Remove and return the oldest entry with `message_id`
    ///
    /// Find and remove happen under one lock, so two receives can never
    /// consume the same entry.
    pub fn take_oldest(&self, message_id: MessageId) -> Option<PendingSend> {
        let mut entries = lock(&self.entries);
        let pos = entries.iter().position(|send| send.message_id == message_id)?;
        entries.remove(pos)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

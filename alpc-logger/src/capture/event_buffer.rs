//! Bounded timeline buffer
//!
//! Once an append would take the buffer past its high-water mark, the oldest
//! `eviction_batch` events are dropped in one go. Occupancy follows a
//! sawtooth instead of sliding by one on every append, so pollers drain
//! large stable batches.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::lock;
use crate::trace_data::Event;

/// Bounded, drain-and-clear sequence of events
#[derive(Debug)]
pub struct EventBuffer {
    events: Mutex<VecDeque<Arc<Event>>>,
    capacity: usize,
    eviction_batch: usize,
}

impl EventBuffer {
    /// Create a buffer with a high-water mark and eviction batch size
    ///
    /// Callers validate the bounds (see `CaptureConfig::validate`).
    #[must_use]
    pub fn new(capacity: usize, eviction_batch: usize) -> Self {
        Self { events: Mutex::new(VecDeque::new()), capacity, eviction_batch }
    }

    /// Append an event, evicting the oldest batch first if needed
    ///
    /// Returns the number of events evicted.
    pub fn push(&self, event: Arc<Event>) -> usize {
        let mut events = lock(&self.events);
        let evicted = if events.len() >= self.capacity {
            let batch = self.eviction_batch.min(events.len());
            events.drain(..batch).count()
        } else {
            0
        };
        events.push_back(event);
        evicted
    }

    /// Take everything currently buffered, leaving the buffer empty
    pub fn drain(&self) -> Vec<Arc<Event>> {
        let events = std::mem::take(&mut *lock(&self.events));
        Vec::from(events)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

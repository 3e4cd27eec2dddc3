//! Thread → event awaiting a stack walk
//!
//! The stack-walk provider reports a stack for the event a thread emitted
//! immediately before, identified only by thread id. Each thread therefore
//! has at most one pending event: a newer event replaces an older one that
//! never got its stack.

use alpc_common::MAX_STACK_DEPTH;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::lock;
use crate::domain::Tid;
use crate::trace_data::Event;

/// Last event per thread that still waits for its stack
#[derive(Debug, Default)]
pub struct ThreadStackMap {
    pending: Mutex<HashMap<Tid, Arc<Event>>>,
}

impl ThreadStackMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `event` the one that receives the next stack walk on its thread
    ///
    /// Returns `true` if an earlier event on the thread was replaced.
    pub fn register(&self, event: &Arc<Event>) -> bool {
        lock(&self.pending).insert(event.thread_id, Arc::clone(event)).is_some()
    }

    /// Attach a stack walk to the pending event of `thread_id`
    ///
    /// `frame` returns the instruction pointer at an index, innermost first,
    /// and is never called past [`MAX_STACK_DEPTH`]. The entry is removed
    /// either way; returns `false` if the thread had no pending event.
    pub fn attach<F>(&self, thread_id: Tid, frame_count: usize, frame: F) -> bool
    where
        F: Fn(usize) -> u64,
    {
        let Some(event) = lock(&self.pending).remove(&thread_id) else {
            return false;
        };
        let frames: Vec<u64> = (0..frame_count.min(MAX_STACK_DEPTH)).map(frame).collect();
        event.attach_stack(frames)
    }

    /// Number of threads with a pending event
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.pending).is_empty()
    }
}

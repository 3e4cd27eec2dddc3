//! Capture core modules
//!
//! Everything between the trace source and the polling consumers:
//! - Pending-send table and send/receive correlation
//! - Thread → pending-event map for stack-walk enrichment
//! - Bounded event buffer and message log (drained by pollers)
//! - The capture engine that owns the lifecycle and wires it all together
//! - Event display formatting for headless output

pub mod correlator;
pub mod engine;
pub mod event_buffer;
pub mod event_display;
pub mod message_log;
pub mod pending_sends;
pub mod source;
pub mod stack_map;
pub mod stats;

// Re-export common types
pub use correlator::Correlator;
pub use engine::CaptureEngine;
pub use event_buffer::EventBuffer;
pub use event_display::{
    display_event, display_message, display_statistics, format_event, format_message,
};
pub use message_log::MessageLog;
pub use pending_sends::PendingSendTable;
pub use source::{RecordSender, TraceRecord, TraceSession, TraceSource};
pub use stack_map::ThreadStackMap;
pub use stats::CaptureStats;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a capture structure, recovering the data if a holder panicked
///
/// The trace callback context must keep going; every guarded structure is
/// left consistent between statements, so a poisoned guard is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Send ↔ receive correlation
//!
//! A receive is paired with the oldest pending send carrying the same message
//! id. Process ids are not compared: the kernel recycles ids per round trip,
//! not per process, and pairing on the id alone matches what the provider
//! guarantees.

use log::trace;

use super::PendingSendTable;
use crate::trace_data::{Event, Message, PendingSend};

/// Turns send and receive events into completed messages
#[derive(Debug, Default)]
pub struct Correlator {
    pending: PendingSendTable,
}

impl Correlator {
    /// Create a correlator with an optional bound on unmatched sends
    #[must_use]
    pub fn new(max_pending_sends: Option<usize>) -> Self {
        Self { pending: PendingSendTable::with_bound(max_pending_sends) }
    }

    /// Remember a send until its receive shows up
    ///
    /// Returns the pending send dropped to respect the table bound, if any.
    pub fn on_send(&self, event: &Event) -> Option<PendingSend> {
        let Some(send) = PendingSend::from_event(event) else {
            trace!("Send without message id on {}", event.thread_id);
            return None;
        };
        self.pending.push(send)
    }

    /// Pair a receive with the oldest matching send
    ///
    /// Returns `None` when no send is pending for the id: the send happened
    /// before capture started, was ignored while paused, or was evicted.
    pub fn on_receive(&self, event: &Event) -> Option<Message> {
        let message_id = event.message_id?;
        let Some(send) = self.pending.take_oldest(message_id) else {
            trace!(
                "Receive without send {} ({}) {}",
                event.process_name,
                event.process_id,
                message_id
            );
            return None;
        };
        Some(Message::correlate(send, event))
    }

    /// Number of sends still waiting for a receive
    #[must_use]
    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }
}

//! Trace data models
//!
//! Normalized forms of what the kernel session reports: timeline [`Event`]s,
//! [`PendingSend`]s awaiting their receive, and correlated [`Message`]s.

use alpc_common::{
    AlpcRecord, ALPC_RECEIVE_MESSAGE, ALPC_SEND_MESSAGE, ALPC_UNWAIT, ALPC_WAIT_FOR_REPLY,
};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

use crate::domain::{Duration, MessageId, Pid, Tid, Timestamp};

/// Kind of a timeline event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    SendMessage,
    ReceiveMessage,
    WaitForReply,
    Unwait,
}

impl EventKind {
    /// Map a raw ALPC opcode to an event kind
    ///
    /// Returns `None` for opcodes that are not part of the timeline model.
    #[must_use]
    pub fn from_opcode(opcode: u32) -> Option<Self> {
        match opcode {
            ALPC_SEND_MESSAGE => Some(EventKind::SendMessage),
            ALPC_RECEIVE_MESSAGE => Some(EventKind::ReceiveMessage),
            ALPC_WAIT_FOR_REPLY => Some(EventKind::WaitForReply),
            ALPC_UNWAIT => Some(EventKind::Unwait),
            _ => None,
        }
    }

    /// Whether events of this kind carry a correlation id
    #[must_use]
    pub fn has_message_id(self) -> bool {
        !matches!(self, EventKind::Unwait)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::SendMessage => "SEND",
            EventKind::ReceiveMessage => "RECV",
            EventKind::WaitForReply => "WAIT",
            EventKind::Unwait => "UNWAIT",
        };
        f.write_str(name)
    }
}

/// One observed timeline occurrence
///
/// The stack is filled in at most once, by the first stack walk reported for
/// this event's thread. Events are shared as `Arc<Event>` between the event
/// buffer and the thread-pending-stack map, so the stack can land after the
/// event was already drained.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub process_id: Pid,
    pub process_name: String,
    pub thread_id: Tid,
    pub timestamp: Timestamp,
    pub kind: EventKind,
    pub message_id: Option<MessageId>,
    #[serde(serialize_with = "serialize_stack")]
    stack: OnceLock<Box<[u64]>>,
}

impl Event {
    #[must_use]
    pub fn new(
        kind: EventKind,
        process_id: Pid,
        process_name: impl Into<String>,
        thread_id: Tid,
        timestamp: Timestamp,
        message_id: Option<MessageId>,
    ) -> Self {
        Self {
            process_id,
            process_name: process_name.into(),
            thread_id,
            timestamp,
            kind,
            message_id,
            stack: OnceLock::new(),
        }
    }

    /// Normalize a raw ALPC record
    ///
    /// Returns `None` when the opcode is not one of the modeled kinds.
    #[must_use]
    pub fn from_record(record: &AlpcRecord) -> Option<Self> {
        let kind = EventKind::from_opcode(record.opcode)?;
        let message_id = kind.has_message_id().then_some(MessageId(record.message_id));

        Some(Self::new(
            kind,
            Pid(record.process_id),
            record.image_name(),
            Tid(record.thread_id),
            Timestamp(record.timestamp_ns),
            message_id,
        ))
    }

    /// Captured call stack, innermost frame first
    #[must_use]
    pub fn stack(&self) -> Option<&[u64]> {
        self.stack.get().map(|frames| &**frames)
    }

    /// Attach a call stack
    ///
    /// Returns `false` (and leaves the event untouched) if a stack was
    /// already attached.
    pub fn attach_stack(&self, frames: Vec<u64>) -> bool {
        self.stack.set(frames.into_boxed_slice()).is_ok()
    }
}

fn serialize_stack<S: Serializer>(
    stack: &OnceLock<Box<[u64]>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    stack.get().map(|frames| &**frames).serialize(serializer)
}

/// A send that has not been matched to a receive yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub message_id: MessageId,
    pub process_id: Pid,
    pub process_name: String,
    pub thread_id: Tid,
    pub timestamp: Timestamp,
}

impl PendingSend {
    /// Build from a send event
    ///
    /// Returns `None` if the event carries no message id.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        Some(Self {
            message_id: event.message_id?,
            process_id: event.process_id,
            process_name: event.process_name.clone(),
            thread_id: event.thread_id,
            timestamp: event.timestamp,
        })
    }
}

/// A completed, correlated send/receive pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub source_process_id: Pid,
    pub source_process_name: String,
    pub source_thread_id: Tid,
    pub target_process_id: Pid,
    pub target_process_name: String,
    pub target_thread_id: Tid,
    pub message_id: MessageId,
    pub send_timestamp: Timestamp,
    pub receive_timestamp: Timestamp,
}

impl Message {
    /// Combine a consumed pending send with the receive that matched it
    #[must_use]
    pub fn correlate(send: PendingSend, receive: &Event) -> Self {
        Self {
            source_process_id: send.process_id,
            source_process_name: send.process_name,
            source_thread_id: send.thread_id,
            target_process_id: receive.process_id,
            target_process_name: receive.process_name.clone(),
            target_thread_id: receive.thread_id,
            message_id: send.message_id,
            send_timestamp: send.timestamp,
            receive_timestamp: receive.timestamp,
        }
    }

    /// Time between the send and the receive
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.receive_timestamp.since(self.send_timestamp)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}) -> {} -> {} ({} {})",
            self.source_process_name,
            self.source_process_id,
            self.source_thread_id,
            self.message_id,
            self.target_process_name,
            self.target_process_id,
            self.target_thread_id,
        )
    }
}

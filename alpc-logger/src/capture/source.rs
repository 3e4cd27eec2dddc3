//! # Trace Source Interface
//!
//! The kernel trace session is an external collaborator. It is modeled as a
//! [`TraceSource`] that, once opened, pushes typed [`TraceRecord`]s into a
//! channel read by the engine's ingestion thread, and hands back a
//! [`TraceSession`] the engine closes on dispose.
//!
//! ```text
//! ┌──────────────┐  TraceRecord   ┌──────────────┐  ingest()  ┌──────────────┐
//! │ TraceSource  │───────────────▶│   channel    │───────────▶│CaptureEngine │
//! │ (session)    │  RecordSender  │ (unbounded)  │ pump thread│              │
//! └──────────────┘                └──────────────┘            └──────────────┘
//! ```
//!
//! The channel is unbounded so a slow consumer never stalls the session's
//! callback thread.

use alpc_common::{AlpcRecord, StackWalkRecord};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::SessionSettings;
use crate::domain::SessionError;

/// One typed callback from the trace session
#[derive(Debug, Clone)]
pub enum TraceRecord {
    /// Send, receive, wait or unwait (see the opcode)
    Alpc(AlpcRecord),
    /// Stack captured for the previous event on a thread
    StackWalk(Box<StackWalkRecord>),
}

impl From<AlpcRecord> for TraceRecord {
    fn from(record: AlpcRecord) -> Self {
        TraceRecord::Alpc(record)
    }
}

impl From<StackWalkRecord> for TraceRecord {
    fn from(record: StackWalkRecord) -> Self {
        TraceRecord::StackWalk(Box::new(record))
    }
}

/// Producer half of the record channel, handed to the source on open
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: Sender<TraceRecord>,
}

impl RecordSender {
    /// Deliver one record to the engine
    ///
    /// Returns `false` once the engine has stopped listening; the source
    /// should stop producing.
    pub fn send(&self, record: impl Into<TraceRecord>) -> bool {
        self.tx.send(record.into()).is_ok()
    }
}

/// Create a connected sender/receiver pair
pub(crate) fn record_channel() -> (RecordSender, Receiver<TraceRecord>) {
    let (tx, rx) = unbounded();
    (RecordSender { tx }, rx)
}

/// A kernel trace facility the engine can subscribe to
pub trait TraceSource {
    /// Open the session and start delivering records to `sink`
    ///
    /// # Errors
    /// Returns a [`SessionError`] if the session cannot be established
    /// (insufficient privilege, name already in use, ...).
    fn open(
        &mut self,
        settings: &SessionSettings,
        sink: RecordSender,
    ) -> Result<Box<dyn TraceSession>, SessionError>;
}

/// An open subscription
///
/// `close` must drop every [`RecordSender`] the session still holds, which
/// ends the engine's ingestion thread.
pub trait TraceSession: Send {
    /// Stop delivering records and release the session
    ///
    /// # Errors
    /// Returns a [`SessionError`] if the session cannot be released.
    fn close(&mut self) -> Result<(), SessionError>;

    /// Whether the session has delivered every record it ever will
    ///
    /// Live sessions never finish on their own.
    fn is_finished(&self) -> bool {
        false
    }
}

//! # Capture Engine
//!
//! Owns the trace session and routes every record to the structures that
//! need it.
//!
//! ## Record Routing
//!
//! - `ALPC_SEND_MESSAGE` → event buffer, stack map, pending-send table
//! - `ALPC_RECEIVE_MESSAGE` → event buffer, stack map, correlation → message log
//! - `ALPC_WAIT_FOR_REPLY`, `ALPC_UNWAIT` → event buffer, stack map
//! - Stack walk → stack map (attaches frames to the pending event)
//!
//! The session's records queue up from `start` until the first `run` spawns
//! the ingestion thread. From then on ALPC records are only processed while
//! [`CaptureState::Running`]; stack walks are processed in every state but
//! `Disposed`, so work queued before a pause still completes.
//!
//! The ingestion thread holds an `Arc` to the engine until the record stream
//! ends, so call [`CaptureEngine::dispose`] rather than relying on drop.
//!
//! ## Locking
//!
//! The event buffer, message log, pending-send table and stack map each have
//! their own mutex and none is taken while holding another. A consumer may
//! therefore see a message before (or after) the receive event that produced
//! it shows up in the event buffer.

use alpc_common::AlpcRecord;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::source::record_channel;
use super::stats::CaptureCounters;
use super::{
    lock, CaptureStats, Correlator, EventBuffer, MessageLog, ThreadStackMap, TraceRecord,
    TraceSession, TraceSource,
};
use crate::config::CaptureConfig;
use crate::domain::{CaptureError, CaptureState, Tid};
use crate::trace_data::{Event, EventKind, Message};

/// Resources owned between `start` and `dispose`
#[derive(Default)]
struct Lifecycle {
    session: Option<Box<dyn TraceSession>>,
    /// Record queue, handed to the ingestion thread by the first `run`
    records: Option<Receiver<TraceRecord>>,
}

/// ALPC capture engine
///
/// Construct one per capture session, wrap it in an `Arc`, [`start`] it on
/// a [`TraceSource`] and [`run`] it; pollers call the drain methods from any
/// thread.
///
/// [`start`]: CaptureEngine::start
/// [`run`]: CaptureEngine::run
pub struct CaptureEngine {
    config: CaptureConfig,

    /// `CaptureState` as u8, read lock-free on the hot path
    state: AtomicU8,
    /// Serializes lifecycle transitions
    lifecycle: Mutex<Lifecycle>,
    source_finished: AtomicBool,

    correlator: Correlator,
    events: EventBuffer,
    messages: MessageLog,
    stacks: ThreadStackMap,
    counters: CaptureCounters,
}

impl CaptureEngine {
    /// Create an engine in the `Created` state
    ///
    /// # Errors
    /// Returns [`CaptureError::Config`] if the configuration is invalid
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;

        Ok(Self {
            correlator: Correlator::new(config.max_pending_sends),
            events: EventBuffer::new(config.event_capacity, config.eviction_batch),
            messages: MessageLog::new(),
            stacks: ThreadStackMap::new(),
            counters: CaptureCounters::default(),
            state: AtomicU8::new(CaptureState::Created as u8),
            lifecycle: Mutex::new(Lifecycle::default()),
            source_finished: AtomicBool::new(false),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        CaptureState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether ALPC records are currently being recorded
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == CaptureState::Running
    }

    fn set_state(&self, state: CaptureState) {
        self.state.store(state as u8, Ordering::Release);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the trace session
    ///
    /// Records the source delivers are queued until the first
    /// [`run`](Self::run) starts the ingestion thread.
    ///
    /// # Errors
    /// - [`CaptureError::Subscribe`] if the source cannot open its session;
    ///   the engine stays `Created` and `start` may be retried
    /// - [`CaptureError::InvalidTransition`] if already started
    /// - [`CaptureError::Disposed`] after [`dispose`](Self::dispose)
    pub fn start(&self, source: &mut dyn TraceSource) -> Result<(), CaptureError> {
        let mut lifecycle = lock(&self.lifecycle);
        match self.state() {
            CaptureState::Created => {}
            CaptureState::Disposed => return Err(CaptureError::Disposed),
            from => return Err(CaptureError::InvalidTransition { from, operation: "start" }),
        }

        let (sink, records) = record_channel();
        let session = source.open(&self.config.session, sink).map_err(CaptureError::Subscribe)?;

        lifecycle.session = Some(session);
        lifecycle.records = Some(records);
        self.set_state(CaptureState::Started);
        info!(
            "Started trace session '{}' ({} MB buffers)",
            self.config.session.name, self.config.session.buffer_size_mb
        );
        Ok(())
    }

    /// Start recording ALPC records
    ///
    /// The first call spawns the ingestion thread that drains the session's
    /// record queue.
    ///
    /// # Errors
    /// - [`CaptureError::InvalidTransition`] before [`start`](Self::start)
    /// - [`CaptureError::Disposed`] after [`dispose`](Self::dispose)
    /// - [`CaptureError::Io`] if the ingestion thread cannot be spawned; the
    ///   engine stays `Started`
    pub fn run(self: &Arc<Self>) -> Result<(), CaptureError> {
        let mut lifecycle = lock(&self.lifecycle);
        match self.state() {
            CaptureState::Started | CaptureState::Paused => {}
            CaptureState::Running => return Ok(()),
            CaptureState::Disposed => return Err(CaptureError::Disposed),
            from @ CaptureState::Created => {
                return Err(CaptureError::InvalidTransition { from, operation: "run" })
            }
        }

        // Running must be visible before the pump sees its first record
        self.set_state(CaptureState::Running);
        if let Some(records) = lifecycle.records.take() {
            let engine = Arc::clone(self);
            let spawned = thread::Builder::new()
                .name("alpc-ingest".to_string())
                .spawn(move || engine.pump(&records));
            if let Err(e) = spawned {
                self.set_state(CaptureState::Started);
                return Err(CaptureError::Io(e));
            }
        }
        info!("Capture running");
        Ok(())
    }

    /// Stop recording ALPC records; pending sends are kept
    ///
    /// # Errors
    /// - [`CaptureError::InvalidTransition`] before [`start`](Self::start)
    /// - [`CaptureError::Disposed`] after [`dispose`](Self::dispose)
    pub fn pause(&self) -> Result<(), CaptureError> {
        let _guard = lock(&self.lifecycle);
        match self.state() {
            CaptureState::Started | CaptureState::Running => {
                self.set_state(CaptureState::Paused);
                info!("Capture paused ({} sends pending)", self.correlator.pending_sends());
                Ok(())
            }
            CaptureState::Paused => Ok(()),
            CaptureState::Disposed => Err(CaptureError::Disposed),
            from @ CaptureState::Created => {
                Err(CaptureError::InvalidTransition { from, operation: "pause" })
            }
        }
    }

    /// Stop processing for good and release the trace session
    ///
    /// Idempotent. The engine is `Disposed` when this returns, even on error.
    ///
    /// # Errors
    /// Returns [`CaptureError::Release`] if the session cannot be released
    pub fn dispose(&self) -> Result<(), CaptureError> {
        let mut lifecycle = lock(&self.lifecycle);
        if self.state() == CaptureState::Disposed {
            return Ok(());
        }
        self.set_state(CaptureState::Disposed);

        // Never ran: nothing will drain the queue
        lifecycle.records = None;
        let Some(mut session) = lifecycle.session.take() else {
            return Ok(());
        };
        session.close().map_err(CaptureError::Release)?;
        info!("Released trace session '{}'", self.config.session.name);
        Ok(())
    }

    /// Whether the ingestion thread has seen the end of the record stream
    ///
    /// Set once the source closes its side of the channel, or once the
    /// thread notices the engine was disposed. An engine that was started but
    /// never run has no ingestion thread; it reports the session's own
    /// [`TraceSession::is_finished`] instead.
    #[must_use]
    pub fn source_finished(&self) -> bool {
        if self.source_finished.load(Ordering::Acquire) {
            return true;
        }
        let lifecycle = lock(&self.lifecycle);
        lifecycle.records.is_some()
            && lifecycle.session.as_ref().is_some_and(|session| session.is_finished())
    }

    fn pump(&self, records: &Receiver<TraceRecord>) {
        for record in records {
            if self.state() == CaptureState::Disposed {
                break;
            }
            self.ingest(record);
        }
        self.source_finished.store(true, Ordering::Release);
        debug!("Ingestion thread finished");
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Process one record from the trace source
    ///
    /// This is what the ingestion thread calls; sources that deliver on
    /// their own thread may call it directly instead of using the channel.
    pub fn ingest(&self, record: TraceRecord) {
        match record {
            TraceRecord::Alpc(record) => self.on_alpc(&record),
            TraceRecord::StackWalk(walk) => self.on_stack_walk(
                Tid(walk.thread_id),
                walk.valid_frames(),
                |i| walk.instruction_pointer(i),
            ),
        }
    }

    /// Process one ALPC record
    pub fn on_alpc(&self, record: &AlpcRecord) {
        self.counters.records.inc();

        match self.state() {
            CaptureState::Running => {}
            CaptureState::Disposed => return,
            _ => {
                self.counters.ignored_inactive.inc();
                return;
            }
        }

        let Some(event) = Event::from_record(record) else {
            self.counters.unknown_opcodes.inc();
            debug!("Ignoring ALPC opcode {}", record.opcode);
            return;
        };
        let event = Arc::new(event);
        self.record_event(&event);

        match event.kind {
            EventKind::SendMessage => {
                self.counters.sends.inc();
                if let Some(dropped) = self.correlator.on_send(&event) {
                    self.counters.pending_evicted.inc();
                    debug!(
                        "Pending send bound reached, dropped {} from {}",
                        dropped.message_id, dropped.process_name
                    );
                }
            }
            EventKind::ReceiveMessage => {
                self.counters.receives.inc();
                if let Some(message) = self.correlator.on_receive(&event) {
                    self.counters.messages_matched.inc();
                    self.messages.push(message);
                } else {
                    self.counters.unmatched_receives.inc();
                }
            }
            EventKind::WaitForReply | EventKind::Unwait => {}
        }
    }

    /// Attach a stack walk to the pending event of `thread_id`
    ///
    /// `frame` returns the instruction pointer at an index, innermost first.
    /// Counts above [`alpc_common::MAX_STACK_DEPTH`] are clamped.
    pub fn on_stack_walk<F>(&self, thread_id: Tid, frame_count: usize, frame: F)
    where
        F: Fn(usize) -> u64,
    {
        self.counters.records.inc();
        if self.state() == CaptureState::Disposed {
            return;
        }

        if self.stacks.attach(thread_id, frame_count, frame) {
            self.counters.stacks_attached.inc();
        } else {
            self.counters.stacks_dropped.inc();
        }
    }

    fn record_event(&self, event: &Arc<Event>) {
        let evicted = self.events.push(Arc::clone(event));
        self.counters.events_recorded.inc();
        if evicted > 0 {
            self.counters.events_evicted.add(evicted as u64);
            debug!("Event buffer full, evicted {evicted} oldest events");
        }
        self.stacks.register(event);
    }

    // ========================================================================
    // Drain API
    // ========================================================================

    /// Copy of the message log, without clearing it
    #[must_use]
    pub fn messages_snapshot(&self) -> Vec<Message> {
        self.messages.snapshot()
    }

    /// Take every completed message
    pub fn drain_messages(&self) -> Vec<Message> {
        self.messages.drain()
    }

    /// Take every buffered event
    ///
    /// Events are shared with the stack map: a stack walk arriving after the
    /// drain still shows up on the returned event.
    pub fn drain_events(&self) -> Vec<Arc<Event>> {
        self.events.drain()
    }

    /// Number of sends still waiting for a receive
    #[must_use]
    pub fn pending_sends(&self) -> usize {
        self.correlator.pending_sends()
    }

    #[must_use]
    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        let lifecycle =
            self.lifecycle.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(mut session) = lifecycle.session.take() {
            if let Err(e) = session.close() {
                warn!("Failed to release trace session on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpc_common::{
        StackWalkRecord, ALPC_RECEIVE_MESSAGE, ALPC_SEND_MESSAGE, ALPC_WAIT_FOR_NEW_MESSAGE,
    };
    use crate::capture::RecordSender;
    use crate::config::SessionSettings;
    use crate::domain::SessionError;

    struct NullSession;

    impl TraceSession for NullSession {
        fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    struct NullSource;

    impl TraceSource for NullSource {
        fn open(
            &mut self,
            _settings: &SessionSettings,
            _sink: RecordSender,
        ) -> Result<Box<dyn TraceSession>, SessionError> {
            Ok(Box::new(NullSession))
        }
    }

    fn running_engine() -> Arc<CaptureEngine> {
        let engine = Arc::new(CaptureEngine::new(CaptureConfig::default()).unwrap());
        engine.start(&mut NullSource).unwrap();
        engine.run().unwrap();
        engine
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = CaptureConfig { event_capacity: 0, ..CaptureConfig::default() };
        assert!(matches!(CaptureEngine::new(config), Err(CaptureError::Config(_))));
    }

    #[test]
    fn test_routing_counters() {
        let engine = running_engine();
        engine.on_alpc(&AlpcRecord::new(ALPC_SEND_MESSAGE, 1, "a.exe", 10, 1, 7));
        engine.on_alpc(&AlpcRecord::new(ALPC_RECEIVE_MESSAGE, 2, "b.exe", 20, 2, 7));
        engine.on_alpc(&AlpcRecord::new(ALPC_RECEIVE_MESSAGE, 2, "b.exe", 20, 3, 8));
        engine.on_alpc(&AlpcRecord::new(ALPC_WAIT_FOR_NEW_MESSAGE, 2, "b.exe", 20, 4, 0));
        engine.ingest(StackWalkRecord::new(10, 1, &[0x1]).into());
        engine.ingest(StackWalkRecord::new(99, 1, &[0x1]).into());

        let stats = engine.stats();
        assert_eq!(stats.records, 6);
        assert_eq!(stats.events_recorded, 3);
        assert_eq!(stats.sends, 1);
        assert_eq!(stats.receives, 2);
        assert_eq!(stats.messages_matched, 1);
        assert_eq!(stats.unmatched_receives, 1);
        assert_eq!(stats.unknown_opcodes, 1);
        assert_eq!(stats.stacks_attached, 1);
        assert_eq!(stats.stacks_dropped, 1);
    }

    #[test]
    fn test_records_before_run_are_ignored() {
        let engine = Arc::new(CaptureEngine::new(CaptureConfig::default()).unwrap());
        engine.start(&mut NullSource).unwrap();
        engine.on_alpc(&AlpcRecord::new(ALPC_SEND_MESSAGE, 1, "a.exe", 10, 1, 7));

        assert!(engine.drain_events().is_empty());
        assert_eq!(engine.pending_sends(), 0);
        assert_eq!(engine.stats().ignored_inactive, 1);
    }

    #[test]
    fn test_pending_bound_counts_evictions() {
        let config = CaptureConfig { max_pending_sends: Some(1), ..CaptureConfig::default() };
        let engine = Arc::new(CaptureEngine::new(config).unwrap());
        engine.start(&mut NullSource).unwrap();
        engine.run().unwrap();

        engine.on_alpc(&AlpcRecord::new(ALPC_SEND_MESSAGE, 1, "a.exe", 10, 1, 7));
        engine.on_alpc(&AlpcRecord::new(ALPC_SEND_MESSAGE, 1, "a.exe", 10, 2, 8));
        assert_eq!(engine.pending_sends(), 1);
        assert_eq!(engine.stats().pending_evicted, 1);
    }

    #[test]
    fn test_oversized_stack_walk_is_clamped() {
        let engine = running_engine();
        engine.on_alpc(&AlpcRecord::new(ALPC_SEND_MESSAGE, 1, "a.exe", 10, 1, 7));

        let frames = [0xAAAu64; alpc_common::MAX_STACK_DEPTH];
        engine.on_stack_walk(Tid(10), usize::MAX, |i| frames[i]);

        let events = engine.drain_events();
        assert_eq!(events[0].stack().map(<[u64]>::len), Some(alpc_common::MAX_STACK_DEPTH));
        assert_eq!(engine.stats().stacks_attached, 1);
    }
}

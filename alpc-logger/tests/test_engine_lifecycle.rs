use alpc_common::{AlpcRecord, StackWalkRecord, ALPC_RECEIVE_MESSAGE, ALPC_SEND_MESSAGE};
use alpc_logger::capture::{CaptureEngine, RecordSender, TraceSession, TraceSource};
use alpc_logger::config::{CaptureConfig, SessionSettings, KERNEL_LOGGER_NAME};
use alpc_logger::domain::{CaptureError, CaptureState, SessionError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Scripted source: records what it was opened with and how often it was closed
#[derive(Default)]
struct ScriptedSource {
    deny_open: bool,
    fail_close: bool,
    /// Session reports that it has nothing more to deliver
    exhausted: bool,
    opened_with: Option<SessionSettings>,
    closes: Arc<AtomicUsize>,
    /// Sender kept by the session, for pushing records from the test
    sink: Arc<Mutex<Option<RecordSender>>>,
}

struct ScriptedSession {
    fail_close: bool,
    exhausted: bool,
    closes: Arc<AtomicUsize>,
    sink: Arc<Mutex<Option<RecordSender>>>,
}

impl TraceSource for ScriptedSource {
    fn open(
        &mut self,
        settings: &SessionSettings,
        sink: RecordSender,
    ) -> Result<Box<dyn TraceSession>, SessionError> {
        if self.deny_open {
            return Err(SessionError::AccessDenied("kernel sessions need elevation".to_string()));
        }
        self.opened_with = Some(settings.clone());
        *self.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(ScriptedSession {
            fail_close: self.fail_close,
            exhausted: self.exhausted,
            closes: Arc::clone(&self.closes),
            sink: Arc::clone(&self.sink),
        }))
    }
}

impl TraceSession for ScriptedSession {
    fn close(&mut self) -> Result<(), SessionError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().unwrap().take();
        if self.fail_close {
            return Err(SessionError::Other("session stuck".to_string()));
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.exhausted
    }
}

fn push(source: &ScriptedSource, record: AlpcRecord) {
    let sink = source.sink.lock().unwrap();
    assert!(sink.as_ref().unwrap().send(record));
}

fn new_engine() -> Arc<CaptureEngine> {
    Arc::new(CaptureEngine::new(CaptureConfig::default()).unwrap())
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_start_passes_session_settings() {
    let config =
        CaptureConfig { session: SessionSettings::kernel_logger(), ..CaptureConfig::default() };
    let engine = Arc::new(CaptureEngine::new(config).unwrap());
    let mut source = ScriptedSource::default();

    engine.start(&mut source).unwrap();
    assert_eq!(engine.state(), CaptureState::Started);

    let settings = source.opened_with.unwrap();
    assert_eq!(settings.name, KERNEL_LOGGER_NAME);
    assert_eq!(settings.buffer_size_mb, 64);
    assert!(settings.stop_on_dispose);
}

#[test]
fn test_open_failure_surfaces_and_allows_retry() {
    let engine = new_engine();
    let mut denied = ScriptedSource { deny_open: true, ..ScriptedSource::default() };

    let err = engine.start(&mut denied).unwrap_err();
    assert!(matches!(err, CaptureError::Subscribe(SessionError::AccessDenied(_))));
    assert!(err.to_string().contains("Permission denied"));
    assert_eq!(engine.state(), CaptureState::Created);

    engine.start(&mut ScriptedSource::default()).unwrap();
    assert_eq!(engine.state(), CaptureState::Started);
}

#[test]
fn test_invalid_transitions() {
    let engine = new_engine();
    assert!(matches!(
        engine.run(),
        Err(CaptureError::InvalidTransition { from: CaptureState::Created, .. })
    ));
    assert!(engine.pause().is_err());

    engine.start(&mut ScriptedSource::default()).unwrap();
    assert!(matches!(
        engine.start(&mut ScriptedSource::default()),
        Err(CaptureError::InvalidTransition { from: CaptureState::Started, operation: "start" })
    ));
}

#[test]
fn test_run_pause_run() {
    let engine = new_engine();
    engine.start(&mut ScriptedSource::default()).unwrap();

    engine.run().unwrap();
    assert!(engine.is_running());
    engine.run().unwrap();

    engine.pause().unwrap();
    engine.pause().unwrap();
    assert_eq!(engine.state(), CaptureState::Paused);

    engine.run().unwrap();
    assert_eq!(engine.state(), CaptureState::Running);
}

#[test]
fn test_records_queue_until_run() {
    let engine = new_engine();
    let mut source = ScriptedSource::default();
    engine.start(&mut source).unwrap();

    push(&source, AlpcRecord::new(ALPC_SEND_MESSAGE, 1, "a.exe", 10, 1, 7));
    push(&source, AlpcRecord::new(ALPC_RECEIVE_MESSAGE, 2, "b.exe", 20, 2, 7));
    assert_eq!(engine.stats().records, 0);

    engine.run().unwrap();
    wait_until(|| engine.stats().records == 2);
    assert_eq!(engine.drain_messages().len(), 1);
    assert_eq!(engine.drain_events().len(), 2);
}

#[test]
fn test_unrun_engine_follows_session_end() {
    let live = new_engine();
    live.start(&mut ScriptedSource::default()).unwrap();
    assert!(!live.source_finished());

    let exhausted = new_engine();
    let mut source = ScriptedSource { exhausted: true, ..ScriptedSource::default() };
    exhausted.start(&mut source).unwrap();
    assert!(exhausted.source_finished());
    assert_eq!(exhausted.state(), CaptureState::Started);

    // Once running, only the ingestion thread reports the end of the stream
    exhausted.run().unwrap();
    assert!(!exhausted.source_finished());
    exhausted.dispose().unwrap();
    wait_until(|| exhausted.source_finished());
}

#[test]
fn test_dispose_is_idempotent_and_final() {
    let engine = new_engine();
    let mut source = ScriptedSource::default();
    let closes = Arc::clone(&source.closes);
    engine.start(&mut source).unwrap();
    engine.run().unwrap();

    engine.dispose().unwrap();
    engine.dispose().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(engine.state(), CaptureState::Disposed);

    // Closing the session ends the record stream
    wait_until(|| engine.source_finished());

    engine.ingest(AlpcRecord::new(ALPC_SEND_MESSAGE, 1, "a.exe", 10, 1, 7).into());
    engine.ingest(StackWalkRecord::new(10, 1, &[0x1]).into());
    assert!(engine.drain_events().is_empty());
    assert_eq!(engine.pending_sends(), 0);

    assert!(matches!(engine.run(), Err(CaptureError::Disposed)));
    assert!(matches!(engine.pause(), Err(CaptureError::Disposed)));
    assert!(matches!(engine.start(&mut ScriptedSource::default()), Err(CaptureError::Disposed)));
}

#[test]
fn test_dispose_before_start() {
    let engine = new_engine();
    engine.dispose().unwrap();
    assert_eq!(engine.state(), CaptureState::Disposed);
    assert!(matches!(engine.start(&mut ScriptedSource::default()), Err(CaptureError::Disposed)));
}

#[test]
fn test_release_failure_surfaces_once() {
    let engine = new_engine();
    let mut source = ScriptedSource { fail_close: true, ..ScriptedSource::default() };
    let closes = Arc::clone(&source.closes);
    engine.start(&mut source).unwrap();

    let err = engine.dispose().unwrap_err();
    assert!(matches!(err, CaptureError::Release(SessionError::Other(_))));
    assert_eq!(engine.state(), CaptureState::Disposed);

    // Already disposed: no second close attempt
    engine.dispose().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_releases_session_that_never_ran() {
    let engine = new_engine();
    let mut source = ScriptedSource::default();
    let closes = Arc::clone(&source.closes);
    engine.start(&mut source).unwrap();

    drop(engine);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

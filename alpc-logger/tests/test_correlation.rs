use alpc_common::{
    AlpcRecord, StackWalkRecord, ALPC_RECEIVE_MESSAGE, ALPC_SEND_MESSAGE, ALPC_UNWAIT,
};
use alpc_logger::capture::{CaptureEngine, RecordSender, TraceSession, TraceSource};
use alpc_logger::config::{CaptureConfig, SessionSettings};
use alpc_logger::domain::{MessageId, SessionError, Tid, Timestamp};
use std::sync::Arc;
use std::thread;

struct IdleSession;

impl TraceSession for IdleSession {
    fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Source that delivers nothing; tests feed the engine through `ingest`
struct IdleSource;

impl TraceSource for IdleSource {
    fn open(
        &mut self,
        _settings: &SessionSettings,
        _sink: RecordSender,
    ) -> Result<Box<dyn TraceSession>, SessionError> {
        Ok(Box::new(IdleSession))
    }
}

fn running_engine() -> Arc<CaptureEngine> {
    running_engine_with(CaptureConfig::default())
}

fn running_engine_with(config: CaptureConfig) -> Arc<CaptureEngine> {
    let engine = Arc::new(CaptureEngine::new(config).unwrap());
    engine.start(&mut IdleSource).unwrap();
    engine.run().unwrap();
    engine
}

fn send(tid: u32, ts: u64, id: u32) -> AlpcRecord {
    AlpcRecord::new(ALPC_SEND_MESSAGE, 100, "client.exe", tid, ts, id)
}

fn receive(tid: u32, ts: u64, id: u32) -> AlpcRecord {
    AlpcRecord::new(ALPC_RECEIVE_MESSAGE, 200, "server.exe", tid, ts, id)
}

#[test]
fn test_send_then_receive_yields_one_message() {
    let engine = running_engine();
    engine.ingest(send(1, 10, 42).into());
    engine.ingest(receive(2, 25, 42).into());

    let messages = engine.drain_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_id, MessageId(42));
    assert_eq!(messages[0].send_timestamp, Timestamp(10));
    assert_eq!(messages[0].receive_timestamp, Timestamp(25));
    assert_eq!(messages[0].source_thread_id, Tid(1));
    assert_eq!(messages[0].target_thread_id, Tid(2));
    assert_eq!(engine.pending_sends(), 0);
}

#[test]
fn test_receive_without_send_is_silent() {
    let engine = running_engine();
    engine.ingest(receive(2, 25, 99).into());

    assert!(engine.drain_messages().is_empty());
    assert_eq!(engine.drain_events().len(), 1);
    assert_eq!(engine.stats().unmatched_receives, 1);
}

#[test]
fn test_reused_id_pairs_oldest_send_first() {
    let engine = running_engine();
    engine.ingest(send(1, 10, 7).into());
    engine.ingest(send(3, 20, 7).into());
    engine.ingest(receive(2, 30, 7).into());

    let first = engine.drain_messages();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].send_timestamp, Timestamp(10));
    assert_eq!(first[0].receive_timestamp, Timestamp(30));
    assert_eq!(engine.pending_sends(), 1);

    engine.ingest(receive(2, 40, 7).into());
    let second = engine.drain_messages();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].send_timestamp, Timestamp(20));
    assert_eq!(second[0].source_thread_id, Tid(3));
    assert_eq!(second[0].receive_timestamp, Timestamp(40));
    assert_eq!(engine.pending_sends(), 0);
}

#[test]
fn test_stack_walk_attaches_once() {
    let engine = running_engine();
    engine.ingest(AlpcRecord::new(ALPC_UNWAIT, 100, "client.exe", 5, 1, 0).into());
    engine.ingest(StackWalkRecord::new(5, 1, &[0xAAA, 0xBBB]).into());
    engine.ingest(StackWalkRecord::new(5, 1, &[0xCCC]).into());

    let events = engine.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stack(), Some(&[0xAAA, 0xBBB][..]));

    let stats = engine.stats();
    assert_eq!(stats.stacks_attached, 1);
    assert_eq!(stats.stacks_dropped, 1);
}

#[test]
fn test_later_event_on_thread_takes_the_stack() {
    let engine = running_engine();
    engine.ingest(send(5, 1, 1).into());
    engine.ingest(send(5, 2, 2).into());
    engine.ingest(StackWalkRecord::new(5, 2, &[0xAAA]).into());

    let events = engine.drain_events();
    assert_eq!(events[0].stack(), None);
    assert_eq!(events[1].stack(), Some(&[0xAAA][..]));
}

#[test]
fn test_stack_attaches_to_drained_event() {
    let engine = running_engine();
    engine.ingest(send(5, 1, 1).into());
    let events = engine.drain_events();
    assert_eq!(events[0].stack(), None);

    engine.ingest(StackWalkRecord::new(5, 1, &[0xAAA]).into());
    assert_eq!(events[0].stack(), Some(&[0xAAA][..]));
}

#[test]
fn test_paused_ignores_alpc_but_attaches_stacks() {
    let engine = running_engine();
    engine.ingest(send(5, 1, 7).into());
    engine.pause().unwrap();

    engine.ingest(receive(6, 2, 7).into());
    engine.ingest(send(8, 3, 9).into());
    engine.ingest(StackWalkRecord::new(5, 1, &[0xAAA]).into());

    assert!(engine.drain_messages().is_empty());
    let events = engine.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].stack(), Some(&[0xAAA][..]));
    // The send from before the pause is still waiting
    assert_eq!(engine.pending_sends(), 1);

    engine.run().unwrap();
    engine.ingest(receive(6, 4, 7).into());
    assert_eq!(engine.drain_messages().len(), 1);
}

#[test]
fn test_drain_twice_and_union() {
    let engine = running_engine();
    for ts in 0..5 {
        engine.ingest(send(1, ts, 1000 + ts as u32).into());
    }
    let first = engine.drain_events();
    assert_eq!(first.len(), 5);
    assert!(engine.drain_events().is_empty());

    for ts in 5..8 {
        engine.ingest(send(1, ts, 1000 + ts as u32).into());
    }
    let second = engine.drain_events();
    let stamps: Vec<u64> = first.iter().chain(&second).map(|e| e.timestamp.0).collect();
    assert_eq!(stamps, (0..8).collect::<Vec<_>>());
}

#[test]
fn test_buffer_never_exceeds_capacity() {
    let engine = running_engine();
    for ts in 0..10_050u64 {
        engine.ingest(AlpcRecord::new(ALPC_UNWAIT, 1, "a.exe", 1, ts, 0).into());
    }

    let events = engine.drain_events();
    assert_eq!(events.len(), 9_950);
    assert_eq!(events[0].timestamp, Timestamp(100));
    assert_eq!(engine.stats().events_evicted, 100);
}

#[test]
fn test_concurrent_ingest_and_drain() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 2_000;

    // Large enough that a slow drainer never triggers eviction
    let engine = running_engine_with(CaptureConfig {
        event_capacity: 100_000,
        ..CaptureConfig::default()
    });
    let mut handles = Vec::new();
    for p in 0..PRODUCERS {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                let id = p * PER_PRODUCER + i;
                engine.ingest(send(p, u64::from(id), id).into());
                engine.ingest(receive(p + 100, u64::from(id), id).into());
            }
        }));
    }

    let mut events = Vec::new();
    let mut messages = Vec::new();
    while handles.iter().any(|h| !h.is_finished()) {
        events.extend(engine.drain_events());
        messages.extend(engine.drain_messages());
        thread::yield_now();
    }
    for handle in handles {
        handle.join().unwrap();
    }
    events.extend(engine.drain_events());
    messages.extend(engine.drain_messages());

    let total = (PRODUCERS * PER_PRODUCER) as usize;
    assert_eq!(events.len(), total * 2);
    assert_eq!(messages.len(), total);

    let mut ids: Vec<u32> = messages.iter().map(|m| m.message_id.0).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
    assert_eq!(engine.pending_sends(), 0);
}

//! # Recorded Session Replay
//!
//! Feeds a recorded ALPC session through the capture engine exactly like a
//! live kernel session would: records are parsed into the raw kernel layouts
//! and pushed through the engine's record channel from a dedicated thread.
//!
//! ## File Format
//!
//! One JSON object per line, tagged by `kind`. Blank lines and lines starting
//! with `#` are skipped.
//!
//! ```text
//! # client asks, server answers
//! {"kind":"send","pid":1200,"process":"client.exe","tid":1201,"ts":1000,"id":7}
//! {"kind":"stack_walk","tid":1201,"frames":[140712345678,140712340016]}
//! {"kind":"receive","pid":800,"process":"server.exe","tid":801,"ts":2500,"id":7}
//! {"kind":"unwait","tid":1201,"ts":3000}
//! ```
//!
//! Timestamps are nanoseconds since the Unix epoch.

use alpc_common::{
    AlpcRecord, StackWalkRecord, ALPC_RECEIVE_MESSAGE, ALPC_SEND_MESSAGE, ALPC_UNWAIT,
    ALPC_WAIT_FOR_REPLY,
};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::capture::{RecordSender, TraceRecord, TraceSession, TraceSource};
use crate::config::SessionSettings;
use crate::domain::{ReplayError, SessionError};

/// One line of a replay file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayRecord {
    Send { pid: u32, process: String, tid: u32, ts: u64, id: u32 },
    Receive { pid: u32, process: String, tid: u32, ts: u64, id: u32 },
    WaitForReply {
        #[serde(default)]
        pid: u32,
        #[serde(default)]
        process: String,
        tid: u32,
        ts: u64,
        id: u32,
    },
    Unwait {
        #[serde(default)]
        pid: u32,
        #[serde(default)]
        process: String,
        tid: u32,
        ts: u64,
    },
    StackWalk {
        tid: u32,
        #[serde(default)]
        ts: u64,
        frames: Vec<u64>,
    },
}

impl ReplayRecord {
    /// Convert to the raw layout a kernel session would deliver
    #[must_use]
    pub fn into_trace_record(self) -> TraceRecord {
        match self {
            ReplayRecord::Send { pid, process, tid, ts, id } => {
                AlpcRecord::new(ALPC_SEND_MESSAGE, pid, &process, tid, ts, id).into()
            }
            ReplayRecord::Receive { pid, process, tid, ts, id } => {
                AlpcRecord::new(ALPC_RECEIVE_MESSAGE, pid, &process, tid, ts, id).into()
            }
            ReplayRecord::WaitForReply { pid, process, tid, ts, id } => {
                AlpcRecord::new(ALPC_WAIT_FOR_REPLY, pid, &process, tid, ts, id).into()
            }
            ReplayRecord::Unwait { pid, process, tid, ts } => {
                AlpcRecord::new(ALPC_UNWAIT, pid, &process, tid, ts, 0).into()
            }
            ReplayRecord::StackWalk { tid, ts, frames } => {
                StackWalkRecord::new(tid, ts, &frames).into()
            }
        }
    }
}

/// Parse a JSON-lines stream, skipping blank lines and `#` comments
///
/// # Errors
/// Returns [`ReplayError::Parse`] with the 1-based line number of the first
/// malformed line, or [`ReplayError::Io`] if reading fails
pub fn read_json_lines<T, R>(reader: R) -> Result<Vec<T>, ReplayError>
where
    T: DeserializeOwned,
    R: BufRead,
{
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(trimmed)
            .map_err(|source| ReplayError::Parse { line: index + 1, source })?;
        records.push(record);
    }
    Ok(records)
}

/// Parse every record from a replay stream
///
/// # Errors
/// See [`read_json_lines`]
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<ReplayRecord>, ReplayError> {
    read_json_lines(reader)
}

/// Parse a replay file
///
/// # Errors
/// See [`read_records`]
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<ReplayRecord>, ReplayError> {
    let file = File::open(path)?;
    read_records(BufReader::new(file))
}

/// Trace source that replays a recorded session file
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSource for ReplaySource {
    /// Parse the whole file up front, then deliver it from a background thread
    fn open(
        &mut self,
        settings: &SessionSettings,
        sink: RecordSender,
    ) -> Result<Box<dyn TraceSession>, SessionError> {
        let records = read_file(&self.path)?;
        info!(
            "Replaying {} records from {} as session '{}'",
            records.len(),
            self.path.display(),
            settings.name
        );

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let worker = thread::Builder::new().name("alpc-replay".to_string()).spawn(move || {
            let mut delivered = 0usize;
            for record in records {
                if stop_flag.load(Ordering::Acquire) || !sink.send(record.into_trace_record()) {
                    break;
                }
                delivered += 1;
            }
            debug!("Replay thread delivered {delivered} records");
        })?;

        Ok(Box::new(ReplaySession { stop, worker: Some(worker) }))
    }
}

/// Open replay; closing stops delivery and joins the replay thread
#[derive(Debug)]
pub struct ReplaySession {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TraceSession for ReplaySession {
    fn close(&mut self) -> Result<(), SessionError> {
        self.stop.store(true, Ordering::Release);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.join().map_err(|_| SessionError::Other("replay thread panicked".to_string()))
    }

    fn is_finished(&self) -> bool {
        match &self.worker {
            Some(worker) => worker.is_finished(),
            None => true,
        }
    }
}

//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::config::{
    CaptureConfig, SessionSettings, DEFAULT_EVENT_CAPACITY, DEFAULT_EVICTION_BATCH,
    DEFAULT_SESSION_NAME,
};

#[derive(Parser, Debug)]
#[command(
    name = "alpc-logger",
    about = "Capture ALPC traffic and pair sends with their receives",
    after_help = "\
EXAMPLES:
    alpc-logger session.jsonl                    Replay a recorded session
    alpc-logger session.jsonl --stacks           Print events with their call stacks
    alpc-logger session.jsonl --modules mods.jsonl
                                                 Stacks with owning module names
    alpc-logger session.jsonl --json -q          JSON lines only, no banner"
)]
pub struct Args {
    /// Recorded session to replay (JSON lines)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Trace session name
    #[arg(long, default_value = DEFAULT_SESSION_NAME, conflicts_with = "kernel_logger")]
    pub session_name: String,

    /// Attach to the system-wide kernel logger session (older systems)
    #[arg(long)]
    pub kernel_logger: bool,

    /// Kernel buffer size in MB
    #[arg(long, default_value_t = 64)]
    pub buffer_size_mb: u32,

    /// Event buffer high-water mark
    #[arg(long, default_value_t = DEFAULT_EVENT_CAPACITY)]
    pub max_events: usize,

    /// Oldest events dropped when the high-water mark is passed
    #[arg(long, default_value_t = DEFAULT_EVICTION_BATCH)]
    pub evict_batch: usize,

    /// Bound on unmatched sends (unbounded if omitted)
    #[arg(long, value_name = "N")]
    pub max_pending: Option<usize>,

    /// Message poll interval
    #[arg(long, default_value_t = 1000, value_name = "MS")]
    pub messages_interval_ms: u64,

    /// Event poll interval
    #[arg(long, default_value_t = 1500, value_name = "MS")]
    pub events_interval_ms: u64,

    /// Stop after N seconds (0 = until the trace ends)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Start the session without recording (nothing is captured)
    #[arg(long)]
    pub paused: bool,

    /// Print timeline events with their call stacks
    #[arg(long)]
    pub stacks: bool,

    /// Module load ranges used to name stack frames (JSON lines, implies --stacks)
    #[arg(long, value_name = "FILE")]
    pub modules: Option<PathBuf>,

    /// Print one JSON object per line instead of text
    #[arg(long)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Engine configuration described by these arguments
    #[must_use]
    pub fn to_config(&self) -> CaptureConfig {
        let session = if self.kernel_logger {
            SessionSettings::kernel_logger()
        } else {
            SessionSettings { name: self.session_name.clone(), ..SessionSettings::default() }
        };

        CaptureConfig {
            session: SessionSettings { buffer_size_mb: self.buffer_size_mb, ..session },
            event_capacity: self.max_events,
            eviction_batch: self.evict_batch,
            max_pending_sends: self.max_pending,
        }
    }
}

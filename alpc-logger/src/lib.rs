//! # ALPC Logger - ALPC Capture and Correlation Engine
//!
//! ALPC Logger subscribes to a kernel trace session reporting Advanced Local
//! Procedure Call activity, pairs every message send with the receive that
//! consumed it, and enriches timeline events with the call stacks the kernel
//! reports for them. Viewers poll the engine for completed messages and
//! buffered events.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Kernel Trace Session (external)                │
//! │  • ALPC: send, receive, wait-for-reply, unwait                  │
//! │  • Stack walks: frames for the previous event on a thread       │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ TraceRecord (crossbeam channel)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  ALPC Logger (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Capture    │──▶│  Correlator  │──▶│ Message Log  │──▶ poll │
//! │  │   Engine     │   │ (pending     │   └──────────────┘         │
//! │  │  (ingest)    │   │  sends)      │                            │
//! │  └──────────────┘   └──────────────┘   ┌──────────────┐         │
//! │         │                              │ Event Buffer │──▶ poll │
//! │         ├─────────────────────────────▶│ (bounded)    │         │
//! │         │                              └──────────────┘         │
//! │         ▼                                                       │
//! │  ┌──────────────┐                      ┌──────────────┐         │
//! │  │ Thread Stack │                      │ Symbolization│         │
//! │  │     Map      │                      │  (on demand) │         │
//! │  └──────────────┘                      └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: the engine, its lifecycle and every structure it feeds
//!   - `correlator` / `pending_sends`: FIFO send/receive pairing by message id
//!   - `stack_map`: thread → most recent event awaiting its stack
//!   - `event_buffer`: bounded timeline with batch eviction
//!   - `source`: the trace source interface and record channel
//!   - `event_display`: headless text/JSON output
//!
//! - [`trace_data`]: `Event`, `PendingSend` and `Message`
//!
//! - [`symbolization`]: lazy mapping of stored addresses to modules/symbols
//!
//! - [`replay`]: a trace source that replays recorded sessions
//!
//! - [`config`] / [`cli`]: engine configuration and its command line
//!
//! - [`domain`]: newtype ids, timestamps, lifecycle state and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Replay a recorded session, printing messages as they complete
//! ./alpc-logger session.jsonl
//!
//! # Events with stacks, as JSON lines
//! RUST_LOG=debug ./alpc-logger session.jsonl --stacks --json
//!
//! # Stack frames named by module
//! ./alpc-logger session.jsonl --modules modules.jsonl
//! ```
//!
//! ## Key Concepts
//!
//! - **Message id**: kernel-assigned correlation id, recycled after a round trip
//! - **Pending send**: a send whose receive has not been observed yet
//! - **Stack walk**: frames reported right after the event they belong to, on
//!   the same thread

pub mod capture;
pub mod cli;
pub mod config;
pub mod domain;
pub mod replay;
pub mod symbolization;
pub mod trace_data;

//! Headless output for drained messages, events and statistics

use log::warn;
use std::fmt::Write as _;

use super::CaptureStats;
use crate::symbolization::{CallStack, SymbolResolver};
use crate::trace_data::{Event, Message};

/// One-line description of a completed message
#[must_use]
pub fn format_message(message: &Message) -> String {
    format!("[MSG] {} {message} latency={}", message.receive_timestamp, message.latency())
}

/// Description of a timeline event, followed by its stack if `resolver` is set
#[must_use]
pub fn format_event(event: &Event, resolver: Option<&dyn SymbolResolver>) -> String {
    let mut out = format!(
        "[{}] {} {} ({} {})",
        event.kind, event.timestamp, event.process_name, event.process_id, event.thread_id
    );
    if let Some(id) = event.message_id {
        let _ = write!(out, " {id}");
    }

    let Some(resolver) = resolver else {
        return out;
    };
    match CallStack::build(event, resolver) {
        Some(stack) => {
            for (depth, frame) in stack.frames.iter().enumerate() {
                let _ = write!(out, "\n  #{depth:<3} {frame}");
            }
        }
        None => out.push_str("\n  (no stack)"),
    }
    out
}

/// Print a message to stdout, as text or as one JSON object per line
pub fn display_message(message: &Message, json: bool) {
    if json {
        match serde_json::to_string(message) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Failed to serialize message {}: {e}", message.message_id),
        }
    } else {
        println!("{}", format_message(message));
    }
}

/// Print an event to stdout, as text or as one JSON object per line
pub fn display_event(event: &Event, resolver: Option<&dyn SymbolResolver>, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Failed to serialize {} event: {e}", event.kind),
        }
    } else {
        println!("{}", format_event(event, resolver));
    }
}

/// Display capture statistics
pub fn display_statistics(stats: &CaptureStats) {
    eprintln!(
        "stats: records={} events={} messages={} unmatched_recv={} stacks={} stacks_dropped={} evicted={} ignored={}",
        stats.records,
        stats.events_recorded,
        stats.messages_matched,
        stats.unmatched_receives,
        stats.stacks_attached,
        stats.stacks_dropped,
        stats.events_evicted,
        stats.ignored_inactive,
    );
}

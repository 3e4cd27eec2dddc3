//! # alpc-logger - Main Entry Point
//!
//! Replays a recorded ALPC session through the capture engine and polls it
//! the way a live viewer would: completed messages every second, timeline
//! events every 1.5 seconds.

// Main function is intentionally long for clarity
#![allow(clippy::too_many_lines)]

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alpc_logger::capture::{display_event, display_message, display_statistics, CaptureEngine};
use alpc_logger::cli::Args;
use alpc_logger::replay::ReplaySource;
use alpc_logger::symbolization::{ModuleMap, RawAddresses, SymbolResolver};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("must be") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Drain and print everything the engine currently holds
fn drain_messages(engine: &CaptureEngine, json: bool) -> usize {
    let messages = engine.drain_messages();
    for message in &messages {
        display_message(message, json);
    }
    messages.len()
}

fn drain_events(
    engine: &CaptureEngine,
    resolver: Option<&dyn SymbolResolver>,
    json: bool,
) -> usize {
    let events = engine.drain_events();
    for event in &events {
        display_event(event, resolver, json);
    }
    events.len()
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let config = args.to_config();
    let engine = Arc::new(CaptureEngine::new(config).context("Invalid capture configuration")?);

    if !quiet {
        println!("alpc-logger v{}", env!("CARGO_PKG_VERSION"));
        println!("trace: {}", args.trace.display());
        println!("session: {}", engine.config().session.name);
    }

    let modules = match &args.modules {
        Some(path) => {
            let map = ModuleMap::read_file(path)
                .with_context(|| format!("Failed to load module map {}", path.display()))?;
            info!("Loaded modules for {} processes from {}", map.process_count(), path.display());
            Some(map)
        }
        None => None,
    };

    let mut source = ReplaySource::new(args.trace.clone());
    engine
        .start(&mut source)
        .with_context(|| format!("Failed to open {}", args.trace.display()))?;
    if args.paused {
        info!("Started paused, nothing will be recorded");
    } else {
        engine.run()?;
    }

    // Symbol names need a live session; a module map gives module names only
    let resolver: Option<&dyn SymbolResolver> = match &modules {
        Some(map) => Some(map as &dyn SymbolResolver),
        None if args.stacks => Some(&RawAddresses as &dyn SymbolResolver),
        None => None,
    };
    let show_events = resolver.is_some() || args.json;

    // First poll after one full period, not immediately
    let poll_every = |ms: u64| {
        let period = Duration::from_millis(ms.max(1));
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    };
    let mut messages_tick = poll_every(args.messages_interval_ms);
    let mut events_tick = poll_every(args.events_interval_ms);

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let capture_start = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };

    let mut messages_printed = 0usize;
    let mut events_seen = 0usize;
    let mut exit_reason = "interrupted";

    loop {
        if let Some(limit) = duration_limit {
            if capture_start.elapsed() >= limit {
                exit_reason = "duration limit reached";
                break;
            }
        }

        if engine.source_finished() {
            exit_reason = "trace finished";
            break;
        }

        tokio::select! {
            _ = messages_tick.tick() => {
                messages_printed += drain_messages(&engine, args.json);
            }
            _ = events_tick.tick() => {
                if show_events {
                    events_seen += drain_events(&engine, resolver, args.json);
                } else {
                    events_seen += engine.drain_events().len();
                }
            }
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    // Final drain: ingestion has stopped or is about to
    engine.dispose().context("Failed to release trace session")?;
    messages_printed += drain_messages(&engine, args.json);
    events_seen += if show_events {
        drain_events(&engine, resolver, args.json)
    } else {
        engine.drain_events().len()
    };

    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} messages, {} events, {} sends pending",
            exit_reason,
            capture_start.elapsed().as_secs_f64(),
            messages_printed,
            events_seen,
            engine.pending_sends(),
        );
        display_statistics(&engine.stats());
    }

    Ok(())
}

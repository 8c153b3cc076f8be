//! Crossfade sync demo - Main entry point
//!
//! Plays two simulated tracks through one crossfade with the sync manager
//! installed process-wide, then tears everything down and exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cfsync::sim::SimulatedMedia;
use cfsync::{global, MediaHandle, SharedHandle, SyncManager, TimeRange, TomlConfig};
use cfsync_common::time::secs_to_duration;
use cfsync_common::{CrossfadeTiming, EventBus, RuntimeStore, SyncEvent};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Simulated track length (seconds)
const TRACK_DURATION: f64 = 30.0;

/// Playback clock step
const TICK: Duration = Duration::from_millis(50);

/// Command-line arguments for cfsync
#[derive(Parser, Debug)]
#[command(name = "cfsync")]
#[command(about = "Crossfade synchronization demo on simulated media")]
#[command(version)]
struct Args {
    /// Config file path (overrides CFSYNC_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(short, long, env = "CFSYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Crossfade duration in seconds
    #[arg(short, long, default_value = "4.0")]
    duration: f64,

    /// Initial offset of the incoming track in seconds
    #[arg(short, long, default_value = "0.3")]
    skew: f64,

    /// Print sync events as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cfsync={level},cfsync_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        crossfade_secs = args.duration,
        skew_secs = args.skew,
        "Starting crossfade sync demo"
    );

    let timing = CrossfadeTiming::from_duration(args.duration);
    if !timing.enabled {
        warn!(crossfade_secs = args.duration, "Crossfade disabled; nothing to synchronize");
        return Ok(());
    }

    let runtime = RuntimeStore::new();
    let events = EventBus::new(config.sync.event_capacity);
    let manager = SyncManager::new(config.sync.clone(), runtime.clone(), events.clone())
        .context("Failed to create sync manager")?;
    global::install(manager.clone()).context("Failed to install sync manager")?;

    let printer = args.json.then(|| tokio::spawn(print_events(events.subscribe())));

    tokio::select! {
        _ = run_crossfade(&runtime, &events, timing, args.skew) => {}
        _ = signal::ctrl_c() => {
            info!("Interrupted");
            runtime.cancel_crossfade();
        }
    }

    info!(
        cycles = manager.cycle_count(),
        tracked = global::sync_tracked_count(),
        active = global::is_sync_active(),
        "Crossfade finished"
    );

    manager.destroy();
    global::uninstall();

    if let Some(printer) = printer {
        // Bus stays open while `events` lives; stop the printer explicitly
        printer.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

/// Drive the playback clock until the outgoing track ends
async fn run_crossfade(runtime: &RuntimeStore, events: &EventBus, timing: CrossfadeTiming, skew: f64) {
    // Start close enough to the end that the crossfade triggers within a second
    let start = (TRACK_DURATION - timing.fade_out * 1.5 - 1.0).max(timing.fade_out);
    let outgoing = SimulatedMedia::playing(start);
    outgoing.set_buffered(vec![TimeRange::new(0.0, TRACK_DURATION)]);

    let mut incoming: Option<Arc<SimulatedMedia>> = None;
    let mut crossfade_started: Option<Instant> = None;

    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let step = TICK.as_secs_f64();
        outgoing.advance(step);
        if let Some(incoming) = &incoming {
            incoming.advance(step);
        }
        events.emit_lossy(SyncEvent::TimeUpdate);

        let position = outgoing.current_position();
        if timing.time_running_out(position, TRACK_DURATION, runtime.is_busy()) {
            info!(position, "Crossfade triggered");
            runtime.set_triggered(true);
            runtime.set_busy(true);

            let next = SimulatedMedia::playing(skew);
            next.set_buffered(vec![TimeRange::new(0.0, TRACK_DURATION)]);

            let outgoing_handle: SharedHandle = outgoing.clone();
            let incoming_handle: SharedHandle = next.clone();
            global::register_sync_element(Some(&outgoing_handle), position);
            global::register_sync_element(Some(&incoming_handle), 0.0);

            incoming = Some(next);
            crossfade_started = Some(Instant::now());
            continue;
        }

        if let Some(started) = crossfade_started {
            if started.elapsed() >= secs_to_duration(timing.fade_out) {
                info!(
                    outgoing = outgoing.current_position(),
                    incoming = incoming.as_ref().map(|m| m.current_position()),
                    "Fade-out complete"
                );
                outgoing.fire_ended();
                // Give the ended hook a chance to run before tearing down
                tokio::task::yield_now().await;
                runtime.cancel_crossfade();
                return;
            }
        }
    }
}

async fn print_events(mut rx: broadcast::Receiver<SyncEvent>) {
    loop {
        match rx.recv().await {
            Ok(SyncEvent::TimeUpdate) => continue,
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, event = event.name(), "Failed to serialize event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

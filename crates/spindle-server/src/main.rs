//! Spindle standalone reactor host
//!
//! Brings up the reactor runtime on a core mask, runs a heartbeat poller,
//! and shuts down after a fixed duration (or runs until killed).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use spindle_core::{NoopTimers, OsPlatform, Poller, Runtime, RuntimeConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Spindle - per-core cooperative reactor runtime
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Hex core mask selecting reactor cores (default: all online cores)
    #[arg(short = 'm', long)]
    core_mask: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds to run before stopping (0 = run until killed)
    #[arg(long, default_value_t = 5)]
    run_secs: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("spindle={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting spindle reactor host");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = RuntimeConfig::builder();
    if let Some(mask) = &args.core_mask {
        config = config.core_mask(mask.clone());
    }
    let mut runtime =
        Runtime::init_with(config.build()?, Box::new(OsPlatform::new()), Box::new(NoopTimers))?;

    info!(
        "Runtime initialized: mask {:#x}, {} cores",
        runtime.core_mask(),
        runtime.core_count()
    );

    // A heartbeat poller on the master core so an otherwise idle host shows
    // the loop is alive.
    let beats = Arc::new(AtomicU64::new(0));
    let heartbeat = {
        let beats = Arc::clone(&beats);
        Arc::new(Poller::new(move || {
            beats.fetch_add(1, Ordering::Relaxed);
        }))
    };
    runtime.poller_register(&heartbeat, 0, None);

    thread::scope(|scope| -> Result<()> {
        let runtime = &runtime;
        if args.run_secs > 0 {
            scope.spawn(move || {
                thread::sleep(Duration::from_secs(args.run_secs));
                runtime.stop();
            });
        }
        runtime.start()?;
        Ok(())
    })?;

    for core_stats in &runtime.stats().cores {
        info!(
            "Reactor {}: {} events, {} poller runs",
            core_stats.core, core_stats.events_executed, core_stats.pollers_polled
        );
    }
    info!("Heartbeat ticked {} times", beats.load(Ordering::Relaxed));

    runtime.fini()?;
    Ok(())
}

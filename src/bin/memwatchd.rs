//! memwatchd - streams a process's memory usage as log lines or JSON events.
//!
//! Observes its own process by default, or any visible PID with `--pid`.
//! Each published snapshot becomes either a structured log line or, with
//! `--json`, one JSON event per line on stdout.

use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_os = "linux"))]
use memwatch::probe::mock::MockFs;
#[cfg(target_os = "linux")]
use memwatch::RealFs;
use memwatch::{
    ByteSize, MemoryObserver, MemoryProbe, ObservationInterval, SNAPSHOT_EVENT,
    SNAPSHOT_PAYLOAD_KEY,
};

/// Process memory observation daemon.
#[derive(Parser)]
#[command(name = "memwatchd", about = "Process memory observation daemon", version = memwatch::VERSION)]
struct Args {
    /// Sampling cadence: live (100ms), frequent (500ms), default (1s) or deferred (5s).
    #[arg(short, long, default_value = "default", env = "MEMWATCH_INTERVAL")]
    interval: ObservationInterval,

    /// Observe this PID instead of memwatchd itself.
    #[arg(short, long, env = "MEMWATCH_PID")]
    pid: Option<u32>,

    /// Path to the proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Emit one JSON event per snapshot on stdout instead of log lines.
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds (0 = run until interrupted).
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("memwatchd={}", level).parse().unwrap())
        .add_directive(format!("memwatch={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async_main(args));
}

async fn async_main(args: Args) {
    #[cfg(target_os = "linux")]
    let fs = RealFs::new();
    #[cfg(not(target_os = "linux"))]
    let fs = MockFs::observed_process();

    let probe = match args.pid {
        Some(pid) => MemoryProbe::for_pid(fs, &args.proc_path, pid),
        None => MemoryProbe::new(fs, &args.proc_path),
    };

    // The physical-memory constant is unavailable off-Linux; give the mock
    // host a plausible machine.
    #[cfg(not(target_os = "linux"))]
    let probe = {
        let mut probe = probe;
        probe.set_total_memory(8 * 1024 * 1024 * 1024);
        probe
    };

    info!("memwatchd {} starting", memwatch::VERSION);
    info!(
        interval = %args.interval,
        observing = %args.pid.map(|p| p.to_string()).unwrap_or_else(|| "self".to_string()),
        proc_path = %args.proc_path,
        total = %ByteSize::new(probe.total_memory()),
        "config"
    );

    if let Err(e) = probe.snapshot() {
        warn!(error = %e, "initial accounting query failed; sampling will keep retrying");
    }

    let observer = MemoryObserver::new(probe);
    let mut updates = observer.subscribe();
    observer.start_observing(args.interval);

    let json = args.json;
    let consumer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(snapshot) => {
                    if json {
                        let event = json!({
                            "event": SNAPSHOT_EVENT,
                            (SNAPSHOT_PAYLOAD_KEY): snapshot,
                        });
                        println!("{}", event);
                    } else {
                        info!(
                            resident = %snapshot.resident,
                            max_resident = %snapshot.max_resident,
                            virtual_size = %snapshot.virtual_size,
                            used = %snapshot.used,
                            total = %snapshot.total,
                            used_pct = %format!("{:.1}", snapshot.used_fraction() * 100.0),
                            "memory snapshot"
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "snapshot consumer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    if args.duration > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.duration)) => {
                info!("duration elapsed");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal");
            }
        }
    } else {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received shutdown signal"),
            Err(e) => warn!(error = %e, "failed to listen for shutdown signal"),
        }
    }

    observer.stop_observing();
    drop(observer); // closes the channel so the consumer drains and exits
    let _ = consumer.await;
    info!("memwatchd stopped");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  debugd: HTTP debug server
//
//  Architecture: monoio thread-per-core, one listener per worker
//  Routes:       /ping, /logs, everything else is a debug snapshot
//  Config:       defaults, PORT / DEBUGD_* env, CLI
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use debugd_core::config::{Overrides, ServerConfig};
use debugd_http::worker::{self, SharedState};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Global shutdown flag, set by the SIGTERM/SIGINT handler.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Set by the SIGHUP handler, cleared once the main loop has logged it.
static HANGUP: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "debugd", version, about = "HTTP debug server: ping, access log and request snapshots")]
struct Cli {
    /// Port to listen on (overrides the PORT environment variable)
    port: Option<u16>,

    /// Number of worker threads (default: one per core)
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    // ── Config ──
    let config = ServerConfig::load(&Overrides {
        port: cli.port,
        workers: cli.workers,
    })?;
    let port = config.port;
    let num_workers = config.effective_workers();

    info!("Debug HTTP server starting on port {}", port);
    info!("Access at http://localhost:{}", port);
    info!("Press Ctrl-C to stop");

    setup_signal_handler();

    // ── Spawn monoio worker threads ──
    let shared = SharedState::new(config);
    let workers = worker::spawn_workers(shared, num_workers)?;

    info!(
        workers = num_workers,
        addr = %workers.local_addr,
        version = env!("CARGO_PKG_VERSION"),
        "debugd is ready"
    );

    // ── Wait for SIGTERM/SIGINT, acknowledging SIGHUP along the way ──
    while !SHUTDOWN.load(Ordering::Relaxed) {
        if HANGUP.swap(false, Ordering::Relaxed) {
            info!("Received signal SIGHUP, continue running");
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    info!("Shutdown signal received, stopping...");

    // Workers sit in an endless accept loop; the OS reclaims them on exit.
    drop(workers);

    info!("debugd stopped");
    Ok(())
}

fn setup_signal_handler() {
    // SIGTERM (docker stop) + SIGINT (Ctrl+C)
    for sig in [libc::SIGTERM, libc::SIGINT] {
        unsafe {
            libc::signal(sig, shutdown_handler as libc::sighandler_t);
        }
    }
    unsafe {
        libc::signal(libc::SIGHUP, hangup_handler as libc::sighandler_t);
    }
}

extern "C" fn shutdown_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

extern "C" fn hangup_handler(_sig: libc::c_int) {
    HANGUP.store(true, Ordering::Relaxed);
}

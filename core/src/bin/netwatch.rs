//! netwatch inspector binary.
//!
//! Listens for capture clients, keeps the received requests in memory and
//! saves the session on Ctrl-C.
//!
//! Usage:
//! ```text
//! netwatch [--port <PORT>] [--restore] [--log-dir <DIR>]
//! ```

use std::path::PathBuf;

use netwatch::api::{init_logging, Inspector};
use netwatch::config::NetwatchConfig;
use netwatch::storage::StoreEvent;
use tokio::sync::broadcast::error::RecvError;

struct Args {
    port: Option<u16>,
    restore: bool,
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    init_logging(args.log_dir.as_deref())?;

    let mut config = NetwatchConfig::load();
    if let Some(port) = args.port {
        config.port = port;
    }

    let inspector = match Inspector::start(&config).await {
        Ok(inspector) => inspector,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        "netwatch v{} waiting for clients on port {}",
        netwatch::VERSION,
        config.port
    );

    if args.restore {
        match inspector.restore_session() {
            Some(count) => tracing::info!("Restored {} requests", count),
            None => tracing::info!("No saved session to restore"),
        }
    }

    let mut events = inspector.store().subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(StoreEvent::Flushed { added }) => {
                    let store = inspector.store();
                    for request in store.requests().iter().take(added) {
                        tracing::info!(
                            "{} {} {} {} {}",
                            request.method,
                            request.status,
                            request.url,
                            request.duration_str(),
                            request.size_str()
                        );
                    }
                }
                Ok(StoreEvent::ConnectionChanged { connected }) => {
                    let client = inspector.store().client_name().unwrap_or_default();
                    if connected {
                        tracing::info!("Connected: {}", client);
                    } else {
                        tracing::info!("Waiting for clients...");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} store events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    match inspector.save_session() {
        Ok(path) => tracing::info!("Session saved to {}", path.display()),
        Err(e) => tracing::error!("Failed to save session: {e:#}"),
    }
    let stats = inspector.store().stats();
    tracing::info!(
        "{} requests, {} errors ({:.1}%), avg {}ms, p95 {}ms",
        stats.total_requests,
        stats.error_count,
        stats.error_rate() * 100.0,
        stats.avg_duration,
        stats.p95_duration
    );
    inspector.stop().await;
    Ok(())
}

fn parse_args() -> Args {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        port: None,
        restore: false,
        log_dir: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" | "-p" => match args.next().map(|p| p.parse::<u16>()) {
                Some(Ok(port)) => parsed.port = Some(port),
                _ => {
                    eprintln!("--port expects a number between 0 and 65535");
                    std::process::exit(2);
                }
            },
            "--restore" => parsed.restore = true,
            "--log-dir" => {
                if let Some(dir) = args.next() {
                    parsed.log_dir = Some(PathBuf::from(dir));
                }
            }
            "--help" | "-h" => {
                eprintln!("netwatch - HTTP traffic inspector");
                eprintln!();
                eprintln!("Usage: netwatch [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --port, -p <PORT>   Port to listen on (default: 9090, or .netwatchrc / NETWATCH_PORT)");
                eprintln!("  --restore           Load the last saved session on startup");
                eprintln!("  --log-dir <DIR>     Write logs to a daily file in DIR (release builds)");
                eprintln!("  --help, -h          Show this help");
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {arg}");
            }
        }
    }

    parsed
}

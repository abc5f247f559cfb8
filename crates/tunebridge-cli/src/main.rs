// SPDX-License-Identifier: GPL-3.0-or-later
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::serve;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tunebridge_api::router;
use tunebridge_application::{AppState, TracingObserver};
use tunebridge_config::{load as load_config, HttpConfig, TelemetryConfig};
use tunebridge_domain::{SourceTrack, TransferRecord};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file layered over the defaults.
    #[arg(short, long, global = true, env = "TUNEBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Transfer a list of tracks into a new container and exit.
    Transfer {
        /// JSON array of tracks, each with at least `title` and `artist`.
        #[arg(long)]
        tracks: PathBuf,
        /// Name of the container to create.
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry);

    let state = AppState::initialize(config).await?;
    state.on_start();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(state).await,
        Command::Transfer {
            tracks,
            name,
            description,
        } => run_transfer(state, &tracks, &name, &description).await,
    }
}

fn init_tracing(telemetry: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&telemetry.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if telemetry.json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_names(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_level(true),
            )
            .init();
    }
}

async fn run_server(state: AppState) -> Result<()> {
    let addr = bind_addr(&state.config.http)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let addr = listener.local_addr()?;
    info!(target: "cli", "listening on {}", addr);

    serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn read_tracks(path: &Path) -> Result<Vec<SourceTrack>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("{} is not a JSON array of tracks", path.display()))
}

async fn run_transfer(
    state: AppState,
    tracks_file: &Path,
    name: &str,
    description: &str,
) -> Result<()> {
    let tracks = read_tracks(tracks_file)?;
    info!(target: "cli", tracks = tracks.len(), container = %name, "starting transfer");

    let mut record = TransferRecord::started(name, Some(tracks_file.display().to_string()));
    let result = state
        .transfer_pipeline()
        .run(name, description, &tracks, Arc::new(TracingObserver))
        .await;

    let (stats, container_id, error) = match &result {
        Ok(report) => (report.stats, Some(report.container_id.clone()), None),
        Err(err) => (err.stats().unwrap_or_default(), None, Some(err.to_string())),
    };
    record.finish(stats, container_id, error);
    if let Err(err) = state.transfers.add(record).await {
        warn!(target: "cli", error = %err, "failed to save transfer history");
    }

    println!(
        "total: {}  matched: {}  added: {}  failed: {}",
        stats.total, stats.matched, stats.added, stats.failed
    );

    result.map(|_| ()).map_err(anyhow::Error::from)
}

fn bind_addr(http: &HttpConfig) -> Result<SocketAddr> {
    let addr = format!("{}:{}", http.host, http.port);
    addr.parse()
        .with_context(|| format!("invalid listen address {addr}"))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {},
                    _ = terminate.recv() => {},
                }
            }
            _ => {
                warn!(target: "cli", "unix signal handlers unavailable, waiting for ctrl-c");
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(target: "cli", error = %err, "ctrl-c handler failed");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "cli", error = %err, "ctrl-c handler failed");
        }
    }

    info!(target: "cli", "shutdown signal received");
}

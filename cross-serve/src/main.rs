//! cross-serve - HTTP API for cross-posting to social platforms

use anyhow::{Context, Result};
use clap::Parser;
use libcrosspost::config::Config;
use libcrosspost::events::{Event, EventReceiver};
use libcrosspost::logging::{LogFormat, LoggingConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use cross_serve::{router, AppState};

/// How often abandoned OAuth states are swept
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "cross-serve")]
#[command(version)]
#[command(about = "HTTP API for publishing to connected social platforms")]
#[command(long_about = "\
cross-serve - HTTP API for publishing to connected social platforms

DESCRIPTION:
    cross-serve exposes the Crosspost publish orchestrator over HTTP. It
    stores OAuth connections per user in SQLite and publishes one post to
    several platforms concurrently, reporting a result per platform.

USAGE:
    # Serve on the configured address
    cross-serve

    # Override the bind address
    cross-serve --bind 0.0.0.0:9000

    # JSON logs for log collectors
    cross-serve --log-format json

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (in-flight requests finish)

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml
    Override with CROSSPOST_CONFIG or --config.

EXIT CODES:
    0 - Clean shutdown
    1 - Configuration or runtime error
")]
struct Cli {
    /// Configuration file (overrides CROSSPOST_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json or pretty (overrides CROSSPOST_LOG_FORMAT)
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env("info").verbose(cli.verbose);
    if let Some(format) = cli.log_format {
        logging = logging.format(format);
    }
    logging.init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load()?,
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    let addr = config.server.socket_addr()?;

    let state = AppState::from_config(&config).await?;
    info!(platforms = ?state.poster.platforms(), "Adapters ready");

    tokio::spawn(log_events(state.poster.event_bus().subscribe()));

    let pending = state.pending.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = pending.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired OAuth states");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("cross-serve listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("cross-serve stopped");
    Ok(())
}

/// Log publish progress from the orchestrator's event bus
async fn log_events(mut events: EventReceiver) {
    loop {
        match events.recv().await {
            Ok(Event::PlatformCompleted { post_id, outcome }) if !outcome.success => {
                tracing::warn!(
                    post_id = %post_id,
                    platform = %outcome.platform,
                    kind = outcome.error_kind.as_deref().unwrap_or("unknown"),
                    "Platform publish failed"
                );
            }
            Ok(Event::PublishCompleted {
                post_id,
                succeeded,
                total,
            }) => {
                info!(post_id = %post_id, succeeded, total, "Publish finished");
            }
            Ok(event) => tracing::debug!(?event, "Publish event"),
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "Event log fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use futures::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            error!("Signal setup failed: {}", e);
            std::future::pending::<()>().await;
            return;
        }
    };

    if let Some(signal) = signals.next().await {
        info!(signal, "Received shutdown signal, stopping gracefully...");
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, stopping gracefully...");
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, LoggingConfig, Settings, StorageBackend};
use turnstile::http::{AppState, HttpServer};
use turnstile::persist::ConfigFile;
use turnstile::ratelimit::{CounterStore, InMemoryStore, RateLimiter, RedisStore, Sweeper};

/// Token-keyed rate limiting service.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Path to a YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(addr) = cli.http_addr {
        settings.server.http_addr = addr;
    }

    init_tracing(&settings.logging);

    info!("Starting Turnstile Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %settings.server.http_addr,
        backend = ?settings.storage.backend,
        "Configuration loaded"
    );

    // Select the counter store
    let mut sweeper = None;
    let store: Arc<dyn CounterStore> = match settings.storage.backend {
        StorageBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            match settings.storage.sweep_interval() {
                Some(period) => sweeper = Some(Sweeper::start(store.clone(), period)),
                None => info!("In-memory counter sweeper disabled"),
            }
            store
        }
        StorageBackend::Redis => {
            let store = RedisStore::new(
                &settings.storage.redis_url,
                &settings.storage.key_prefix,
                settings.storage.command_timeout(),
            )?;
            if let Err(e) = store.ping().await {
                warn!(error = %e, "Redis is not reachable yet; checks will fail until it is");
            }
            Arc::new(store)
        }
    };

    // A persisted configuration wins over the settings defaults
    let config_file = settings.limits.persist_path.clone().map(ConfigFile::new);
    let initial = match &config_file {
        Some(file) => match file.load().await? {
            Some(config) => config,
            None => settings.limits.initial()?,
        },
        None => settings.limits.initial()?,
    };

    let rate_limiter = Arc::new(RateLimiter::with_config(store, initial));
    info!(
        interval = initial.interval,
        limit = initial.limit,
        "Rate limiter initialized"
    );

    let mut state = AppState::new(rate_limiter);
    if let Some(file) = config_file {
        state = state.with_config_file(file);
    }

    // Run the server with graceful shutdown on Ctrl+C
    HttpServer::new(settings.server.http_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    info!("Turnstile Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

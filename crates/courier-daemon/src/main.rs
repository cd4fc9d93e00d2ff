use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

mod platform;

use courier_bridge::Bridge;
use courier_channels::{Base64Codec, Notifier};
use courier_core::config::{CourierConfig, FIRED_QUEUE_CAPACITY};
use courier_dispatch::{reconciler, Executor, Services};
use courier_scheduler::{FiredJob, SchedulerEngine, SchedulerHandle};
use courier_store::Store;
use courier_telegram::TelegramNotifier;

/// Headless delivery daemon: scheduler engine, executor, and per-identity
/// reconcilers. The HTTP/API surface runs as a separate process against the
/// same database.
#[derive(Parser, Debug)]
#[command(name = "courier-daemon", version)]
struct Cli {
    /// Path to courier.toml (defaults to COURIER_CONFIG, then ~/.courier/).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = CourierConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        CourierConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    // Each subsystem gets its own connection; schemas are idempotent.
    let store = Arc::new(Store::open(db_path)?);
    let scheduler = SchedulerHandle::new(rusqlite::Connection::open(db_path)?)?;
    info!(
        triggers = scheduler.entry_count()?,
        "database migrations complete"
    );

    // Fired-job channel: SchedulerEngine → Executor.
    let (fired_tx, fired_rx) = tokio::sync::mpsc::channel::<FiredJob>(FIRED_QUEUE_CAPACITY);
    let engine = SchedulerEngine::new(rusqlite::Connection::open(db_path)?, fired_tx)?;

    let factory = platform::messenger_factory(&config.platform)?;
    let bridge = Bridge::new(factory, &config.bridge);

    let notifier: Option<Arc<dyn Notifier>> = match &config.notifier.bot_token {
        Some(token) => {
            info!("execution notifications enabled");
            Some(Arc::new(TelegramNotifier::new(token)))
        }
        None => {
            info!("no notifier bot token configured, notifications disabled");
            None
        }
    };

    let services = Services {
        store,
        scheduler,
        bridge,
        codec: Arc::new(Base64Codec),
        notifier,
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(engine.run(shutdown_rx.clone()));
    tokio::spawn(Executor::new(services.clone()).run(fired_rx, shutdown_rx.clone()));

    let period = Duration::from_secs(config.reconciler.period_secs);
    let spawned = reconciler::spawn_reconcilers(&services, period, &shutdown_rx)?;
    info!(reconcilers = spawned, adapter = %config.platform.adapter, "courier daemon running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown_tx.send(true)?;
    // Give the loops a beat to observe the flag before the process exits.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(dir = %parent.display(), "could not create database directory: {e}");
        }
    }
}

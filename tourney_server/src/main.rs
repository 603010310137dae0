//! Tournament service.
//!
//! Serves the HTTP/WebSocket API and runs the date-driven status scheduler
//! next to it. Several instances can share one database; the scheduler's
//! advisory lock keeps sweeps exclusive.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Error};
use pico_args::Arguments;
use tokio::sync::watch;
use tourney::{
    db::Database,
    notify::{DEFAULT_HUB_CAPACITY, NotificationHub},
    scheduler::StatusScheduler,
};
use tourney_server::{
    api::{self, AppState},
    config::ServerConfig,
    logging, metrics,
};
use tracing::info;

const HELP: &str = "\
Run the tournament service

USAGE:
  tourney_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/tourney]

FLAGS:
  --no-migrate             Skip running database migrations on startup
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  DB_MAX_CONNECTIONS       Pool size                    [default: 20]
  SCHEDULER_INTERVAL_SECS  Status sweep interval        [default: 30]
  SCHEDULER_LOCK_ID        Advisory lock key for sweeps
  METRICS_BIND             Prometheus scrape address    [default: disabled]
  RUST_LOG                 Log filter                   [default: info,sqlx=warn,hyper=warn]
  (See .env file for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        migrate: !pargs.contains("--no-migrate"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics exported at http://{addr}/metrics");
    }

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    if args.migrate {
        db.migrate().await.context("Failed to run migrations")?;
        info!("Database migrations applied");
    }

    let store = Arc::new(db.store());
    let (hub, hub_task) = NotificationHub::spawn(DEFAULT_HUB_CAPACITY);
    let state = AppState::new(Arc::clone(&store), hub.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = StatusScheduler::new(state.lifecycle.clone(), config.scheduler);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Tournament service listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, shutting down background tasks");
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        tracing::warn!(error = %e, "Scheduler task ended abnormally");
    }
    if hub.shutdown().await.is_ok() {
        let _ = hub_task.await;
    }
    db.close().await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

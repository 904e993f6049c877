//! Crowdfunding platform backend: entry point.
//!
//! Serves the REST API (projects, backings, rewards, disputes, experts,
//! users) over an embedded SQLite store, talks to the payment gateway for
//! pledges and refunds, and runs two background tasks: the deadline sweeper
//! and the notification delivery worker.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod gateway;
mod ledger;
mod lifecycle;
mod money;
mod notify;
mod store;
mod validate;


#[cfg(test)]
mod test_ledger;
#[cfg(test)]
mod test_lifecycle;
#[cfg(test)]
mod test_occ;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use auth::{DbPermissionChecker, DbTokenVerifier};
use config::Config;
use gateway::HttpGateway;
use ledger::Ledger;
use notify::LogSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by every outbound gateway call.
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let gateway = Arc::new(HttpGateway::new(
        client,
        config.gateway_url.clone(),
        config.gateway_secret.clone(),
    ));

    // ─── Background workers ───────────────────────────────
    let (notifier, notify_worker) = notify::spawn(Arc::new(LogSink), config.notify_queue_size);

    let sweep_token = CancellationToken::new();
    let sweeper = tokio::spawn(lifecycle::run_sweeper(
        pool.clone(),
        config.sweep_interval_secs,
        sweep_token.clone(),
    ));

    // ─── REST API ─────────────────────────────────────────
    let ledger = Ledger::new(pool.clone(), gateway, notifier.clone(), &config);
    let state = Arc::new(api::ApiState {
        pool: pool.clone(),
        ledger,
        notifier,
        verifier: Arc::new(DbTokenVerifier { pool: pool.clone() }),
        perms: Arc::new(DbPermissionChecker { pool }),
    });
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The server has stopped taking requests; stop the sweeper, then give
    // the notification queue a bounded window to drain.  Every Notifier
    // clone died with the router, so the queue is already closed.
    sweep_token.cancel();
    if let Err(e) = sweeper.await {
        error!("deadline sweeper task failed: {e}");
    }
    match tokio::time::timeout(Duration::from_secs(config.shutdown_grace_secs), notify_worker).await
    {
        Ok(Ok(())) => info!("shutdown complete"),
        Ok(Err(e)) => error!("notification worker failed: {e}"),
        Err(_) => warn!(
            "notification queue did not drain within {}s, exiting anyway",
            config.shutdown_grace_secs
        ),
    }

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
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
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

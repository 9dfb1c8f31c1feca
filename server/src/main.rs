//! Gauge Oracle Server
//!
//! Polls a river gauge, publishes the scaled reading to the configured
//! ledger backend and serves the oracle status over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gauge_oracle::app_state::AppState;
use gauge_oracle::config::AppConfig;
use gauge_oracle::handlers::admin::ADMIN_TOKEN_HEADER;
use gauge_oracle::routes;
use gauge_oracle::services::ledger::LedgerClient;
use gauge_oracle::services::scheduler::Scheduler;
use gauge_oracle::services::source::UsgsClient;
use gauge_oracle::state::OracleState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let source = UsgsClient::new(&config.source).context("failed to build data source client")?;
    let ledger = LedgerClient::from_config(&config.ledger)?;
    let state = OracleState::new(
        config.source.provider_name.clone(),
        config.source.site_id.clone(),
        config.ledger.scale,
    );

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(source),
        Arc::new(ledger),
        Arc::new(state),
        config.poll_interval,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run_forever(shutdown_rx).await })
    };

    let app = routes::app_router(AppState::new(scheduler, config.admin_token.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_allowed_origins));

    let addr = SocketAddr::new(config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, backend = ?config.ledger.backend, "Server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    // Stop the timer and let an in-flight run finish.
    let _ = shutdown_tx.send(true);
    if let Err(join_error) = scheduler_task.await {
        error!(error = %join_error, "scheduler task failed");
    }

    info!("Server stopped");
    Ok(())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins = origins
        .iter()
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ])
        .allow_credentials(false)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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

    info!("shutdown signal received");
}

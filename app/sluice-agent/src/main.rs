//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Sluice agent main binary

use metrics_exporter_prometheus::PrometheusBuilder;
use sluice_agent::http::HttpServer;
use sluice_agent::settings::{AgentSettings, LogFormat};
use sluice_pipeline::Engine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = AgentSettings::from_env();
    init_tracing(settings.log_format);

    info!("Starting Sluice Agent v{}", sluice_agent::AGENT_VERSION);

    let config = settings.load_engine_config()?;
    let grace = config.shutdown_grace();

    let prometheus = PrometheusBuilder::new().install_recorder()?;

    let mut engine = Engine::builder(config).build()?;
    engine.start()?;
    let engine = Arc::new(Mutex::new(engine));
    info!("Engine started successfully");

    let http_server = HttpServer::new(engine.clone(), prometheus).await;
    let app = http_server.create_router();
    let addr: std::net::SocketAddr = settings.http_endpoint.parse()?;

    info!("Starting HTTP server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        error!("HTTP server error: {}", e);
    }

    info!("Shutting down engine");
    let report = engine.lock().await.shutdown(grace).await;
    if report.timed_out {
        warn!(
            batches_lost = report.batches_lost,
            records_lost = report.records_lost,
            "Shutdown grace period elapsed with undelivered work"
        );
    }

    info!(duration = ?report.duration, "Sluice Agent shutdown completed");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }

    info!("Shutdown signal received");
}

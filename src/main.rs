//! # Transcription Gateway - Main Application Entry Point
//!
//! An HTTP front end that accepts audio uploads and returns transcripts,
//! delegating speech-to-text to one configured backend.
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (defaults, file, environment)
//! - **transcription**: Provider trait, local and remote providers, factory,
//!   request handler
//! - **audio**: Upload staging and WAV decoding
//! - **state**: Shared application state injected into handlers
//! - **metrics**: Prometheus counters and histograms
//! - **middleware**: Request logging with request ids, HTTP statistics
//! - **handlers**: HTTP endpoints
//! - **error**: HTTP error responses
//!
//! ## Startup Order:
//! 1. Load `.env`, configuration, and set up logging
//! 2. Create the staging directory
//! 3. Build the transcription provider (may download and load a model)
//! 4. Serve the API, and metrics when a Prometheus port is configured
//! 5. Stop gracefully on SIGINT/SIGTERM

mod audio;
mod config;
mod device;
mod error;
mod handlers;
mod health;
mod metrics;
mod middleware;
mod state;
mod transcription;

use crate::config::AppConfig;
use crate::state::AppState;
use crate::transcription::{ProviderFactory, RequestHandler};
use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate()?;

    init_tracing(&config)?;

    info!("Starting transcription-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Starting server for model {} on port {}",
        config.server.name, config.server.port
    );

    std::fs::create_dir_all(&config.staging.directory).with_context(|| {
        format!(
            "failed to create staging directory {}",
            config.staging.directory.display()
        )
    })?;

    let provider = ProviderFactory::create(&config.provider).await?;
    info!("Transcription provider ready: {}", provider.describe());

    let app_state = AppState::new(&config, RequestHandler::new(provider));
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let api_state = app_state.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(api_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(handlers::routes)
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let metrics_handle = match config.metrics.prometheus_port {
        Some(port) => {
            let metrics_addr = format!("{}:{}", config.server.host, port);
            info!("Starting Prometheus metrics server on port {}", port);

            let metrics_state = app_state.clone();
            let metrics_server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(metrics_state.clone()))
                    .configure(handlers::metrics_routes)
            })
            .workers(1)
            .bind(&metrics_addr)?
            .run();

            let handle = metrics_server.handle();
            tokio::spawn(async move {
                if let Err(e) = metrics_server.await {
                    error!("Metrics server error: {}", e);
                }
            });
            Some(handle)
        }
        None => None,
    };

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    if let Some(handle) = metrics_handle {
        handle.stop(true).await;
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging, plus a plain-text log file when one is configured.
///
/// `RUST_LOG` takes precedence over `logging.level`.
fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;

    let file_layer = match config.log_file_path() {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory {}", parent.display())
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Resolves on SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received SIGINT");
}

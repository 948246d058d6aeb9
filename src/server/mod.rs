pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{Extension, Router, ServiceExt, extract::Request, routing::get};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::{normalize_path::NormalizePathLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::AppConfig;
use api::{
    health_controller::health_endpoint, metrics_controller::metrics_endpoint,
    proxy_controller::ProxyController,
};
use services::{RelayServices, rate_limit_services::spawn_sweeper};

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct ApplicationServer;

impl ApplicationServer {
    /// relay and health routes with the services attached, no listener and no metrics
    pub fn router(services: RelayServices) -> Router {
        Router::new()
            .nest("/api", ProxyController::app())
            .route("/health", get(health_endpoint))
            .layer(Extension(services))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(config: Arc<AppConfig>, services: RelayServices) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let metrics = PrometheusBuilder::new()
            .install_recorder()
            .context("could not install the prometheus recorder")?;

        // redis keys expire by themselves, only the in-memory records need sweeping
        let sweeper = (services.rate_limit.backend() == "memory").then(|| {
            spawn_sweeper(
                services.rate_limit.clone(),
                Duration::from_secs(config.rate_limit_sweep_seconds),
            )
        });

        let router = Self::router(services.clone())
            .route("/metrics", get(metrics_endpoint))
            .layer(Extension(metrics));
        let app = NormalizePathLayer::trim_trailing_slash().layer(router);

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("could not bind to {}", addr))?;

        info!("relay listening on {}", addr);

        axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server stopped with an error")?;

        info!("connections drained, cleaning up...");
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        services.shutdown().await;
        info!("relay stopped");

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("could not listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("could not listen for SIGTERM: {}", e);
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

    info!("shutdown signal received, draining connections...");
}

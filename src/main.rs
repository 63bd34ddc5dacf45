mod api;
mod config;
mod database;
mod error;
mod health;
mod logging;
mod middleware;
mod services;

use crate::api::conversion::CurrencyApiState;
use crate::config::AppConfig;
use crate::database::conversion_log_repository::ConversionLogRepository;
use crate::database::currency_history_repository::CurrencyHistoryRepository;
use crate::logging::init_tracing;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::conversion::{ConversionConfig, ConversionService};
use crate::services::rate_resolver::RateResolver;
use axum::routing::get;
use axum::Router;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::info;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let app_config = AppConfig::from_env()?;
    app_config.validate()?;

    init_tracing(&app_config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "Starting Academix backend service"
    );

    info!("Initializing database connection pool...");
    let pool = database::init_pool_from_config(&app_config.database).await?;
    info!("Database connection pool initialized");

    let resolver = Arc::new(RateResolver::from_config(&app_config.fx)?);
    info!(
        primary = %app_config.fx.primary_url,
        secondary = %app_config.fx.secondary_url,
        "Exchange rate resolver initialized"
    );

    let conversions = Arc::new(
        ConversionService::new(pool.clone(), resolver.clone())
            .with_config(ConversionConfig::from_env()),
    );

    let currency_state = CurrencyApiState {
        conversions,
        resolver,
        logs: ConversionLogRepository::new(pool.clone()),
        histories: CurrencyHistoryRepository::new(pool.clone()),
    };

    let app = Router::new()
        .merge(api::router(currency_state))
        .merge(
            Router::new()
                .route("/health", get(health::health_handler))
                .with_state(pool.clone()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server address: {}", e))?;

    info!(%addr, "Academix backend listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Academix backend stopped");
    Ok(())
}

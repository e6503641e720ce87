//! # Storefront
//!
//! Order and payment service.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export DATABASE_URL=postgres://localhost/storefront
//! export AUTH_SECRET=...
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//!
//! # Run the server
//! storefront
//! ```

use shop_api::{routes, AppConfig, AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let (json, plain) = if config.log_json {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();

    if let Some(path) = config.config_file {
        info!("Loaded configuration from {}", path);
    }
    let addr = config.socket_addr()?;
    info!("Environment: {}", config.environment);
    info!("Store: {:?}, currency: {}", config.store, config.currency);
    if config.stripe.is_live_mode() && !config.is_production() {
        tracing::warn!("Live Stripe key in a non-production environment");
    }

    let state = AppState::from_config(&config).await?;
    let app = routes::create_router(state);

    info!("Storefront starting on http://{}", addr);
    if !config.is_production() {
        info!("Health: http://{}/health", addr);
        info!("Webhook: POST http://{}/api/webhook", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Storefront stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

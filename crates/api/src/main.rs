// API server clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! TrustList API Server
//!
//! The main API server for the TrustList business directory's
//! subscription engine: tier catalog, upgrade requests, trials,
//! payments and the admin review surface.

use std::net::SocketAddr;

use trustlist_shared::{create_migration_pool, create_pool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trustlist_api::{create_router, AppState, Config};
use trustlist_billing::BillingService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,trustlist_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting TrustList API Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    // Run migrations on a dedicated single connection
    let migration_pool = create_migration_pool(&config.database_url).await?;
    sqlx::migrate!("../../migrations").run(&migration_pool).await?;
    migration_pool.close().await;
    tracing::info!("Migrations applied");

    let billing = BillingService::from_env(pool.clone())?;
    if billing.email.is_enabled() {
        tracing::info!("Billing email notifications enabled");
    } else {
        tracing::warn!("Billing email notifications not configured (missing RESEND_API_KEY)");
    }
    tracing::info!("Billing service initialized");

    let state = AppState::new(pool, config.clone(), billing);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

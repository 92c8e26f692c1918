//! TrustList Background Worker
//!
//! Handles scheduled jobs around the subscription engine:
//! - Trial expiry sweep (daily at 2:00 UTC): downgrade expired trials
//!   back to basic and notify the owners
//! - Renewal reminder scan (daily at 3:00 UTC)

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use trustlist_billing::{BillingEmailService, TierCatalog, TrialService};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[derive(Debug, sqlx::FromRow)]
struct RenewalRow {
    id: Uuid,
    name: String,
    renewal_date: time::OffsetDateTime,
}

/// Log businesses whose paid subscription renews within three days
async fn scan_upcoming_renewals(pool: &PgPool) -> anyhow::Result<usize> {
    let upcoming: Vec<RenewalRow> = sqlx::query_as(
        r#"
        SELECT id, name, renewal_date
        FROM businesses
        WHERE subscription_status = 'active'
          AND renewal_date IS NOT NULL
          AND renewal_date BETWEEN NOW() AND NOW() + INTERVAL '3 days'
        "#,
    )
    .fetch_all(pool)
    .await?;

    for business in &upcoming {
        info!(
            business_id = %business.id,
            name = %business.name,
            renewal_date = %business.renewal_date,
            "Subscription renews within 3 days"
        );
    }

    Ok(upcoming.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting TrustList Worker");

    let pool = create_db_pool().await?;

    let email = BillingEmailService::from_env();
    if !email.is_enabled() {
        warn!("Email notifications not configured - trial expiry notices will be skipped");
    }
    let catalog = TierCatalog::from_env().into_shared();
    let trials = Arc::new(TrialService::new(pool.clone(), catalog, email));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Trial expiry sweep, daily at 2:00 UTC
    {
        let trials = trials.clone();
        scheduler
            .add(Job::new_async("0 0 2 * * *", move |_uuid, _l| {
                let trials = trials.clone();
                Box::pin(async move {
                    info!("Running trial expiry sweep");
                    match trials.process_expired_trials().await {
                        Ok(count) => info!(count = count, "Trial expiry sweep complete"),
                        Err(e) => error!(error = %e, "Trial expiry sweep failed"),
                    }
                })
            })?)
            .await?;
    }

    // Job 2: Renewal reminder scan, daily at 3:00 UTC
    {
        let pool = pool.clone();
        scheduler
            .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
                let pool = pool.clone();
                Box::pin(async move {
                    info!("Scanning upcoming renewals");
                    match scan_upcoming_renewals(&pool).await {
                        Ok(count) => info!(count = count, "Renewal scan complete"),
                        Err(e) => error!(error = %e, "Renewal scan failed"),
                    }
                })
            })?)
            .await?;
    }

    scheduler.start().await?;
    info!("Scheduler started");

    // Heartbeat keeps the process alive and visible in logs
    loop {
        tokio::time::sleep(Duration::from_secs(300)).await;
        info!("Worker heartbeat");
    }
}

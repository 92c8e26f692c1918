// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Integration tests for the tier upgrade and payment flows
//!
//! These tests exercise the full engine against a real Postgres
//! database, with the payment gateway mocked at the HTTP layer.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://localhost/trustlist_test"
//! cargo test -p trustlist-billing -- --ignored --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use trustlist_billing::{
    BillingError, BillingService, PaystackClient, PaystackConfig, TierCatalog,
};
use trustlist_shared::{
    BillingCycle, Business, PaymentStatus, RequestStatus, RequestType, SubscriptionStatus,
    SubscriptionTier, TierUpgradeRequest,
};

// ============================================================================
// Test Utilities
// ============================================================================

/// Connect to the test database and build a service against a mock gateway
async fn setup(gateway_url: &str) -> (BillingService, PgPool) {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    let config = PaystackConfig {
        secret_key: "sk_test_secret".to_string(),
        base_url: gateway_url.to_string(),
        callback_url: "https://example.test/callback".to_string(),
        timeout: Duration::from_secs(5),
    };
    let gateway = PaystackClient::new(config).expect("Failed to build gateway client");

    // Plan codes the payment initializer resolves for NGN subscriptions
    std::env::set_var("PAYSTACK_PLAN_VERIFIED_MONTHLY", "PLN_test_verified_m");
    std::env::set_var("PAYSTACK_PLAN_VERIFIED_ANNUAL", "PLN_test_verified_a");
    std::env::set_var("PAYSTACK_PLAN_PREMIUM_MONTHLY", "PLN_test_premium_m");
    std::env::set_var("PAYSTACK_PLAN_PREMIUM_ANNUAL", "PLN_test_premium_a");
    let catalog = Arc::new(TierCatalog::from_env());

    let billing = BillingService::with_parts(pool.clone(), catalog, gateway);
    (billing, pool)
}

/// Create a basic-tier test business with its owner
async fn create_test_business(pool: &PgPool) -> (Uuid, Uuid) {
    let business_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();
    let slug = format!("test-biz-{}", business_id.simple());

    sqlx::query(
        r#"
        INSERT INTO businesses
            (id, owner_id, name, slug, email, subscription_tier, subscription_status,
             is_trialing, currency, features)
        VALUES ($1, $2, 'Test Business', $3, $4, 'basic', 'inactive', false, 'NGN', '{}')
        "#,
    )
    .bind(business_id)
    .bind(owner_id)
    .bind(&slug)
    .bind(format!("owner-{}@example.test", business_id.simple()))
    .execute(pool)
    .await
    .expect("Failed to create test business");

    (business_id, owner_id)
}

/// Cleanup test data after test completion
async fn cleanup(pool: &PgPool, business_id: Uuid) {
    // Delete in order to respect foreign key constraints
    for query in [
        "DELETE FROM payments WHERE business_id = $1",
        "DELETE FROM tier_upgrade_requests WHERE business_id = $1",
        "DELETE FROM billing_events WHERE business_id = $1",
        "DELETE FROM tier_change_audit WHERE business_id = $1",
        "DELETE FROM trial_history WHERE business_id = $1",
        "DELETE FROM businesses WHERE id = $1",
    ] {
        sqlx::query(query)
            .bind(business_id)
            .execute(pool)
            .await
            .ok(); // Ignore errors during cleanup
    }
}

async fn fetch_business(pool: &PgPool, business_id: Uuid) -> Business {
    sqlx::query_as("SELECT * FROM businesses WHERE id = $1")
        .bind(business_id)
        .fetch_one(pool)
        .await
        .expect("Failed to fetch business")
}

async fn fetch_request(pool: &PgPool, request_id: Uuid) -> TierUpgradeRequest {
    sqlx::query_as("SELECT * FROM tier_upgrade_requests WHERE id = $1")
        .bind(request_id)
        .fetch_one(pool)
        .await
        .expect("Failed to fetch request")
}

async fn mock_verify_success(server: &mut mockito::Server, reference: &str) -> mockito::Mock {
    server
        .mock(
            "GET",
            format!("/transaction/verify/{reference}").as_str(),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{
                "status": true,
                "data": {{
                    "status": "success",
                    "reference": "{reference}",
                    "amount": 1500000,
                    "currency": "NGN",
                    "channel": "card",
                    "id": 424242,
                    "gateway_response": "Successful"
                }}
            }}"#
        ))
        .create_async()
        .await
}

async fn mock_initialize(server: &mut mockito::Server) -> mockito::Mock {
    server
        .mock("POST", "/transaction/initialize")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "status": true,
                "data": {
                    "authorization_url": "https://checkout.example.test/x",
                    "access_code": "access_x",
                    "reference": "ignored-by-client"
                }
            }"#,
        )
        .create_async()
        .await
}

// ============================================================================
// Scenario A: trial activation
// ============================================================================

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_trial_activation_sets_trialing_state() {
    let server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;

    let business = billing
        .trials
        .start_trial(business_id, owner_id, SubscriptionTier::Verified, 30)
        .await
        .expect("Trial activation failed");

    assert_eq!(business.subscription_tier, SubscriptionTier::Verified);
    assert_eq!(business.subscription_status, SubscriptionStatus::Trialing);
    assert!(business.is_trialing);
    let trial_ends_at = business.trial_ends_at.expect("trial end date must be set");
    let days_out = (trial_ends_at - time::OffsetDateTime::now_utc()).whole_days();
    assert!((29..=30).contains(&days_out), "trial should end ~30 days out");

    // Features were recomputed for the new tier
    assert_eq!(business.features["can_respond_to_reviews"], true);
    assert_eq!(business.features["verified_badge"], true);

    // A second trial for the same tier is refused
    let err = billing
        .trials
        .start_trial(business_id, owner_id, SubscriptionTier::Verified, 30)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::TrialAlreadyUsed(_)));

    cleanup(&pool, business_id).await;
}

// ============================================================================
// Scenario B: payment flow with idempotent verification
// ============================================================================

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_payment_flow_upgrades_once_and_replays_cached() {
    let mut server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;

    let request = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Premium,
            request_type: RequestType::Payment,
            billing_cycle: Some(BillingCycle::Monthly),
            business_notes: None,
            trial_days: None,
        })
        .await
        .expect("Request creation failed");

    assert_eq!(request.amount, 1_500_000); // snapshotted from the catalog

    let _init_mock = mock_initialize(&mut server).await;
    let init = billing
        .payments
        .initialize(request.id, owner_id)
        .await
        .expect("Payment initialization failed");
    assert!(init.reference.starts_with("TIER-"));

    let _verify_mock = mock_verify_success(&mut server, &init.reference).await;

    // First verification commits the upgrade
    let first = billing
        .payments
        .verify(&init.reference)
        .await
        .expect("Verification failed");
    assert_eq!(first.status, PaymentStatus::Success);
    assert!(!first.already_processed);

    let business = fetch_business(&pool, business_id).await;
    assert_eq!(business.subscription_tier, SubscriptionTier::Premium);
    assert_eq!(business.subscription_status, SubscriptionStatus::Active);
    assert!(business.renewal_date.is_some());

    let request = fetch_request(&pool, request.id).await;
    assert_eq!(request.status, RequestStatus::Approved);

    // Second verification replays the cached outcome without mutation
    let version_before = business.tier_version;
    let second = billing
        .payments
        .verify(&init.reference)
        .await
        .expect("Replay verification failed");
    assert_eq!(second.status, PaymentStatus::Success);
    assert!(second.already_processed);

    let business = fetch_business(&pool, business_id).await;
    assert_eq!(business.subscription_tier, SubscriptionTier::Premium);
    assert_eq!(business.tier_version, version_before, "replay must not mutate");

    cleanup(&pool, business_id).await;
}

// ============================================================================
// Scenario C: admin rejection
// ============================================================================

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_rejection_records_reason_and_leaves_tier() {
    let server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;
    let admin_id = Uuid::new_v4();

    let request = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Verified,
            request_type: RequestType::Trial,
            billing_cycle: None,
            business_notes: None,
            trial_days: Some(30),
        })
        .await
        .expect("Request creation failed");

    let rejected = billing
        .requests
        .reject(request.id, admin_id, "insufficient proof", None)
        .await
        .expect("Rejection failed");

    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("insufficient proof"));
    assert_eq!(rejected.reviewed_by, Some(admin_id));

    let business = fetch_business(&pool, business_id).await;
    assert_eq!(business.subscription_tier, SubscriptionTier::Basic);

    // Empty reasons are refused outright
    let request2 = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Verified,
            request_type: RequestType::Trial,
            billing_cycle: None,
            business_notes: None,
            trial_days: Some(30),
        })
        .await
        .expect("Second request creation failed");
    let err = billing
        .requests
        .reject(request2.id, admin_id, "   ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::EmptyRejectionReason));

    cleanup(&pool, business_id).await;
}

// ============================================================================
// Scenario D: duplicate pending requests
// ============================================================================

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_second_pending_request_is_rejected() {
    let server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;

    let first = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Verified,
            request_type: RequestType::Trial,
            billing_cycle: None,
            business_notes: None,
            trial_days: Some(30),
        })
        .await
        .expect("First request creation failed");

    let err = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Premium,
            request_type: RequestType::Payment,
            billing_cycle: Some(BillingCycle::Monthly),
            business_notes: None,
            trial_days: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::DuplicatePendingRequest));

    // Original request untouched
    let request = fetch_request(&pool, first.id).await;
    assert_eq!(request.status, RequestStatus::Pending);

    cleanup(&pool, business_id).await;
}

// ============================================================================
// Resolution is exclusive: approve wins once, later calls conflict
// ============================================================================

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_resolution_happens_exactly_once() {
    let server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;
    let admin_id = Uuid::new_v4();

    let request = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Verified,
            request_type: RequestType::Trial,
            billing_cycle: None,
            business_notes: None,
            trial_days: Some(14),
        })
        .await
        .expect("Request creation failed");

    billing
        .requests
        .approve(request.id, admin_id, Some("manual grant".to_string()))
        .await
        .expect("Approval failed");

    let business = fetch_business(&pool, business_id).await;
    assert_eq!(business.subscription_tier, SubscriptionTier::Verified);
    assert_eq!(business.subscription_status, SubscriptionStatus::Trialing);

    // Every later resolution attempt loses with a conflict
    let err = billing
        .requests
        .approve(request.id, admin_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::AlreadyResolved { .. }));

    let err = billing
        .requests
        .reject(request.id, admin_id, "too late", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BillingError::AlreadyResolved {
            current: RequestStatus::Approved
        }
    ));

    let err = billing.requests.cancel(request.id, owner_id).await.unwrap_err();
    assert!(matches!(err, BillingError::AlreadyResolved { .. }));

    cleanup(&pool, business_id).await;
}

// ============================================================================
// Authorization edges
// ============================================================================

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_non_owner_cannot_cancel() {
    let server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;
    let stranger = Uuid::new_v4();

    let request = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Verified,
            request_type: RequestType::Trial,
            billing_cycle: None,
            business_notes: None,
            trial_days: Some(30),
        })
        .await
        .expect("Request creation failed");

    let err = billing.requests.cancel(request.id, stranger).await.unwrap_err();
    assert!(matches!(err, BillingError::Forbidden));

    let request = fetch_request(&pool, request.id).await;
    assert_eq!(request.status, RequestStatus::Pending);

    cleanup(&pool, business_id).await;
}

// ============================================================================
// Validation edges
// ============================================================================

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_enterprise_payment_request_fails_at_creation() {
    let server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;

    let err = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Enterprise,
            request_type: RequestType::Payment,
            billing_cycle: Some(BillingCycle::Monthly),
            business_notes: None,
            trial_days: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::NoPriceForCycle { .. }));

    cleanup(&pool, business_id).await;
}

// ============================================================================
// Trial expiry sweep
// ============================================================================

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_expiry_sweep_downgrades_only_overdue_trials() {
    let server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;

    billing
        .trials
        .start_trial(business_id, owner_id, SubscriptionTier::Verified, 30)
        .await
        .expect("Trial activation failed");

    // A sweep with 30 days left must not touch the business
    billing
        .trials
        .process_expired_trials()
        .await
        .expect("Sweep failed");
    let business = fetch_business(&pool, business_id).await;
    assert_eq!(business.subscription_tier, SubscriptionTier::Verified);

    // Force the trial into the past, then sweep again
    sqlx::query("UPDATE businesses SET trial_ends_at = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(business_id)
        .execute(&pool)
        .await
        .expect("Failed to backdate trial");

    let processed = billing
        .trials
        .process_expired_trials()
        .await
        .expect("Sweep failed");
    assert!(processed >= 1);

    let business = fetch_business(&pool, business_id).await;
    assert_eq!(business.subscription_tier, SubscriptionTier::Basic);
    assert_eq!(business.subscription_status, SubscriptionStatus::Inactive);
    assert!(!business.is_trialing);
    assert_eq!(business.features["can_respond_to_reviews"], false);

    cleanup(&pool, business_id).await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_same_or_lower_tier_request_is_invalid() {
    let server = mockito::Server::new_async().await;
    let (billing, pool) = setup(&server.url()).await;
    let (business_id, owner_id) = create_test_business(&pool).await;

    sqlx::query("UPDATE businesses SET subscription_tier = 'premium' WHERE id = $1")
        .bind(business_id)
        .execute(&pool)
        .await
        .expect("Failed to seed tier");

    let err = billing
        .requests
        .create(trustlist_billing::CreateUpgradeRequest {
            business_id,
            actor_id: owner_id,
            requested_tier: SubscriptionTier::Verified,
            request_type: RequestType::Trial,
            billing_cycle: None,
            business_notes: None,
            trial_days: Some(30),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidTransition { .. }));

    cleanup(&pool, business_id).await;
}

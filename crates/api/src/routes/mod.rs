//! Route registration

pub mod admin_tiers;
pub mod payments;
pub mod subscriptions;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{require_admin, require_auth};
use crate::state::AppState;

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Owner-facing, authenticated
    let subscription_routes = Router::new()
        .route("/my-subscription", get(subscriptions::my_subscription))
        .route("/start-trial", post(subscriptions::start_trial))
        .route("/request-upgrade", post(subscriptions::request_upgrade))
        .route("/my-upgrade-requests", get(subscriptions::my_upgrade_requests))
        .route(
            "/cancel-upgrade-request",
            post(subscriptions::cancel_upgrade_request),
        )
        .route("/cancel", post(subscriptions::cancel_subscription))
        .route("/features", get(subscriptions::current_features))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));

    // Catalog is public: the pricing page renders before login
    let public_subscription_routes =
        Router::new().route("/plans", get(subscriptions::list_plans));

    let payment_routes = Router::new()
        .route("/initialize", post(payments::initialize_payment))
        .route("/verify/{reference}", get(payments::verify_payment))
        .route("/details/{reference}", get(payments::payment_details))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));

    // The gateway signs its own deliveries; no bearer auth
    let webhook_routes = Router::new().route("/webhook", post(payments::gateway_webhook));

    let admin_routes = Router::new()
        .route("/requests", get(admin_tiers::list_requests))
        .route("/requests/{id}/approve", post(admin_tiers::approve_request))
        .route("/requests/{id}/reject", post(admin_tiers::reject_request))
        .route("/stats", get(admin_tiers::request_stats))
        .route(
            "/businesses/{id}/change",
            post(admin_tiers::manual_tier_change),
        )
        .route("/invariants", get(admin_tiers::run_invariants))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    let allowed_origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .nest(
            "/api/subscriptions",
            public_subscription_routes.merge(subscription_routes),
        )
        .nest("/api/payments", payment_routes.merge(webhook_routes))
        .nest("/api/admin/tiers", admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

//! Owner-facing subscription routes

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trustlist_billing::{CreateUpgradeRequest, FeatureSet, TierListing};
use trustlist_shared::{
    BillingCycle, Business, Currency, Payment, RequestType, SubscriptionTier, TierUpgradeRequest,
};

use crate::{auth::AuthUser, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PlansQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<TierListing>,
    pub currency: Currency,
}

/// List the tier catalog for presentation
pub async fn list_plans(
    State(state): State<AppState>,
    Query(query): Query<PlansQuery>,
) -> Result<Json<PlansResponse>, ApiError> {
    let currency = match query.currency.as_deref() {
        Some(raw) => raw.parse::<Currency>().map_err(ApiError::BadRequest)?,
        None => Currency::Ngn,
    };

    Ok(Json(PlansResponse {
        plans: state.billing.catalog.list(currency),
        currency,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BusinessQuery {
    pub business_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MySubscriptionResponse {
    pub business: Business,
    pub payments: Vec<Payment>,
}

/// Current subscription state plus recent payment history
pub async fn my_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<BusinessQuery>,
) -> Result<Json<MySubscriptionResponse>, ApiError> {
    let business = load_owned_business(&state, query.business_id, auth_user.user_id).await?;
    let payments = state
        .billing
        .payments
        .list_for_business(business.id, 10)
        .await?;

    Ok(Json(MySubscriptionResponse { business, payments }))
}

#[derive(Debug, Deserialize)]
pub struct StartTrialRequest {
    pub business_id: Uuid,
    #[serde(default = "default_trial_tier")]
    pub tier: SubscriptionTier,
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,
}

fn default_trial_tier() -> SubscriptionTier {
    SubscriptionTier::Verified
}

fn default_trial_days() -> i64 {
    trustlist_billing::DEFAULT_TRIAL_DAYS
}

#[derive(Debug, Serialize)]
pub struct BusinessResponse {
    pub business: Business,
}

/// Start a free trial; resolves immediately, no request or payment
pub async fn start_trial(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<StartTrialRequest>,
) -> Result<Json<BusinessResponse>, ApiError> {
    let business = state
        .billing
        .trials
        .start_trial(req.business_id, auth_user.user_id, req.tier, req.trial_days)
        .await?;

    Ok(Json(BusinessResponse { business }))
}

#[derive(Debug, Deserialize)]
pub struct RequestUpgradeRequest {
    pub business_id: Uuid,
    pub requested_tier: SubscriptionTier,
    pub request_type: RequestType,
    pub billing_cycle: Option<BillingCycle>,
    pub business_notes: Option<String>,
    pub trial_days: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct UpgradeRequestResponse {
    pub request: TierUpgradeRequest,
}

/// Create a tier upgrade request
pub async fn request_upgrade(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<RequestUpgradeRequest>,
) -> Result<Json<UpgradeRequestResponse>, ApiError> {
    // The manual type is reserved for admin-recorded changes
    if req.request_type == RequestType::Manual {
        return Err(ApiError::BadRequest(
            "request_type must be 'trial' or 'payment'".to_string(),
        ));
    }

    let request = state
        .billing
        .requests
        .create(CreateUpgradeRequest {
            business_id: req.business_id,
            actor_id: auth_user.user_id,
            requested_tier: req.requested_tier,
            request_type: req.request_type,
            billing_cycle: req.billing_cycle,
            business_notes: req.business_notes,
            trial_days: req.trial_days,
        })
        .await?;

    Ok(Json(UpgradeRequestResponse { request }))
}

#[derive(Debug, Serialize)]
pub struct UpgradeRequestListResponse {
    pub requests: Vec<TierUpgradeRequest>,
}

/// All upgrade requests for one of the caller's businesses
pub async fn my_upgrade_requests(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<BusinessQuery>,
) -> Result<Json<UpgradeRequestListResponse>, ApiError> {
    let business = load_owned_business(&state, query.business_id, auth_user.user_id).await?;
    let requests = state
        .billing
        .requests
        .list_for_business(business.id)
        .await?;

    Ok(Json(UpgradeRequestListResponse { requests }))
}

#[derive(Debug, Deserialize)]
pub struct CancelUpgradeRequest {
    pub request_id: Uuid,
}

/// Cancel a pending upgrade request
pub async fn cancel_upgrade_request(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CancelUpgradeRequest>,
) -> Result<Json<UpgradeRequestResponse>, ApiError> {
    let request = state
        .billing
        .requests
        .cancel(req.request_id, auth_user.user_id)
        .await?;

    Ok(Json(UpgradeRequestResponse { request }))
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    pub business_id: Uuid,
    pub reason: Option<String>,
}

/// Cancel the subscription: back to basic immediately
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CancelSubscriptionRequest>,
) -> Result<Json<BusinessResponse>, ApiError> {
    let business = state
        .billing
        .requests
        .cancel_subscription(req.business_id, auth_user.user_id, req.reason)
        .await?;

    Ok(Json(BusinessResponse { business }))
}

#[derive(Debug, Serialize)]
pub struct FeaturesResponse {
    pub features: FeatureSet,
}

/// Current capability set for a business, recomputed from its tier
pub async fn current_features(
    State(state): State<AppState>,
    Query(query): Query<BusinessQuery>,
) -> Result<Json<FeaturesResponse>, ApiError> {
    let features = trustlist_billing::current_features(&state.pool, query.business_id).await?;
    Ok(Json(FeaturesResponse { features }))
}

/// Load a business and verify the caller owns it
async fn load_owned_business(
    state: &AppState,
    business_id: Uuid,
    user_id: Uuid,
) -> Result<Business, ApiError> {
    let business: Option<Business> = sqlx::query_as("SELECT * FROM businesses WHERE id = $1")
        .bind(business_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?;

    let business =
        business.ok_or_else(|| ApiError::NotFound(format!("Business {business_id}")))?;
    if business.owner_id != user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(business)
}

//! Admin back-office routes for tier management

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trustlist_billing::{InvariantCheckSummary, RequestFilter, RequestStats};
use trustlist_shared::{
    Business, PaginatedResponse, RequestStatus, SubscriptionTier, TierUpgradeRequest,
};

use crate::{auth::AuthUser, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
    pub tier: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Filtered, paginated view of upgrade requests
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<PaginatedResponse<TierUpgradeRequest>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<RequestStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let requested_tier = query
        .tier
        .as_deref()
        .map(|s| s.parse::<SubscriptionTier>())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let page = state
        .billing
        .requests
        .list_admin(RequestFilter {
            status,
            requested_tier,
            page: query.page,
            per_page: query.per_page,
        })
        .await?;

    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub request: TierUpgradeRequest,
}

/// Approve a pending request and commit the tier transition
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<RequestResponse>, ApiError> {
    let request = state
        .billing
        .requests
        .approve(request_id, auth_user.user_id, req.notes)
        .await?;

    Ok(Json(RequestResponse { request }))
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
    pub notes: Option<String>,
}

/// Reject a pending request with a mandatory reason
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<RequestResponse>, ApiError> {
    let request = state
        .billing
        .requests
        .reject(request_id, auth_user.user_id, &req.reason, req.notes)
        .await?;

    Ok(Json(RequestResponse { request }))
}

/// Request counts for the admin dashboard
pub async fn request_stats(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> Result<Json<RequestStats>, ApiError> {
    let stats = state.billing.requests.stats().await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct ManualChangeRequest {
    pub new_tier: SubscriptionTier,
    pub reason: String,
    /// Days until the change expires; omitted = permanent
    pub duration_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BusinessResponse {
    pub business: Business,
}

/// Directly change a business's tier, in either direction
pub async fn manual_tier_change(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(business_id): Path<Uuid>,
    Json(req): Json<ManualChangeRequest>,
) -> Result<Json<BusinessResponse>, ApiError> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "a reason is required for manual tier changes".to_string(),
        ));
    }

    let business = state
        .billing
        .requests
        .manual_change(
            business_id,
            req.new_tier,
            auth_user.user_id,
            &req.reason,
            req.duration_days,
        )
        .await?;

    Ok(Json(BusinessResponse { business }))
}

/// Run the billing consistency checks
pub async fn run_invariants(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
) -> Result<Json<InvariantCheckSummary>, ApiError> {
    let summary = state.billing.invariants.run_all_checks().await?;
    Ok(Json(summary))
}

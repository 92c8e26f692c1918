//! Payment routes: initialization, verification, gateway webhook

use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trustlist_billing::{PaymentInit, VerifyOutcome, WebhookOutcome};
use trustlist_shared::Payment;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub request_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct InitializePaymentResponse {
    #[serde(flatten)]
    pub payment: PaymentInit,
}

/// Initialize a gateway transaction for a pending payment request
pub async fn initialize_payment(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<InitializePaymentRequest>,
) -> Result<Json<InitializePaymentResponse>, ApiError> {
    let payment = state
        .billing
        .payments
        .initialize(req.request_id, auth_user.user_id)
        .await?;

    Ok(Json(InitializePaymentResponse { payment }))
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    #[serde(flatten)]
    pub outcome: VerifyOutcome,
}

/// Verify a payment by reference
///
/// Safe to call repeatedly; replays return the cached outcome with
/// `already_processed = true`.
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Path(reference): Path<String>,
) -> Result<Json<VerifyPaymentResponse>, ApiError> {
    let outcome = state.billing.payments.verify(&reference).await?;
    Ok(Json(VerifyPaymentResponse { outcome }))
}

#[derive(Debug, Serialize)]
pub struct PaymentDetailsResponse {
    pub payment: Payment,
}

/// Payment record lookup by reference
pub async fn payment_details(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentDetailsResponse>, ApiError> {
    let payment = state.billing.payments.details(&reference).await?;
    Ok(Json(PaymentDetailsResponse { payment }))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub outcome: WebhookOutcome,
}

/// Gateway webhook endpoint
///
/// Takes the raw body so the signature covers exactly the bytes the
/// gateway signed. Unsigned or tampered deliveries are rejected before
/// any parsing.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get("x-paystack-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Webhook delivery without signature header");
            ApiError::Unauthorized
        })?;

    let event = state.billing.webhooks.verify_event(&body, signature)?;
    let outcome = state
        .billing
        .webhooks
        .handle_event(event, &state.billing.payments)
        .await?;

    Ok(Json(WebhookResponse { outcome }))
}

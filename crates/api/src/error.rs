//! API error type and HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use trustlist_billing::BillingError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Billing(#[from] BillingError),
}

impl ApiError {
    /// HTTP status plus a stable machine-readable error code
    fn status_and_code(&self) -> (StatusCode, &'static str, bool) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", false),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", false),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", false),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict", false),
            ApiError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error", true),
            ApiError::Database(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", false)
            }
            ApiError::Billing(e) => match e {
                // Validation: rejected synchronously, no state change
                BillingError::InvalidTier(_)
                | BillingError::InvalidTransition { .. }
                | BillingError::NoPriceForCycle { .. }
                | BillingError::NoPlanCode { .. }
                | BillingError::EmptyRejectionReason
                | BillingError::TierNotTrialEligible(_)
                | BillingError::InvalidBillingCycle(_) => {
                    (StatusCode::BAD_REQUEST, "validation_failed", false)
                }
                BillingError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", false),
                BillingError::BusinessNotFound(_)
                | BillingError::RequestNotFound(_)
                | BillingError::UnknownReference(_) => {
                    (StatusCode::NOT_FOUND, "not_found", false)
                }
                // Conflicts carry the authoritative state for reconciliation
                BillingError::DuplicatePendingRequest
                | BillingError::AlreadyResolved { .. }
                | BillingError::Conflict(_)
                | BillingError::TrialAlreadyUsed(_)
                | BillingError::AlreadySubscribed
                | BillingError::PaymentNotCompleted => {
                    (StatusCode::CONFLICT, "conflict", false)
                }
                BillingError::ConcurrentModification(_) => {
                    (StatusCode::CONFLICT, "conflict", true)
                }
                // External failures are retryable; nothing was assumed done
                BillingError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error", true),
                BillingError::GatewayPending(_) => {
                    (StatusCode::CONFLICT, "payment_not_confirmed", true)
                }
                BillingError::WebhookSignatureInvalid => {
                    (StatusCode::UNAUTHORIZED, "invalid_signature", false)
                }
                BillingError::Database(_) | BillingError::Config(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", false)
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = self.status_and_code();

        // Internal details stay in the logs, not the response body
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error serving request");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "success": false,
            "error": code,
            "message": message,
            "retryable": retryable,
        });

        (status, Json(body)).into_response()
    }
}

//! Billing error taxonomy
//!
//! Four families of failure, mapped to distinct HTTP classes by the API
//! crate: validation (rejected synchronously, no state change),
//! authorization, conflict (the caller receives the current
//! authoritative state), and external gateway failures (retryable,
//! nothing assumed succeeded).

use trustlist_shared::{RequestStatus, SubscriptionTier};

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    // -- Validation ----------------------------------------------------------
    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    #[error("Cannot move from {from} to {to}: requested tier must outrank the current tier")]
    InvalidTransition {
        from: SubscriptionTier,
        to: SubscriptionTier,
    },

    #[error("No self-serve price for {tier} ({currency}/{cycle})")]
    NoPriceForCycle {
        tier: SubscriptionTier,
        currency: String,
        cycle: String,
    },

    #[error("No gateway plan code for {tier} ({currency}/{cycle})")]
    NoPlanCode {
        tier: SubscriptionTier,
        currency: String,
        cycle: String,
    },

    #[error("A rejection reason is required")]
    EmptyRejectionReason,

    #[error("Tier {0} is not eligible for trials")]
    TierNotTrialEligible(SubscriptionTier),

    #[error("Invalid billing cycle: {0}")]
    InvalidBillingCycle(String),

    // -- Authorization -------------------------------------------------------
    #[error("Actor is not allowed to perform this operation")]
    Forbidden,

    // -- Not found -----------------------------------------------------------
    #[error("Business {0} not found")]
    BusinessNotFound(String),

    #[error("Upgrade request {0} not found")]
    RequestNotFound(String),

    #[error("Unknown payment reference: {0}")]
    UnknownReference(String),

    // -- Conflict ------------------------------------------------------------
    #[error("Business already has a pending upgrade request")]
    DuplicatePendingRequest,

    #[error("Request already resolved (current status: {current})")]
    AlreadyResolved { current: RequestStatus },

    #[error("Conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("Trial already used for tier {0}")]
    TrialAlreadyUsed(SubscriptionTier),

    #[error("Business already has an active subscription")]
    AlreadySubscribed,

    #[error("Payment for this request has not completed")]
    PaymentNotCompleted,

    #[error("Record was modified by another process: {0}")]
    ConcurrentModification(String),

    // -- External ------------------------------------------------------------
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// The gateway has not (yet) confirmed the transaction either way.
    /// Retryable; the payment stays `initialized`.
    #[error("Payment not yet confirmed by gateway (status: {0})")]
    GatewayPending(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    // -- Infrastructure ------------------------------------------------------
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl BillingError {
    /// Whether a caller may retry the same call and expect progress
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::Gateway(_)
                | BillingError::GatewayPending(_)
                | BillingError::ConcurrentModification(_)
        )
    }
}

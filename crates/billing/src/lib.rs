// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::result_large_err)] // BillingError carries authoritative state for conflicts
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! TrustList Billing Module
//!
//! The subscription tier upgrade and payment reconciliation engine.
//!
//! ## Features
//!
//! - **Tier Catalog**: Ordered tier definitions with per-currency price tables
//! - **Feature Gate**: Pure tier-to-capability mapping for gated operations
//! - **Upgrade Requests**: Pending/approved/rejected/cancelled lifecycle with
//!   compare-and-set transitions
//! - **Trials**: Time-boxed tier grants without payment
//! - **Payments**: Gateway transaction initialization and idempotent
//!   verification committing the tier transition
//! - **Webhooks**: Signed gateway event handling with atomic claims
//! - **Audit**: Append-only billing events and tier change audit rows
//! - **Invariants**: Runnable consistency checks over the whole engine

pub mod catalog;
pub mod email;
pub mod error;
pub mod events;
pub mod features;
pub mod invariants;
pub mod payments;
pub mod paystack;
pub mod requests;
pub mod trial;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Catalog
pub use catalog::{PlanCodes, PriceTable, TierCatalog, TierListing, TierPlan};

// Email
pub use email::{BillingEmailService, EmailConfig};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

// Features
pub use features::{current_features, FeatureSet};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Payments
pub use payments::{PaymentInit, PaymentService, VerifyOutcome};

// Paystack gateway
pub use paystack::{
    GatewayTxStatus, InitializeTransaction, PaystackClient, PaystackConfig,
    TransactionAuthorization, VerifiedTransaction,
};

// Requests
pub use requests::{
    CreateUpgradeRequest, RequestFilter, RequestStats, TierChangeSource, UpgradeRequestService,
};

// Trials
pub use trial::{TrialService, DEFAULT_TRIAL_DAYS, MAX_TRIAL_DAYS};

// Webhooks
pub use webhooks::{WebhookEvent, WebhookEventData, WebhookHandler, WebhookOutcome};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub catalog: Arc<TierCatalog>,
    pub email: BillingEmailService,
    pub requests: UpgradeRequestService,
    pub trials: TrialService,
    pub payments: PaymentService,
    pub webhooks: WebhookHandler,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let gateway = PaystackClient::from_env()?;
        let catalog = TierCatalog::from_env().into_shared();
        Ok(Self::with_parts(pool, catalog, gateway))
    }

    /// Create a new billing service with explicit config
    pub fn new(pool: PgPool, config: PaystackConfig) -> BillingResult<Self> {
        let gateway = PaystackClient::new(config)?;
        let catalog = TierCatalog::from_env().into_shared();
        Ok(Self::with_parts(pool, catalog, gateway))
    }

    /// Assemble from an injected catalog and gateway client (tests use
    /// this with a mock gateway endpoint)
    pub fn with_parts(pool: PgPool, catalog: Arc<TierCatalog>, gateway: PaystackClient) -> Self {
        let email = BillingEmailService::from_env();
        let webhook_secret = gateway.config().secret_key.clone();

        Self {
            requests: UpgradeRequestService::new(pool.clone(), catalog.clone(), email.clone()),
            trials: TrialService::new(pool.clone(), catalog.clone(), email.clone()),
            payments: PaymentService::new(pool.clone(), catalog.clone(), gateway, email.clone()),
            webhooks: WebhookHandler::new(pool.clone(), webhook_secret),
            invariants: InvariantChecker::new(pool),
            catalog,
            email,
        }
    }
}

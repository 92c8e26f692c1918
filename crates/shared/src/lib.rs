// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! TrustList Shared Types
//!
//! Domain types used across the TrustList crates: the ranked
//! subscription tier enum, request/payment status enums, database row
//! models, and pool constructors.

pub mod db;
pub mod types;

pub use db::{create_migration_pool, create_pool};
pub use types::{
    AdminUserId, BillingCycle, Business, BusinessId, BusinessUserId, Currency, PaginatedResponse,
    Payment, PaymentStatus, RequestPaymentStatus, RequestStatus, RequestType, SubscriptionStatus,
    SubscriptionTier, TierUpgradeRequest, UpgradeRequestId,
};

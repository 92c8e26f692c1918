//! Common types used across TrustList

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Business ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessId(pub Uuid);

impl BusinessId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BusinessId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BusinessId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Business user (owner/manager account) ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessUserId(pub Uuid);

impl BusinessUserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BusinessUserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BusinessUserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Admin user ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminUserId(pub Uuid);

impl AdminUserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AdminUserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AdminUserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Tier upgrade request ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpgradeRequestId(pub Uuid);

impl UpgradeRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UpgradeRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UpgradeRequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Subscription tier for a business listing
///
/// Tiers form a total order (`rank`) used to validate that a requested
/// change is an upgrade: basic < verified < premium < enterprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Basic,
    Verified,
    Premium,
    Enterprise,
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        Self::Basic
    }
}

impl SubscriptionTier {
    /// All tiers in ascending rank order
    pub const ALL: [SubscriptionTier; 4] = [
        Self::Basic,
        Self::Verified,
        Self::Premium,
        Self::Enterprise,
    ];

    /// Integer rank used for upgrade validation (higher = more features)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Basic => 0,
            Self::Verified => 1,
            Self::Premium => 2,
            Self::Enterprise => 3,
        }
    }

    /// Whether `self` strictly outranks `other`
    pub fn outranks(&self, other: SubscriptionTier) -> bool {
        self.rank() > other.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Verified => "verified",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "verified" => Ok(Self::Verified),
            "premium" => Ok(Self::Premium),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid subscription tier: {}", s)),
        }
    }
}

/// Subscription status of a business
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Inactive,
    Trialing,
    Active,
    PastDue,
    Cancelled,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Inactive
    }
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing cycle for paid subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Annual,
}

impl Default for BillingCycle {
    fn default() -> Self {
        Self::Monthly
    }
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "annual" => Ok(Self::Annual),
            _ => Err(format!("Invalid billing cycle: {}", s)),
        }
    }
}

/// Supported settlement currencies
///
/// Prices are stored in minor units (kobo for NGN, cents for USD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Ngn,
    Usd,
}

impl Default for Currency {
    fn default() -> Self {
        Self::Ngn
    }
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ngn => "NGN",
            Self::Usd => "USD",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NGN" => Ok(Self::Ngn),
            "USD" => Ok(Self::Usd),
            _ => Err(format!("Invalid currency: {}", s)),
        }
    }
}

/// How an upgrade request is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    /// Time-boxed tier grant without payment
    Trial,
    /// Resolved through a gateway transaction
    Payment,
    /// Admin-initiated direct change, recorded for audit
    Manual,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Payment => "payment",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trial" => Ok(Self::Trial),
            "payment" => Ok(Self::Payment),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid request type: {}", s)),
        }
    }
}

/// Lifecycle status of an upgrade request
///
/// A request is resolved exactly once; resolved rows are immutable
/// history and are never deleted or reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl Default for RequestStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl RequestStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// Payment progress tracked on the upgrade request itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestPaymentStatus {
    None,
    Pending,
    Success,
    Failed,
}

impl Default for RequestPaymentStatus {
    fn default() -> Self {
        Self::None
    }
}

impl RequestPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RequestPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single gateway transaction
///
/// The terminal status is set exactly once together with
/// `processed_at`; that write is the idempotency boundary of the
/// payment engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Initialized,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initialized" => Ok(Self::Initialized),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Business listing model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Business {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub slug: String,
    pub email: String,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub is_trialing: bool,
    pub trial_ends_at: Option<OffsetDateTime>,
    pub subscription_started_at: Option<OffsetDateTime>,
    pub renewal_date: Option<OffsetDateTime>,
    pub currency: Currency,
    /// Capability snapshot, recomputed at every tier transition.
    /// Presentation cache only; authoritative reads recompute from the tier.
    pub features: serde_json::Value,
    pub is_verified: bool,
    pub verified_at: Option<OffsetDateTime>,
    pub last_payment_at: Option<OffsetDateTime>,
    pub last_payment_amount: Option<i64>,
    /// Optimistic-lock version, bumped on every tier transition
    pub tier_version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Tier upgrade request model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TierUpgradeRequest {
    pub id: Uuid,
    pub business_id: Uuid,
    pub business_user_id: Option<Uuid>,
    pub current_tier: SubscriptionTier,
    pub requested_tier: SubscriptionTier,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub payment_status: RequestPaymentStatus,
    pub payment_reference: Option<String>,
    /// Amount in minor units, resolved from the catalog at creation time
    pub amount: i64,
    pub currency: Currency,
    pub billing_cycle: BillingCycle,
    pub trial_days: Option<i32>,
    pub business_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TierUpgradeRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// A payment-type request can only be approved once its payment succeeded
    pub fn can_be_approved(&self) -> bool {
        if self.status != RequestStatus::Pending {
            return false;
        }
        if self.request_type == RequestType::Payment
            && self.payment_status != RequestPaymentStatus::Success
        {
            return false;
        }
        true
    }
}

/// Gateway payment model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    /// Unique gateway reference, the identity of the transaction
    pub reference: String,
    pub upgrade_request_id: Uuid,
    pub business_id: Uuid,
    pub amount: i64,
    pub currency: Currency,
    pub status: PaymentStatus,
    /// The gateway's own transaction reference, echoed on verification
    pub gateway_reference: Option<String>,
    pub channel: Option<String>,
    pub paid_at: Option<OffsetDateTime>,
    pub failure_reason: Option<String>,
    /// Set exactly once, together with the terminal status
    pub processed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl Payment {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// =============================================================================
// API Response Types
// =============================================================================

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = (total + per_page - 1) / per_page;
        Self {
            data,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

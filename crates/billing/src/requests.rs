//! Upgrade request lifecycle
//!
//! Owns the pending → approved/rejected/cancelled lifecycle of tier
//! upgrade requests, and the single consolidated tier-transition
//! commit used by every resolution path.

use std::sync::Arc;

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use trustlist_shared::{
    BillingCycle, Business, PaginatedResponse, RequestPaymentStatus, RequestStatus, RequestType,
    SubscriptionStatus, SubscriptionTier, TierUpgradeRequest,
};

use crate::catalog::TierCatalog;
use crate::email::BillingEmailService;
use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::features::FeatureSet;

/// Constraint backing the at-most-one-pending-request invariant
/// (partial unique index, see migrations)
const PENDING_REQUEST_CONSTRAINT: &str = "one_pending_request_per_business";

/// Source of a tier change operation, recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TierChangeSource {
    /// Business owner action (trial start, subscription cancel)
    BusinessOwner,
    /// Admin resolved a request or changed the tier directly
    AdminPanel,
    /// Payment gateway confirmed a transaction
    Gateway,
    /// Automated change (trial expiry sweep)
    System,
}

impl TierChangeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierChangeSource::BusinessOwner => "business_owner",
            TierChangeSource::AdminPanel => "admin_panel",
            TierChangeSource::Gateway => "gateway",
            TierChangeSource::System => "system",
        }
    }

    pub fn actor_type(&self) -> ActorType {
        match self {
            TierChangeSource::BusinessOwner => ActorType::Business,
            TierChangeSource::AdminPanel => ActorType::Admin,
            TierChangeSource::Gateway => ActorType::Gateway,
            TierChangeSource::System => ActorType::System,
        }
    }
}

impl std::fmt::Display for TierChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fully-specified tier transition for the consolidated commit
#[derive(Debug, Clone)]
pub(crate) struct TierTransition {
    pub business_id: Uuid,
    pub new_tier: SubscriptionTier,
    pub new_status: SubscriptionStatus,
    pub is_trialing: bool,
    pub trial_ends_at: Option<OffsetDateTime>,
    pub renewal_date: Option<OffsetDateTime>,
    pub source: TierChangeSource,
    pub changed_by: Option<Uuid>,
    pub reason: Option<String>,
    /// (amount, paid_at) recorded on the business after a successful payment
    pub payment: Option<(i64, OffsetDateTime)>,
}

impl TierTransition {
    /// Renewal date one billing cycle from now
    pub fn renewal_after(cycle: BillingCycle, now: OffsetDateTime) -> OffsetDateTime {
        match cycle {
            BillingCycle::Monthly => now + Duration::days(30),
            BillingCycle::Annual => now + Duration::days(365),
        }
    }
}

// =============================================================================
// CONSOLIDATED TIER TRANSITION COMMIT
// =============================================================================
// This is the SINGLE authoritative mutation of a business's tier state.
// Admin approval, payment verification, trial activation, manual changes
// and the expiry sweep ALL go through this function, inside the caller's
// transaction, so the two resolution paths cannot diverge.
// =============================================================================

/// Apply a tier transition to the business row
///
/// Guards with the `tier_version` optimistic lock, recomputes the
/// feature snapshot from the new tier, syncs the verification badge,
/// and writes the audit row. Returns the previous tier.
pub(crate) async fn commit_tier_transition(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    transition: &TierTransition,
) -> BillingResult<SubscriptionTier> {
    // Row lock so the version cannot move between read and update
    let current: Option<(SubscriptionTier, i64)> = sqlx::query_as(
        "SELECT subscription_tier, tier_version FROM businesses WHERE id = $1 FOR UPDATE",
    )
    .bind(transition.business_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (previous_tier, current_version) = current
        .ok_or_else(|| BillingError::BusinessNotFound(transition.business_id.to_string()))?;

    let features = FeatureSet::for_tier(transition.new_tier).to_json();
    // Any tier above basic carries the verified badge
    let is_verified = transition.new_tier != SubscriptionTier::Basic;
    let (payment_amount, payment_at) = match transition.payment {
        Some((amount, at)) => (Some(amount), Some(at)),
        None => (None, None),
    };

    let rows_affected = sqlx::query(
        r#"
        UPDATE businesses SET
            subscription_tier = $1,
            subscription_status = $2,
            is_trialing = $3,
            trial_ends_at = $4,
            renewal_date = $5,
            features = $6,
            is_verified = $7,
            verified_at = CASE WHEN $7 THEN COALESCE(verified_at, NOW()) ELSE NULL END,
            subscription_started_at = NOW(),
            last_payment_amount = COALESCE($8, last_payment_amount),
            last_payment_at = COALESCE($9, last_payment_at),
            tier_version = tier_version + 1,
            updated_at = NOW()
        WHERE id = $10 AND tier_version = $11
        "#,
    )
    .bind(transition.new_tier)
    .bind(transition.new_status)
    .bind(transition.is_trialing)
    .bind(transition.trial_ends_at)
    .bind(transition.renewal_date)
    .bind(&features)
    .bind(is_verified)
    .bind(payment_amount)
    .bind(payment_at)
    .bind(transition.business_id)
    .bind(current_version)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if rows_affected == 0 {
        // Optimistic lock failed - someone else modified the row
        return Err(BillingError::ConcurrentModification(
            "Tier was modified by another process. Please retry.".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO tier_change_audit
            (business_id, from_tier, to_tier, source, changed_by, reason, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(transition.business_id)
    .bind(previous_tier)
    .bind(transition.new_tier)
    .bind(transition.source.as_str())
    .bind(transition.changed_by)
    .bind(&transition.reason)
    .bind(serde_json::json!({
        "new_status": transition.new_status.as_str(),
        "is_trialing": transition.is_trialing,
        "trial_ends_at": transition.trial_ends_at.map(|t| t.to_string()),
        "renewal_date": transition.renewal_date.map(|t| t.to_string()),
    }))
    .execute(&mut **tx)
    .await?;

    tracing::info!(
        business_id = %transition.business_id,
        from_tier = %previous_tier,
        to_tier = %transition.new_tier,
        new_status = %transition.new_status,
        source = %transition.source,
        "Committed tier transition"
    );

    Ok(previous_tier)
}

// =============================================================================
// Request manager
// =============================================================================

/// Parameters for creating an upgrade request
#[derive(Debug, Clone)]
pub struct CreateUpgradeRequest {
    pub business_id: Uuid,
    /// Acting business user; must own the business
    pub actor_id: Uuid,
    pub requested_tier: SubscriptionTier,
    pub request_type: RequestType,
    pub billing_cycle: Option<BillingCycle>,
    pub business_notes: Option<String>,
    pub trial_days: Option<i32>,
}

/// Admin listing filter
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub requested_tier: Option<SubscriptionTier>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Counts of requests by status and pending requests by tier
#[derive(Debug, Clone, serde::Serialize)]
pub struct RequestStats {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub cancelled: i64,
    pub pending_by_tier: Vec<(SubscriptionTier, i64)>,
}

/// Service owning the upgrade request lifecycle
pub struct UpgradeRequestService {
    pool: PgPool,
    catalog: Arc<TierCatalog>,
    event_logger: BillingEventLogger,
    email: BillingEmailService,
}

impl UpgradeRequestService {
    pub fn new(pool: PgPool, catalog: Arc<TierCatalog>, email: BillingEmailService) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            catalog,
            event_logger,
            email,
        }
    }

    async fn load_business(&self, business_id: Uuid) -> BillingResult<Business> {
        let business: Option<Business> = sqlx::query_as("SELECT * FROM businesses WHERE id = $1")
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?;
        business.ok_or_else(|| BillingError::BusinessNotFound(business_id.to_string()))
    }

    async fn load_request(&self, request_id: Uuid) -> BillingResult<TierUpgradeRequest> {
        let request: Option<TierUpgradeRequest> =
            sqlx::query_as("SELECT * FROM tier_upgrade_requests WHERE id = $1")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await?;
        request.ok_or_else(|| BillingError::RequestNotFound(request_id.to_string()))
    }

    /// Create a pending upgrade request
    ///
    /// Payment-type requests snapshot the amount from the catalog at
    /// creation time; the amount is immutable afterwards even if the
    /// catalog changes. The at-most-one-pending invariant is enforced
    /// by a partial unique index, so a creation race has exactly one
    /// winner.
    pub async fn create(&self, params: CreateUpgradeRequest) -> BillingResult<TierUpgradeRequest> {
        let business = self.load_business(params.business_id).await?;
        if business.owner_id != params.actor_id {
            return Err(BillingError::Forbidden);
        }

        if !params.requested_tier.outranks(business.subscription_tier) {
            return Err(BillingError::InvalidTransition {
                from: business.subscription_tier,
                to: params.requested_tier,
            });
        }

        let billing_cycle = params.billing_cycle.unwrap_or_default();
        let (amount, payment_status) = match params.request_type {
            RequestType::Payment => {
                let amount =
                    self.catalog
                        .price(params.requested_tier, business.currency, billing_cycle)?;
                (amount, RequestPaymentStatus::Pending)
            }
            RequestType::Trial | RequestType::Manual => (0, RequestPaymentStatus::None),
        };

        // Cheap pre-check; the unique index closes the race
        let has_pending: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM tier_upgrade_requests WHERE business_id = $1 AND status = 'pending')",
        )
        .bind(params.business_id)
        .fetch_one(&self.pool)
        .await?;
        if has_pending {
            return Err(BillingError::DuplicatePendingRequest);
        }

        let request: TierUpgradeRequest = sqlx::query_as(
            r#"
            INSERT INTO tier_upgrade_requests
                (id, business_id, business_user_id, current_tier, requested_tier,
                 request_type, status, payment_status, amount, currency,
                 billing_cycle, trial_days, business_notes)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.business_id)
        .bind(params.actor_id)
        .bind(business.subscription_tier)
        .bind(params.requested_tier)
        .bind(params.request_type)
        .bind(payment_status)
        .bind(amount)
        .bind(business.currency)
        .bind(billing_cycle)
        .bind(params.trial_days)
        .bind(&params.business_notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error().and_then(|d| d.constraint()) {
            Some(PENDING_REQUEST_CONSTRAINT) => BillingError::DuplicatePendingRequest,
            _ => BillingError::Database(e.to_string()),
        })?;

        tracing::info!(
            request_id = %request.id,
            business_id = %params.business_id,
            from_tier = %business.subscription_tier,
            requested_tier = %params.requested_tier,
            request_type = %params.request_type,
            amount = amount,
            "Created upgrade request"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(params.business_id, BillingEventType::UpgradeRequestCreated)
                    .actor(params.actor_id, ActorType::Business)
                    .data(serde_json::json!({
                        "request_id": request.id,
                        "requested_tier": params.requested_tier.as_str(),
                        "request_type": params.request_type.as_str(),
                        "amount": amount,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log request creation event");
        }

        // Payment requests are confirmed by email only after the payment
        // verifies; everything else gets the received notice now
        if params.request_type != RequestType::Payment {
            self.email.send_upgrade_request_received(
                &business.email,
                &business.name,
                business.subscription_tier,
                params.requested_tier,
            );
        }

        Ok(request)
    }

    /// Cancel a pending request
    ///
    /// Owner-only; no side effects on the business. The compare-and-set
    /// on `status` guarantees a racing approve/reject/cancel has exactly
    /// one winner.
    pub async fn cancel(&self, request_id: Uuid, actor_id: Uuid) -> BillingResult<TierUpgradeRequest> {
        let request = self.load_request(request_id).await?;
        let business = self.load_business(request.business_id).await?;

        let is_creator = request.business_user_id == Some(actor_id);
        if !is_creator && business.owner_id != actor_id {
            return Err(BillingError::Forbidden);
        }

        if request.status != RequestStatus::Pending {
            return Err(BillingError::AlreadyResolved {
                current: request.status,
            });
        }

        let updated: Option<TierUpgradeRequest> = sqlx::query_as(
            r#"
            UPDATE tier_upgrade_requests
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        let updated = match updated {
            Some(r) => r,
            None => {
                // Lost the race: report the authoritative state
                let current = self.load_request(request_id).await?;
                return Err(BillingError::AlreadyResolved {
                    current: current.status,
                });
            }
        };

        tracing::info!(
            request_id = %request_id,
            business_id = %request.business_id,
            actor_id = %actor_id,
            "Cancelled upgrade request"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(request.business_id, BillingEventType::UpgradeRequestCancelled)
                    .actor(actor_id, ActorType::Business)
                    .previous_state(RequestStatus::Pending.as_str())
                    .data(serde_json::json!({ "request_id": request_id })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log request cancellation event");
        }

        Ok(updated)
    }

    /// Approve a pending request and commit the tier transition
    ///
    /// Admin path, independent of any payment: this is how manual
    /// grants happen. Payment-type requests can only be approved once
    /// their payment has succeeded (the gateway path approves them
    /// through `PaymentService::verify`).
    pub async fn approve(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        admin_notes: Option<String>,
    ) -> BillingResult<TierUpgradeRequest> {
        let mut tx = self.pool.begin().await?;

        let request: Option<TierUpgradeRequest> =
            sqlx::query_as("SELECT * FROM tier_upgrade_requests WHERE id = $1 FOR UPDATE")
                .bind(request_id)
                .fetch_optional(&mut *tx)
                .await?;
        let request =
            request.ok_or_else(|| BillingError::RequestNotFound(request_id.to_string()))?;

        if request.status != RequestStatus::Pending {
            return Err(BillingError::AlreadyResolved {
                current: request.status,
            });
        }
        if !request.can_be_approved() {
            return Err(BillingError::PaymentNotCompleted);
        }

        let updated: Option<TierUpgradeRequest> = sqlx::query_as(
            r#"
            UPDATE tier_upgrade_requests
            SET status = 'approved', reviewed_by = $1, reviewed_at = NOW(),
                admin_notes = $2, updated_at = NOW()
            WHERE id = $3 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(admin_id)
        .bind(&admin_notes)
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?;
        let updated = updated.ok_or_else(|| {
            BillingError::Conflict("request was resolved by a concurrent operation".to_string())
        })?;

        let now = OffsetDateTime::now_utc();
        let transition = match request.request_type {
            RequestType::Trial => {
                let trial_days = i64::from(request.trial_days.unwrap_or(30));
                TierTransition {
                    business_id: request.business_id,
                    new_tier: request.requested_tier,
                    new_status: SubscriptionStatus::Trialing,
                    is_trialing: true,
                    trial_ends_at: Some(now + Duration::days(trial_days)),
                    renewal_date: None,
                    source: TierChangeSource::AdminPanel,
                    changed_by: Some(admin_id),
                    reason: admin_notes.clone(),
                    payment: None,
                }
            }
            RequestType::Payment | RequestType::Manual => TierTransition {
                business_id: request.business_id,
                new_tier: request.requested_tier,
                new_status: SubscriptionStatus::Active,
                is_trialing: false,
                trial_ends_at: None,
                renewal_date: Some(TierTransition::renewal_after(request.billing_cycle, now)),
                source: TierChangeSource::AdminPanel,
                changed_by: Some(admin_id),
                reason: admin_notes.clone(),
                payment: (request.request_type == RequestType::Payment)
                    .then_some((request.amount, now)),
            },
        };

        commit_tier_transition(&mut tx, &transition).await?;
        tx.commit().await?;

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(request.business_id, BillingEventType::UpgradeRequestApproved)
                    .actor(admin_id, ActorType::Admin)
                    .previous_state(request.current_tier.as_str())
                    .data(serde_json::json!({
                        "request_id": request_id,
                        "requested_tier": request.requested_tier.as_str(),
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log approval event");
        }

        let business = self.load_business(request.business_id).await?;
        self.email
            .send_upgrade_approved(&business.email, &business.name, request.requested_tier);

        Ok(updated)
    }

    /// Reject a pending request with a mandatory reason
    pub async fn reject(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        reason: &str,
        admin_notes: Option<String>,
    ) -> BillingResult<TierUpgradeRequest> {
        if reason.trim().is_empty() {
            return Err(BillingError::EmptyRejectionReason);
        }

        let request = self.load_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(BillingError::AlreadyResolved {
                current: request.status,
            });
        }

        let updated: Option<TierUpgradeRequest> = sqlx::query_as(
            r#"
            UPDATE tier_upgrade_requests
            SET status = 'rejected', rejection_reason = $1, reviewed_by = $2,
                reviewed_at = NOW(), admin_notes = $3, updated_at = NOW()
            WHERE id = $4 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(reason)
        .bind(admin_id)
        .bind(&admin_notes)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        let updated = match updated {
            Some(r) => r,
            None => {
                let current = self.load_request(request_id).await?;
                return Err(BillingError::AlreadyResolved {
                    current: current.status,
                });
            }
        };

        tracing::info!(
            request_id = %request_id,
            business_id = %request.business_id,
            admin_id = %admin_id,
            reason = %reason,
            "Rejected upgrade request"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(request.business_id, BillingEventType::UpgradeRequestRejected)
                    .actor(admin_id, ActorType::Admin)
                    .previous_state(RequestStatus::Pending.as_str())
                    .data(serde_json::json!({
                        "request_id": request_id,
                        "reason": reason,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log rejection event");
        }

        let business = self.load_business(request.business_id).await?;
        self.email
            .send_upgrade_rejected(&business.email, &business.name, reason);

        Ok(updated)
    }

    /// All requests for one business, newest first
    pub async fn list_for_business(
        &self,
        business_id: Uuid,
    ) -> BillingResult<Vec<TierUpgradeRequest>> {
        let requests: Vec<TierUpgradeRequest> = sqlx::query_as(
            "SELECT * FROM tier_upgrade_requests WHERE business_id = $1 ORDER BY created_at DESC",
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    /// Filtered, paginated admin listing
    pub async fn list_admin(
        &self,
        filter: RequestFilter,
    ) -> BillingResult<PaginatedResponse<TierUpgradeRequest>> {
        let page = filter.page.unwrap_or(1).max(1);
        let per_page = filter.per_page.unwrap_or(25).clamp(1, 100);
        let offset = (page - 1) * per_page;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tier_upgrade_requests
            WHERE ($1::VARCHAR IS NULL OR status = $1)
              AND ($2::VARCHAR IS NULL OR requested_tier = $2)
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.requested_tier.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await?;

        let requests: Vec<TierUpgradeRequest> = sqlx::query_as(
            r#"
            SELECT * FROM tier_upgrade_requests
            WHERE ($1::VARCHAR IS NULL OR status = $1)
              AND ($2::VARCHAR IS NULL OR requested_tier = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.requested_tier.map(|t| t.as_str()))
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(PaginatedResponse::new(requests, total, page, per_page))
    }

    /// Aggregate request counts for the admin dashboard
    pub async fn stats(&self) -> BillingResult<RequestStats> {
        let by_status: Vec<(RequestStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM tier_upgrade_requests GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let pending_by_tier: Vec<(SubscriptionTier, i64)> = sqlx::query_as(
            r#"
            SELECT requested_tier, COUNT(*) FROM tier_upgrade_requests
            WHERE status = 'pending'
            GROUP BY requested_tier
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let count_for = |status: RequestStatus| {
            by_status
                .iter()
                .find(|(s, _)| *s == status)
                .map(|(_, c)| *c)
                .unwrap_or(0)
        };

        Ok(RequestStats {
            pending: count_for(RequestStatus::Pending),
            approved: count_for(RequestStatus::Approved),
            rejected: count_for(RequestStatus::Rejected),
            cancelled: count_for(RequestStatus::Cancelled),
            pending_by_tier,
        })
    }

    /// Directly set a business's tier (admin back-office)
    ///
    /// Unlike request approval this may move in either direction. The
    /// change is recorded as an already-approved `manual` request row
    /// so the audit history stays uniform. A duration turns the grant
    /// into a trial-equivalent temporary change.
    pub async fn manual_change(
        &self,
        business_id: Uuid,
        new_tier: SubscriptionTier,
        admin_id: Uuid,
        reason: &str,
        duration_days: Option<i64>,
    ) -> BillingResult<Business> {
        let business = self.load_business(business_id).await?;
        let now = OffsetDateTime::now_utc();

        let transition = match duration_days {
            Some(days) => TierTransition {
                business_id,
                new_tier,
                new_status: SubscriptionStatus::Trialing,
                is_trialing: true,
                trial_ends_at: Some(now + Duration::days(days)),
                renewal_date: None,
                source: TierChangeSource::AdminPanel,
                changed_by: Some(admin_id),
                reason: Some(reason.to_string()),
                payment: None,
            },
            None => TierTransition {
                business_id,
                new_tier,
                new_status: SubscriptionStatus::Active,
                is_trialing: false,
                trial_ends_at: None,
                renewal_date: Some(TierTransition::renewal_after(BillingCycle::Monthly, now)),
                source: TierChangeSource::AdminPanel,
                changed_by: Some(admin_id),
                reason: Some(reason.to_string()),
                payment: None,
            },
        };

        let mut tx = self.pool.begin().await?;
        let previous_tier = commit_tier_transition(&mut tx, &transition).await?;

        // Audit row in the request history: approved manual change
        sqlx::query(
            r#"
            INSERT INTO tier_upgrade_requests
                (id, business_id, business_user_id, current_tier, requested_tier,
                 request_type, status, payment_status, amount, currency,
                 billing_cycle, trial_days, admin_notes, reviewed_by, reviewed_at)
            VALUES ($1, $2, $3, $4, $5, 'manual', 'approved', 'none', 0, $6,
                    'monthly', $7, $8, $9, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(business.owner_id)
        .bind(previous_tier)
        .bind(new_tier)
        .bind(business.currency)
        .bind(duration_days.map(|d| d as i32))
        .bind(reason)
        .bind(admin_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(business_id, BillingEventType::TierChanged)
                    .actor(admin_id, ActorType::Admin)
                    .previous_state(previous_tier.as_str())
                    .data(serde_json::json!({
                        "to_tier": new_tier.as_str(),
                        "reason": reason,
                        "duration_days": duration_days,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log manual tier change event");
        }

        self.load_business(business_id).await
    }

    /// Owner cancels the subscription: back to basic, status cancelled
    pub async fn cancel_subscription(
        &self,
        business_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> BillingResult<Business> {
        let business = self.load_business(business_id).await?;
        if business.owner_id != actor_id {
            return Err(BillingError::Forbidden);
        }

        let transition = TierTransition {
            business_id,
            new_tier: SubscriptionTier::Basic,
            new_status: SubscriptionStatus::Cancelled,
            is_trialing: false,
            trial_ends_at: None,
            renewal_date: None,
            source: TierChangeSource::BusinessOwner,
            changed_by: Some(actor_id),
            reason: reason.clone(),
            payment: None,
        };

        let mut tx = self.pool.begin().await?;
        let previous_tier = commit_tier_transition(&mut tx, &transition).await?;
        tx.commit().await?;

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(business_id, BillingEventType::SubscriptionCancelled)
                    .actor(actor_id, ActorType::Business)
                    .previous_state(previous_tier.as_str())
                    .data(serde_json::json!({ "reason": reason })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription cancellation event");
        }

        self.load_business(business_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renewal_after_monthly_and_annual() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            TierTransition::renewal_after(BillingCycle::Monthly, now),
            now + Duration::days(30)
        );
        assert_eq!(
            TierTransition::renewal_after(BillingCycle::Annual, now),
            now + Duration::days(365)
        );
    }

    #[test]
    fn test_tier_change_source_actor_mapping() {
        assert_eq!(
            TierChangeSource::AdminPanel.actor_type(),
            ActorType::Admin
        );
        assert_eq!(
            TierChangeSource::Gateway.actor_type(),
            ActorType::Gateway
        );
        assert_eq!(
            TierChangeSource::BusinessOwner.actor_type(),
            ActorType::Business
        );
        assert_eq!(TierChangeSource::System.actor_type(), ActorType::System);
    }

    #[test]
    fn test_tier_change_source_labels() {
        assert_eq!(TierChangeSource::Gateway.as_str(), "gateway");
        assert_eq!(TierChangeSource::AdminPanel.as_str(), "admin_panel");
    }
}

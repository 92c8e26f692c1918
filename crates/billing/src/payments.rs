//! Payment initialization and verification
//!
//! The initiator turns a pending payment-type upgrade request into a
//! gateway transaction; the verifier idempotently confirms the
//! transaction and commits the tier transition. `verify` is safe to
//! call any number of times for the same reference: the terminal
//! payment status is set exactly once, and every later call returns
//! the cached outcome.

use std::sync::Arc;

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use trustlist_shared::{
    Business, Payment, PaymentStatus, RequestStatus, RequestType, SubscriptionStatus,
    TierUpgradeRequest,
};

use crate::catalog::TierCatalog;
use crate::email::BillingEmailService;
use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::paystack::{GatewayTxStatus, InitializeTransaction, PaystackClient};
use crate::requests::{commit_tier_transition, TierChangeSource, TierTransition};

/// Gateway reference for a new transaction attempt
///
/// Unique per attempt: the same request re-initialized after a failed
/// payment gets a fresh reference.
pub(crate) fn make_reference(request_id: Uuid, unix_ts: i64) -> String {
    format!("TIER-{}-{}", request_id.simple(), unix_ts)
}

/// Result of initializing a payment
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaymentInit {
    pub reference: String,
    pub access_code: String,
    pub authorization_url: String,
    pub amount: i64,
    pub currency: trustlist_shared::Currency,
}

/// Result of verifying a payment
#[derive(Debug, Clone, serde::Serialize)]
pub struct VerifyOutcome {
    pub status: PaymentStatus,
    /// True when this call observed an already-terminal payment and
    /// changed nothing
    pub already_processed: bool,
    pub request_id: Uuid,
    /// Present after a successful verification (fresh or replayed)
    pub business: Option<Business>,
}

pub struct PaymentService {
    pool: PgPool,
    catalog: Arc<TierCatalog>,
    gateway: PaystackClient,
    event_logger: BillingEventLogger,
    email: BillingEmailService,
}

impl PaymentService {
    pub fn new(
        pool: PgPool,
        catalog: Arc<TierCatalog>,
        gateway: PaystackClient,
        email: BillingEmailService,
    ) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            catalog,
            gateway,
            event_logger,
            email,
        }
    }

    async fn load_request(&self, request_id: Uuid) -> BillingResult<TierUpgradeRequest> {
        let request: Option<TierUpgradeRequest> =
            sqlx::query_as("SELECT * FROM tier_upgrade_requests WHERE id = $1")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await?;
        request.ok_or_else(|| BillingError::RequestNotFound(request_id.to_string()))
    }

    async fn load_business(&self, business_id: Uuid) -> BillingResult<Business> {
        let business: Option<Business> = sqlx::query_as("SELECT * FROM businesses WHERE id = $1")
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?;
        business.ok_or_else(|| BillingError::BusinessNotFound(business_id.to_string()))
    }

    /// Initialize a gateway transaction for a pending payment request
    ///
    /// The gateway call happens before any state is written and outside
    /// any lock; if the request resolves concurrently, the final
    /// compare-and-set fails and the orphaned `initialized` payment is
    /// simply never verified successfully.
    pub async fn initialize(&self, request_id: Uuid, actor_id: Uuid) -> BillingResult<PaymentInit> {
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
        if request.request_type != RequestType::Payment {
            return Err(BillingError::InvalidTier(format!(
                "request {request_id} is not a payment request"
            )));
        }

        let plan_code = self
            .catalog
            .plan_code(request.requested_tier, request.currency, request.billing_cycle)?
            .to_string();

        let reference = make_reference(request.id, OffsetDateTime::now_utc().unix_timestamp());

        let init = InitializeTransaction {
            email: business.email.clone(),
            amount: request.amount,
            currency: request.currency,
            reference: reference.clone(),
            callback_url: self.gateway.config().callback_url.clone(),
            plan: Some(plan_code),
            metadata: serde_json::json!({
                "upgrade_request_id": request.id,
                "business_id": business.id,
                "business_name": business.name,
                "current_tier": request.current_tier.as_str(),
                "requested_tier": request.requested_tier.as_str(),
            }),
        };

        // External call; may be slow or fail. Nothing persisted yet.
        let authorization = self.gateway.initialize_transaction(&init).await?;

        sqlx::query(
            r#"
            INSERT INTO payments
                (id, reference, upgrade_request_id, business_id, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'initialized')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&reference)
        .bind(request.id)
        .bind(business.id)
        .bind(request.amount)
        .bind(request.currency)
        .execute(&self.pool)
        .await?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE tier_upgrade_requests
            SET payment_status = 'pending', payment_reference = $1, updated_at = NOW()
            WHERE id = $2 AND status = 'pending'
            "#,
        )
        .bind(&reference)
        .bind(request.id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(BillingError::Conflict(
                "request was resolved while initializing payment".to_string(),
            ));
        }

        tracing::info!(
            request_id = %request.id,
            business_id = %business.id,
            reference = %reference,
            amount = request.amount,
            "Initialized gateway payment"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(business.id, BillingEventType::PaymentInitialized)
                    .actor(actor_id, ActorType::Business)
                    .data(serde_json::json!({
                        "request_id": request.id,
                        "reference": reference,
                        "amount": request.amount,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log payment initialization event");
        }

        Ok(PaymentInit {
            reference,
            access_code: authorization.access_code,
            authorization_url: authorization.authorization_url,
            amount: request.amount,
            currency: request.currency,
        })
    }

    /// Load a payment row by gateway reference
    pub async fn details(&self, reference: &str) -> BillingResult<Payment> {
        let payment: Option<Payment> = sqlx::query_as("SELECT * FROM payments WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        payment.ok_or_else(|| BillingError::UnknownReference(reference.to_string()))
    }

    /// Recent payments for a business, newest first
    pub async fn list_for_business(
        &self,
        business_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<Payment>> {
        let payments: Vec<Payment> = sqlx::query_as(
            "SELECT * FROM payments WHERE business_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(business_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Verify a payment by reference and, on success, commit the tier
    /// transition
    ///
    /// Idempotency-critical: invoked by client polling and by the
    /// gateway webhook, possibly concurrently. Only a payment whose
    /// current status is `initialized` may be terminated; every other
    /// caller observes the terminal state and returns it unchanged.
    pub async fn verify(&self, reference: &str) -> BillingResult<VerifyOutcome> {
        let payment = self.details(reference).await?;

        if payment.is_terminal() {
            return self.replay_outcome(payment).await;
        }

        // Authoritative answer from the gateway; no locks held while
        // this is in flight
        let tx_state = self.gateway.verify_transaction(reference).await?;

        match tx_state.status {
            GatewayTxStatus::Success => self.confirm_success(&payment, &tx_state).await,
            GatewayTxStatus::Failed => self.confirm_failure(&payment, &tx_state).await,
            // Not confirmed either way: surface as retryable, mutate nothing
            other => Err(BillingError::GatewayPending(other.as_str().to_string())),
        }
    }

    /// Cached outcome for an already-terminal payment
    async fn replay_outcome(&self, payment: Payment) -> BillingResult<VerifyOutcome> {
        let business = if payment.status == PaymentStatus::Success {
            Some(self.load_business(payment.business_id).await?)
        } else {
            None
        };

        tracing::info!(
            reference = %payment.reference,
            status = %payment.status,
            "Payment already processed - returning cached outcome"
        );

        Ok(VerifyOutcome {
            status: payment.status,
            already_processed: true,
            request_id: payment.upgrade_request_id,
            business,
        })
    }

    async fn confirm_success(
        &self,
        payment: &Payment,
        tx_state: &crate::paystack::VerifiedTransaction,
    ) -> BillingResult<VerifyOutcome> {
        let mut tx = self.pool.begin().await?;

        // Terminal write, exactly once. Losing the race means another
        // verifier already terminated this payment.
        let claimed: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = 'success', processed_at = NOW(), paid_at = NOW(),
                gateway_reference = $1, channel = $2
            WHERE reference = $3 AND status = 'initialized'
            RETURNING *
            "#,
        )
        .bind(tx_state.gateway_id.map(|id| id.to_string()))
        .bind(&tx_state.channel)
        .bind(&payment.reference)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            drop(tx);
            let current = self.details(&payment.reference).await?;
            if current.is_terminal() {
                return self.replay_outcome(current).await;
            }
            return Err(BillingError::Conflict(
                "payment is being processed by another caller".to_string(),
            ));
        }

        let request: Option<TierUpgradeRequest> = sqlx::query_as(
            r#"
            UPDATE tier_upgrade_requests
            SET status = 'approved', payment_status = 'success',
                reviewed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(payment.upgrade_request_id)
        .fetch_optional(&mut *tx)
        .await?;

        // The request must still be pending; otherwise the whole unit
        // aborts and the payment stays initialized
        let request = request.ok_or_else(|| {
            BillingError::Conflict(
                "upgrade request was resolved before payment confirmation".to_string(),
            )
        })?;

        let now = OffsetDateTime::now_utc();
        let transition = TierTransition {
            business_id: request.business_id,
            new_tier: request.requested_tier,
            new_status: SubscriptionStatus::Active,
            is_trialing: false,
            trial_ends_at: None,
            renewal_date: Some(TierTransition::renewal_after(request.billing_cycle, now)),
            source: TierChangeSource::Gateway,
            changed_by: request.business_user_id,
            reason: Some(format!(
                "Auto-approved after successful payment {}",
                payment.reference
            )),
            payment: Some((payment.amount, now)),
        };
        commit_tier_transition(&mut tx, &transition).await?;

        tx.commit().await?;

        tracing::info!(
            reference = %payment.reference,
            request_id = %request.id,
            business_id = %request.business_id,
            new_tier = %request.requested_tier,
            "Payment verified and tier transition committed"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(request.business_id, BillingEventType::PaymentSucceeded)
                    .actor_opt(request.business_user_id, ActorType::Gateway)
                    .previous_state(request.current_tier.as_str())
                    .data(serde_json::json!({
                        "reference": payment.reference,
                        "request_id": request.id,
                        "amount": payment.amount,
                        "new_tier": request.requested_tier.as_str(),
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log payment success event");
        }

        let business = self.load_business(request.business_id).await?;
        self.email.send_payment_success(
            &business.email,
            &business.name,
            request.requested_tier,
            &payment.reference,
        );

        Ok(VerifyOutcome {
            status: PaymentStatus::Success,
            already_processed: false,
            request_id: request.id,
            business: Some(business),
        })
    }

    async fn confirm_failure(
        &self,
        payment: &Payment,
        tx_state: &crate::paystack::VerifiedTransaction,
    ) -> BillingResult<VerifyOutcome> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = 'failed', processed_at = NOW(),
                gateway_reference = $1, failure_reason = $2
            WHERE reference = $3 AND status = 'initialized'
            RETURNING *
            "#,
        )
        .bind(tx_state.gateway_id.map(|id| id.to_string()))
        .bind(&tx_state.gateway_response)
        .bind(&payment.reference)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            drop(tx);
            let current = self.details(&payment.reference).await?;
            if current.is_terminal() {
                return self.replay_outcome(current).await;
            }
            return Err(BillingError::Conflict(
                "payment is being processed by another caller".to_string(),
            ));
        }

        // The request stays pending so the owner can retry
        // initialization; only its payment marker moves to failed
        sqlx::query(
            r#"
            UPDATE tier_upgrade_requests
            SET payment_status = 'failed', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(payment.upgrade_request_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            reference = %payment.reference,
            request_id = %payment.upgrade_request_id,
            reason = ?tx_state.gateway_response,
            "Payment failed at gateway"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(payment.business_id, BillingEventType::PaymentFailed)
                    .data(serde_json::json!({
                        "reference": payment.reference,
                        "request_id": payment.upgrade_request_id,
                        "reason": tx_state.gateway_response,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log payment failure event");
        }

        Ok(VerifyOutcome {
            status: PaymentStatus::Failed,
            already_processed: false,
            request_id: payment.upgrade_request_id,
            business: None,
        })
    }

    /// Webhook-driven failure marker for a charge that failed at the
    /// gateway before any verify call; same CAS discipline as `verify`
    pub async fn mark_failed_by_reference(
        &self,
        reference: &str,
        reason: Option<&str>,
    ) -> BillingResult<()> {
        let payment = self.details(reference).await?;
        if payment.is_terminal() {
            // Already settled; webhook replay is a no-op
            return Ok(());
        }

        let synthetic = crate::paystack::VerifiedTransaction {
            status: GatewayTxStatus::Failed,
            reference: reference.to_string(),
            amount: payment.amount,
            currency: Some(payment.currency),
            channel: None,
            gateway_id: None,
            gateway_response: reason.map(|r| r.to_string()),
        };
        self.confirm_failure(&payment, &synthetic).await.map(|_| ())
    }
}

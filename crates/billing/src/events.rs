//! Billing audit events
//!
//! Append-only trail of every billing decision: who acted, on which
//! business, from which previous state. Event logging must never fail
//! a billing operation; callers log a warning and continue.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Who performed a billing action
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Business,
    Admin,
    System,
    Gateway,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Business => "business",
            ActorType::Admin => "admin",
            ActorType::System => "system",
            ActorType::Gateway => "gateway",
        }
    }
}

/// Billing event types written to the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    UpgradeRequestCreated,
    UpgradeRequestCancelled,
    UpgradeRequestApproved,
    UpgradeRequestRejected,
    TrialStarted,
    TrialExpired,
    PaymentInitialized,
    PaymentSucceeded,
    PaymentFailed,
    TierChanged,
    SubscriptionCancelled,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::UpgradeRequestCreated => "upgrade_request_created",
            BillingEventType::UpgradeRequestCancelled => "upgrade_request_cancelled",
            BillingEventType::UpgradeRequestApproved => "upgrade_request_approved",
            BillingEventType::UpgradeRequestRejected => "upgrade_request_rejected",
            BillingEventType::TrialStarted => "trial_started",
            BillingEventType::TrialExpired => "trial_expired",
            BillingEventType::PaymentInitialized => "payment_initialized",
            BillingEventType::PaymentSucceeded => "payment_succeeded",
            BillingEventType::PaymentFailed => "payment_failed",
            BillingEventType::TierChanged => "tier_changed",
            BillingEventType::SubscriptionCancelled => "subscription_cancelled",
        }
    }
}

/// Builder for a billing event
#[derive(Debug, Clone)]
pub struct BillingEventBuilder {
    business_id: Uuid,
    event_type: BillingEventType,
    actor_id: Option<Uuid>,
    actor_type: ActorType,
    previous_state: Option<String>,
    data: serde_json::Value,
}

impl BillingEventBuilder {
    pub fn new(business_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            business_id,
            event_type,
            actor_id: None,
            actor_type: ActorType::System,
            previous_state: None,
            data: serde_json::json!({}),
        }
    }

    pub fn actor(mut self, actor_id: Uuid, actor_type: ActorType) -> Self {
        self.actor_id = Some(actor_id);
        self.actor_type = actor_type;
        self
    }

    pub fn actor_opt(mut self, actor_id: Option<Uuid>, actor_type: ActorType) -> Self {
        self.actor_id = actor_id;
        self.actor_type = actor_type;
        self
    }

    /// State before the mutation, for audit/admin-appeal workflows
    pub fn previous_state(mut self, state: impl Into<String>) -> Self {
        self.previous_state = Some(state.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Writes billing events to the append-only audit table
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist one event
    ///
    /// Errors propagate to the caller so it can decide to warn-and-continue;
    /// billing operations never fail because the audit write failed.
    pub async fn log_event(&self, event: BillingEventBuilder) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_events
                (business_id, event_type, actor_id, actor_type, previous_state, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.business_id)
        .bind(event.event_type.as_str())
        .bind(event.actor_id)
        .bind(event.actor_type.as_str())
        .bind(&event.previous_state)
        .bind(&event.data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

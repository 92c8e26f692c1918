//! Trial activation
//!
//! Grants a time-boxed tier upgrade without payment, bypassing the
//! request/payment path. The grant itself goes through the same
//! consolidated tier-transition commit as every other resolution path,
//! and an already-approved trial request row is written for audit.

use std::sync::Arc;

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use trustlist_shared::{Business, SubscriptionStatus, SubscriptionTier};

use crate::catalog::TierCatalog;
use crate::email::BillingEmailService;
use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};
use crate::requests::{commit_tier_transition, TierChangeSource, TierTransition};

/// Constraint backing the one-trial-per-tier rule (see migrations)
const TRIAL_HISTORY_CONSTRAINT: &str = "one_trial_per_tier_per_business";

/// Default trial length when the caller does not specify one
pub const DEFAULT_TRIAL_DAYS: i64 = 30;

/// Longest trial an owner can self-serve
pub const MAX_TRIAL_DAYS: i64 = 90;

pub struct TrialService {
    pool: PgPool,
    catalog: Arc<TierCatalog>,
    event_logger: BillingEventLogger,
    email: BillingEmailService,
}

impl TrialService {
    pub fn new(pool: PgPool, catalog: Arc<TierCatalog>, email: BillingEmailService) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            catalog,
            event_logger,
            email,
        }
    }

    /// Start a trial for a business
    ///
    /// Only trial-eligible tiers may be granted; the tier must outrank
    /// the current one; a business gets one trial per tier, ever; and a
    /// business with an active paid subscription cannot start a trial.
    pub async fn start_trial(
        &self,
        business_id: Uuid,
        actor_id: Uuid,
        tier: SubscriptionTier,
        trial_days: i64,
    ) -> BillingResult<Business> {
        let business: Option<Business> = sqlx::query_as("SELECT * FROM businesses WHERE id = $1")
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?;
        let business =
            business.ok_or_else(|| BillingError::BusinessNotFound(business_id.to_string()))?;

        if business.owner_id != actor_id {
            return Err(BillingError::Forbidden);
        }
        if !self.catalog.is_trial_eligible(tier) {
            return Err(BillingError::TierNotTrialEligible(tier));
        }
        if !tier.outranks(business.subscription_tier) {
            return Err(BillingError::InvalidTransition {
                from: business.subscription_tier,
                to: tier,
            });
        }
        if business.subscription_status == SubscriptionStatus::Active {
            return Err(BillingError::AlreadySubscribed);
        }

        let trial_days = trial_days.clamp(1, MAX_TRIAL_DAYS);
        let now = OffsetDateTime::now_utc();
        let trial_ends_at = now + Duration::days(trial_days);

        let mut tx = self.pool.begin().await?;

        // One trial per tier per business; the unique constraint makes
        // a racing second activation lose cleanly
        sqlx::query("INSERT INTO trial_history (business_id, tier) VALUES ($1, $2)")
            .bind(business_id)
            .bind(tier)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e.as_database_error().and_then(|d| d.constraint()) {
                Some(TRIAL_HISTORY_CONSTRAINT) => BillingError::TrialAlreadyUsed(tier),
                _ => BillingError::Database(e.to_string()),
            })?;

        let transition = TierTransition {
            business_id,
            new_tier: tier,
            new_status: SubscriptionStatus::Trialing,
            is_trialing: true,
            trial_ends_at: Some(trial_ends_at),
            renewal_date: None,
            source: TierChangeSource::BusinessOwner,
            changed_by: Some(actor_id),
            reason: Some(format!("{trial_days}-day trial")),
            payment: None,
        };
        let previous_tier = commit_tier_transition(&mut tx, &transition).await?;

        // Resolved trial request row for the audit history; never pending
        sqlx::query(
            r#"
            INSERT INTO tier_upgrade_requests
                (id, business_id, business_user_id, current_tier, requested_tier,
                 request_type, status, payment_status, amount, currency,
                 billing_cycle, trial_days, reviewed_at)
            VALUES ($1, $2, $3, $4, $5, 'trial', 'approved', 'none', 0, $6,
                    'monthly', $7, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(actor_id)
        .bind(previous_tier)
        .bind(tier)
        .bind(business.currency)
        .bind(trial_days as i32)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            business_id = %business_id,
            tier = %tier,
            trial_days = trial_days,
            trial_ends_at = %trial_ends_at,
            "Started trial"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(business_id, BillingEventType::TrialStarted)
                    .actor(actor_id, ActorType::Business)
                    .previous_state(previous_tier.as_str())
                    .data(serde_json::json!({
                        "tier": tier.as_str(),
                        "trial_days": trial_days,
                        "trial_ends_at": trial_ends_at.to_string(),
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log trial start event");
        }

        self.email
            .send_trial_started(&business.email, &business.name, tier, trial_days);

        let updated: Option<Business> = sqlx::query_as("SELECT * FROM businesses WHERE id = $1")
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?;
        updated.ok_or_else(|| BillingError::BusinessNotFound(business_id.to_string()))
    }

    /// Downgrade every business whose trial ran out
    ///
    /// Run periodically by the worker. Each downgrade re-checks the
    /// trial state under a row lock before committing, so a trial that
    /// was converted or cancelled between scan and commit is skipped
    /// rather than clobbered.
    pub async fn process_expired_trials(&self) -> BillingResult<usize> {
        let expired: Vec<(Uuid, String, String, SubscriptionTier)> = sqlx::query_as(
            r#"
            SELECT id, name, email, subscription_tier
            FROM businesses
            WHERE is_trialing = true
              AND subscription_status = 'trialing'
              AND trial_ends_at <= NOW()
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut processed = 0;
        for (business_id, name, email, from_tier) in expired {
            let mut tx = self.pool.begin().await?;

            let still_expired: Option<bool> = sqlx::query_scalar(
                r#"
                SELECT true FROM businesses
                WHERE id = $1
                  AND is_trialing = true
                  AND subscription_status = 'trialing'
                  AND trial_ends_at <= NOW()
                FOR UPDATE
                "#,
            )
            .bind(business_id)
            .fetch_optional(&mut *tx)
            .await?;
            if still_expired.is_none() {
                continue;
            }

            let transition = TierTransition {
                business_id,
                new_tier: SubscriptionTier::Basic,
                new_status: SubscriptionStatus::Inactive,
                is_trialing: false,
                trial_ends_at: None,
                renewal_date: None,
                source: TierChangeSource::System,
                changed_by: None,
                reason: Some("trial expired".to_string()),
                payment: None,
            };

            if let Err(e) = commit_tier_transition(&mut tx, &transition).await {
                tracing::error!(business_id = %business_id, error = %e, "Failed to expire trial");
                continue;
            }
            tx.commit().await?;
            processed += 1;

            tracing::info!(
                business_id = %business_id,
                name = %name,
                from_tier = %from_tier,
                "Trial expired, downgraded to basic"
            );

            if let Err(e) = self
                .event_logger
                .log_event(
                    BillingEventBuilder::new(business_id, BillingEventType::TrialExpired)
                        .previous_state(from_tier.as_str())
                        .data(serde_json::json!({ "downgraded_to": "basic" })),
                )
                .await
            {
                tracing::warn!(business_id = %business_id, error = %e, "Failed to log trial expiry event");
            }

            self.email.send_trial_expired(&email, &name);
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_day_bounds() {
        assert_eq!(0_i64.clamp(1, MAX_TRIAL_DAYS), 1);
        assert_eq!(30_i64.clamp(1, MAX_TRIAL_DAYS), 30);
        assert_eq!(400_i64.clamp(1, MAX_TRIAL_DAYS), MAX_TRIAL_DAYS);
    }
}

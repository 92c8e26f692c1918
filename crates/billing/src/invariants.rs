//! Billing invariants
//!
//! Runnable consistency checks for the subscription engine, executed
//! after suspicious mutations or webhook replays and exposed on the
//! admin surface.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Business(es) affected
    pub business_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - tiers or payments may be wrong
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct MultiplePendingRow {
    business_id: Uuid,
    pending_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct MissingReasonRow {
    id: Uuid,
    business_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentTerminalRow {
    reference: String,
    business_id: Uuid,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct UnpaidApprovedRow {
    id: Uuid,
    business_id: Uuid,
    payment_status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct TrialingRow {
    id: Uuid,
    name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct BadRankRow {
    id: Uuid,
    business_id: Uuid,
    current_tier: String,
    requested_tier: String,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_pending_request().await?);
        violations.extend(self.check_rejected_have_reason().await?);
        violations.extend(self.check_terminal_payments_processed_once().await?);
        violations.extend(self.check_approved_payment_requests_paid().await?);
        violations.extend(self.check_trialing_has_end_date().await?);
        violations.extend(self.check_requests_are_upgrades().await?);

        let checks_run = 6;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: At most one pending upgrade request per business
    ///
    /// Two pending requests would let a business race two different
    /// tier transitions.
    async fn check_single_pending_request(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MultiplePendingRow> = sqlx::query_as(
            r#"
            SELECT business_id, COUNT(*) as pending_count
            FROM tier_upgrade_requests
            WHERE status = 'pending'
            GROUP BY business_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_pending_request".to_string(),
                business_ids: vec![row.business_id],
                description: format!(
                    "Business has {} pending upgrade requests (expected at most 1)",
                    row.pending_count
                ),
                context: serde_json::json!({ "pending_count": row.pending_count }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Rejected requests carry a rejection reason
    async fn check_rejected_have_reason(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MissingReasonRow> = sqlx::query_as(
            r#"
            SELECT id, business_id
            FROM tier_upgrade_requests
            WHERE status = 'rejected'
              AND (rejection_reason IS NULL OR rejection_reason = '')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "rejected_have_reason".to_string(),
                business_ids: vec![row.business_id],
                description: "Rejected request has no rejection reason".to_string(),
                context: serde_json::json!({ "request_id": row.id }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: Terminal payments have processed_at, non-terminal
    /// ones do not
    ///
    /// processed_at is set exactly once, together with the terminal
    /// status; a mismatch means the idempotency boundary was bypassed.
    async fn check_terminal_payments_processed_once(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PaymentTerminalRow> = sqlx::query_as(
            r#"
            SELECT reference, business_id, status
            FROM payments
            WHERE (status IN ('success', 'failed') AND processed_at IS NULL)
               OR (status = 'initialized' AND processed_at IS NOT NULL)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "terminal_payments_processed_once".to_string(),
                business_ids: vec![row.business_id],
                description: format!(
                    "Payment {} has status '{}' inconsistent with processed_at",
                    row.reference, row.status
                ),
                context: serde_json::json!({
                    "reference": row.reference,
                    "status": row.status,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 4: Approved payment-type requests have a successful payment
    async fn check_approved_payment_requests_paid(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<UnpaidApprovedRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.business_id, r.payment_status
            FROM tier_upgrade_requests r
            WHERE r.request_type = 'payment'
              AND r.status = 'approved'
              AND NOT EXISTS (
                  SELECT 1 FROM payments p
                  WHERE p.upgrade_request_id = r.id AND p.status = 'success'
              )
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "approved_payment_requests_paid".to_string(),
                business_ids: vec![row.business_id],
                description: "Approved payment request has no successful payment".to_string(),
                context: serde_json::json!({
                    "request_id": row.id,
                    "payment_status": row.payment_status,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 5: Trialing businesses have a trial end date
    async fn check_trialing_has_end_date(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<TrialingRow> = sqlx::query_as(
            r#"
            SELECT id, name
            FROM businesses
            WHERE (is_trialing = true AND trial_ends_at IS NULL)
               OR (subscription_status = 'trialing' AND is_trialing = false)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "trialing_has_end_date".to_string(),
                business_ids: vec![row.id],
                description: format!(
                    "Business '{}' has inconsistent trial state",
                    row.name
                ),
                context: serde_json::json!({}),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 6: Every request asked for a strict upgrade
    async fn check_requests_are_upgrades(&self) -> BillingResult<Vec<InvariantViolation>> {
        // Manual admin changes may move in either direction; owner
        // requests never may
        let rows: Vec<BadRankRow> = sqlx::query_as(
            r#"
            SELECT id, business_id, current_tier, requested_tier
            FROM tier_upgrade_requests
            WHERE request_type <> 'manual'
              AND (CASE requested_tier
                     WHEN 'basic' THEN 0 WHEN 'verified' THEN 1
                     WHEN 'premium' THEN 2 WHEN 'enterprise' THEN 3 END)
                  <=
                  (CASE current_tier
                     WHEN 'basic' THEN 0 WHEN 'verified' THEN 1
                     WHEN 'premium' THEN 2 WHEN 'enterprise' THEN 3 END)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "requests_are_upgrades".to_string(),
                business_ids: vec![row.business_id],
                description: format!(
                    "Request moves {} -> {} which is not an upgrade",
                    row.current_tier, row.requested_tier
                ),
                context: serde_json::json!({ "request_id": row.id }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_summary_serializes() {
        let summary = InvariantCheckSummary {
            checked_at: OffsetDateTime::now_utc(),
            checks_run: 6,
            checks_passed: 6,
            checks_failed: 0,
            violations: vec![],
            healthy: true,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["healthy"], true);
        assert_eq!(json["checks_run"], 6);
    }
}

//! Gateway webhook handling
//!
//! Verifies the gateway's HMAC-SHA512 signature over the raw request
//! body, atomically claims each event so concurrent deliveries process
//! exactly once, and dispatches to the payment verifier. The verifier
//! is itself idempotent, so the claim table is an audit and fast-path
//! dedupe, not the only line of defense.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use sqlx::PgPool;

use crate::error::{BillingError, BillingResult};
use crate::payments::PaymentService;

type HmacSha512 = Hmac<Sha512>;

/// Parsed gateway webhook event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub reference: Option<String>,
    pub amount: Option<i64>,
    pub gateway_response: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Outcome of handling one webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum WebhookOutcome {
    Processed,
    /// Event already claimed by an earlier delivery
    Duplicate,
    /// Event type has no handler; acknowledged and recorded
    Ignored,
}

pub struct WebhookHandler {
    pool: PgPool,
    secret_key: String,
}

impl WebhookHandler {
    pub fn new(pool: PgPool, secret_key: String) -> Self {
        Self { pool, secret_key }
    }

    /// Verify the signature header and parse the event
    ///
    /// The signature is the hex HMAC-SHA512 of the exact raw body under
    /// the gateway secret key; any other payload must be rejected before
    /// parsing.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        let expected = Self::compute_signature(&self.secret_key, payload)?;

        if expected != signature.to_lowercase() {
            tracing::error!(
                payload_len = payload.len(),
                "Webhook signature mismatch"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: WebhookEvent = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::info!(event = %event.event, "Verified gateway webhook event");
        Ok(event)
    }

    pub(crate) fn compute_signature(secret_key: &str, payload: &str) -> BillingResult<String> {
        let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes())
            .map_err(|_| BillingError::Config("invalid webhook secret key".to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Handle a verified event
    ///
    /// The INSERT .. ON CONFLICT DO NOTHING claim ensures that of two
    /// concurrent deliveries of the same event, exactly one processes
    /// it and the other acknowledges as a duplicate.
    pub async fn handle_event(
        &self,
        event: WebhookEvent,
        payments: &PaymentService,
    ) -> BillingResult<WebhookOutcome> {
        let reference = event.data.reference.clone().unwrap_or_default();
        let event_key = format!("{}:{}", event.event, reference);

        let claimed: Option<(uuid::Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO gateway_webhook_events (event_key, event_type, processing_result)
            VALUES ($1, $2, 'processing')
            ON CONFLICT (event_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&event_key)
        .bind(&event.event)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            tracing::info!(
                event_key = %event_key,
                "Duplicate webhook event - already claimed"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let result = self.process_event(&event, payments).await;

        let (processing_result, error_message) = match &result {
            Ok(WebhookOutcome::Ignored) => ("ignored".to_string(), None),
            Ok(_) => ("success".to_string(), None),
            Err(e) => ("error".to_string(), Some(e.to_string())),
        };

        if let Err(e) = sqlx::query(
            r#"
            UPDATE gateway_webhook_events
            SET processing_result = $1, error_message = $2, processed_at = NOW()
            WHERE event_key = $3
            "#,
        )
        .bind(&processing_result)
        .bind(&error_message)
        .bind(&event_key)
        .execute(&self.pool)
        .await
        {
            tracing::error!(
                event_key = %event_key,
                error = %e,
                "Failed to update webhook audit record"
            );
        }

        result
    }

    async fn process_event(
        &self,
        event: &WebhookEvent,
        payments: &PaymentService,
    ) -> BillingResult<WebhookOutcome> {
        match event.event.as_str() {
            "charge.success" => {
                let reference = event.data.reference.as_deref().ok_or_else(|| {
                    BillingError::Gateway("charge.success without reference".to_string())
                })?;

                match payments.verify(reference).await {
                    Ok(outcome) => {
                        tracing::info!(
                            reference = %reference,
                            status = %outcome.status,
                            already_processed = outcome.already_processed,
                            "Webhook-driven payment verification complete"
                        );
                        Ok(WebhookOutcome::Processed)
                    }
                    // A reference we never initialized is not ours to settle
                    Err(BillingError::UnknownReference(r)) => {
                        tracing::warn!(reference = %r, "Webhook for unknown payment reference");
                        Ok(WebhookOutcome::Ignored)
                    }
                    Err(e) => Err(e),
                }
            }
            "charge.failed" => {
                let reference = event.data.reference.as_deref().ok_or_else(|| {
                    BillingError::Gateway("charge.failed without reference".to_string())
                })?;

                match payments
                    .mark_failed_by_reference(reference, event.data.gateway_response.as_deref())
                    .await
                {
                    Ok(()) => Ok(WebhookOutcome::Processed),
                    Err(BillingError::UnknownReference(r)) => {
                        tracing::warn!(reference = %r, "Failure webhook for unknown reference");
                        Ok(WebhookOutcome::Ignored)
                    }
                    Err(e) => Err(e),
                }
            }
            other => {
                // Track which events arrive without a handler
                tracing::info!(event = %other, "Received unhandled gateway event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sk_test_webhook_secret";

    fn handler_for_signature_tests() -> WebhookHandler {
        // Signature verification never touches the pool
        let pool = PgPool::connect_lazy("postgres://localhost/unused")
            .expect("lazy pool construction cannot fail");
        WebhookHandler::new(pool, SECRET.to_string())
    }

    #[tokio::test]
    async fn test_signature_accepts_exact_body() {
        let handler = handler_for_signature_tests();
        let body =
            r#"{"event":"charge.success","data":{"reference":"TIER-REF-1","amount":500000}}"#;
        let signature = WebhookHandler::compute_signature(SECRET, body).unwrap();

        let event = handler.verify_event(body, &signature).unwrap();
        assert_eq!(event.event, "charge.success");
        assert_eq!(event.data.reference.as_deref(), Some("TIER-REF-1"));
        assert_eq!(event.data.amount, Some(500_000));
    }

    #[tokio::test]
    async fn test_signature_rejects_tampered_body() {
        let handler = handler_for_signature_tests();
        let body =
            r#"{"event":"charge.success","data":{"reference":"TIER-REF-1","amount":500000}}"#;
        let tampered =
            r#"{"event":"charge.success","data":{"reference":"TIER-REF-1","amount":999999}}"#;
        let signature = WebhookHandler::compute_signature(SECRET, body).unwrap();

        let err = handler.verify_event(tampered, &signature).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    #[tokio::test]
    async fn test_signature_rejects_wrong_secret() {
        let handler = handler_for_signature_tests();
        let body = r#"{"event":"charge.failed","data":{"reference":"TIER-REF-2"}}"#;
        let signature = WebhookHandler::compute_signature("some_other_secret", body).unwrap();

        let err = handler.verify_event(body, &signature).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    #[tokio::test]
    async fn test_signature_is_case_insensitive_on_header() {
        let handler = handler_for_signature_tests();
        let body = r#"{"event":"charge.success","data":{"reference":"TIER-REF-3"}}"#;
        let signature = WebhookHandler::compute_signature(SECRET, body)
            .unwrap()
            .to_uppercase();

        assert!(handler.verify_event(body, &signature).is_ok());
    }

    #[tokio::test]
    async fn test_unparseable_payload_is_rejected() {
        let handler = handler_for_signature_tests();
        let body = "not json at all";
        let signature = WebhookHandler::compute_signature(SECRET, body).unwrap();

        let err = handler.verify_event(body, &signature).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    #[tokio::test]
    async fn test_event_parses_without_optional_fields() {
        let handler = handler_for_signature_tests();
        let body = r#"{"event":"subscription.create","data":{}}"#;
        let signature = WebhookHandler::compute_signature(SECRET, body).unwrap();

        let event = handler.verify_event(body, &signature).unwrap();
        assert_eq!(event.event, "subscription.create");
        assert!(event.data.reference.is_none());
    }
}

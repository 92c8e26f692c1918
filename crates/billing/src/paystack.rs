//! Paystack gateway client
//!
//! Thin REST client for the two gateway calls the engine needs:
//! initializing a transaction and verifying one by reference. Every
//! call is bounded by a timeout and runs outside any database
//! transaction or row lock. Failures surface to the caller as
//! retryable errors; nothing is retried here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use trustlist_shared::Currency;

use crate::error::{BillingError, BillingResult};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub callback_url: String,
    pub timeout: Duration,
}

impl PaystackConfig {
    /// Load from environment variables
    ///
    /// `PAYSTACK_SECRET_KEY` is required; `PAYSTACK_BASE_URL` overrides
    /// the production endpoint (used by tests against a local mock).
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("PAYSTACK_SECRET_KEY")
            .map_err(|_| BillingError::Config("PAYSTACK_SECRET_KEY is not set".to_string()))?;
        if secret_key.is_empty() {
            return Err(BillingError::Config(
                "PAYSTACK_SECRET_KEY is empty".to_string(),
            ));
        }

        let base_url = std::env::var("PAYSTACK_BASE_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());
        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "https://trustlist.app".to_string());

        Ok(Self {
            secret_key,
            base_url,
            callback_url: format!("{frontend_url}/business/subscription/payment-callback"),
            timeout: Duration::from_secs(15),
        })
    }
}

/// Transaction initialization request
#[derive(Debug, Clone, Serialize)]
pub struct InitializeTransaction {
    pub email: String,
    /// Minor units (kobo / cents)
    pub amount: i64,
    pub currency: Currency,
    pub reference: String,
    pub callback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    pub metadata: serde_json::Value,
}

/// Checkout handle returned by the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransactionAuthorization {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Gateway-reported status of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayTxStatus {
    Success,
    Failed,
    /// Customer opened the checkout and walked away
    Abandoned,
    /// Still in flight at the gateway
    Pending,
    Other(String),
}

impl GatewayTxStatus {
    fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            "abandoned" => Self::Abandoned,
            "pending" | "ongoing" | "processing" | "queued" => Self::Pending,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
            Self::Pending => "pending",
            Self::Other(s) => s,
        }
    }
}

/// Authoritative transaction state fetched from the gateway
#[derive(Debug, Clone)]
pub struct VerifiedTransaction {
    pub status: GatewayTxStatus,
    pub reference: String,
    pub amount: i64,
    pub currency: Option<Currency>,
    pub channel: Option<String>,
    /// Gateway-side transaction id
    pub gateway_id: Option<i64>,
    pub gateway_response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    currency: Option<String>,
    channel: Option<String>,
    id: Option<i64>,
    gateway_response: Option<String>,
}

/// Gateway REST client
#[derive(Clone)]
pub struct PaystackClient {
    config: PaystackConfig,
    http: reqwest::Client,
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BillingError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> BillingResult<Self> {
        Self::new(PaystackConfig::from_env()?)
    }

    pub fn config(&self) -> &PaystackConfig {
        &self.config
    }

    /// Initialize a transaction and obtain the checkout handle
    pub async fn initialize_transaction(
        &self,
        request: &InitializeTransaction,
    ) -> BillingResult<TransactionAuthorization> {
        let url = format!("{}/transaction/initialize", self.config.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(request)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(format!("initialize request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                http_status = %status,
                body = %body,
                reference = %request.reference,
                "Gateway rejected transaction initialization"
            );
            return Err(BillingError::Gateway(format!(
                "initialize returned HTTP {status}"
            )));
        }

        let envelope: GatewayEnvelope<TransactionAuthorization> = response
            .json()
            .await
            .map_err(|e| BillingError::Gateway(format!("invalid initialize response: {e}")))?;

        if !envelope.status {
            return Err(BillingError::Gateway(
                envelope
                    .message
                    .unwrap_or_else(|| "initialization declined".to_string()),
            ));
        }

        envelope
            .data
            .ok_or_else(|| BillingError::Gateway("initialize response had no data".to_string()))
    }

    /// Fetch the authoritative status of a transaction by reference
    pub async fn verify_transaction(&self, reference: &str) -> BillingResult<VerifiedTransaction> {
        let url = format!("{}/transaction/verify/{}", self.config.base_url, reference);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| BillingError::Gateway(format!("verify request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(
                http_status = %status,
                reference = %reference,
                "Gateway verify call failed"
            );
            return Err(BillingError::Gateway(format!(
                "verify returned HTTP {status}"
            )));
        }

        let envelope: GatewayEnvelope<VerifyData> = response
            .json()
            .await
            .map_err(|e| BillingError::Gateway(format!("invalid verify response: {e}")))?;

        if !envelope.status {
            return Err(BillingError::Gateway(
                envelope
                    .message
                    .unwrap_or_else(|| "verification declined".to_string()),
            ));
        }

        let data = envelope
            .data
            .ok_or_else(|| BillingError::Gateway("verify response had no data".to_string()))?;

        Ok(VerifiedTransaction {
            status: GatewayTxStatus::parse(&data.status),
            reference: data.reference,
            amount: data.amount,
            currency: data.currency.and_then(|c| c.parse().ok()),
            channel: data.channel,
            gateway_id: data.id,
            gateway_response: data.gateway_response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> PaystackClient {
        PaystackClient::new(PaystackConfig {
            secret_key: "sk_test_secret".to_string(),
            base_url: base_url.to_string(),
            callback_url: "https://example.test/callback".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn init_request(reference: &str) -> InitializeTransaction {
        InitializeTransaction {
            email: "owner@example.test".to_string(),
            amount: 500_000,
            currency: Currency::Ngn,
            reference: reference.to_string(),
            callback_url: "https://example.test/callback".to_string(),
            plan: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(GatewayTxStatus::parse("success"), GatewayTxStatus::Success);
        assert_eq!(GatewayTxStatus::parse("failed"), GatewayTxStatus::Failed);
        assert_eq!(
            GatewayTxStatus::parse("abandoned"),
            GatewayTxStatus::Abandoned
        );
        assert_eq!(GatewayTxStatus::parse("ongoing"), GatewayTxStatus::Pending);
        assert_eq!(
            GatewayTxStatus::parse("reversed"),
            GatewayTxStatus::Other("reversed".to_string())
        );
    }

    #[tokio::test]
    async fn test_initialize_parses_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transaction/initialize")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "status": true,
                    "message": "Authorization URL created",
                    "data": {
                        "authorization_url": "https://checkout.paystack.com/abc123",
                        "access_code": "abc123",
                        "reference": "TIER-REF-1"
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let auth = client
            .initialize_transaction(&init_request("TIER-REF-1"))
            .await
            .unwrap();

        assert_eq!(auth.access_code, "abc123");
        assert_eq!(auth.reference, "TIER-REF-1");
        assert!(auth.authorization_url.contains("checkout.paystack.com"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_initialize_declined_is_gateway_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/transaction/initialize")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": false, "message": "Invalid amount"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .initialize_transaction(&init_request("TIER-REF-2"))
            .await
            .unwrap_err();

        match err {
            BillingError::Gateway(msg) => assert_eq!(msg, "Invalid amount"),
            other => panic!("expected Gateway error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initialize_http_error_is_gateway_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/transaction/initialize")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .initialize_transaction(&init_request("TIER-REF-3"))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Gateway(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_verify_parses_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/transaction/verify/TIER-REF-4")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "status": true,
                    "message": "Verification successful",
                    "data": {
                        "status": "success",
                        "reference": "TIER-REF-4",
                        "amount": 500000,
                        "currency": "NGN",
                        "channel": "card",
                        "id": 987654,
                        "gateway_response": "Successful"
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let tx = client.verify_transaction("TIER-REF-4").await.unwrap();

        assert_eq!(tx.status, GatewayTxStatus::Success);
        assert_eq!(tx.amount, 500_000);
        assert_eq!(tx.currency, Some(Currency::Ngn));
        assert_eq!(tx.channel.as_deref(), Some("card"));
        assert_eq!(tx.gateway_id, Some(987_654));
    }

    #[tokio::test]
    async fn test_verify_parses_abandoned() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/transaction/verify/TIER-REF-5")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "status": true,
                    "data": {
                        "status": "abandoned",
                        "reference": "TIER-REF-5",
                        "amount": 500000
                    }
                }"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let tx = client.verify_transaction("TIER-REF-5").await.unwrap();
        assert_eq!(tx.status, GatewayTxStatus::Abandoned);
    }
}

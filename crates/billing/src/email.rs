//! Billing email notifications
//!
//! Fire-and-forget notifications for trial activation, request
//! approval/rejection, and payment success. Sends are spawned onto the
//! runtime and never awaited by the billing operation that triggered
//! them; a failed notification never rolls back a tier transition.

use serde::Serialize;
use trustlist_shared::SubscriptionTier;

/// Email configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub from_address: String,
}

/// Email sender backed by an HTTP email provider
#[derive(Clone)]
pub struct BillingEmailService {
    config: Option<EmailConfig>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl BillingEmailService {
    /// Build from environment; disabled (no-op with a warning) when the
    /// provider API key is missing
    pub fn from_env() -> Self {
        let config = match std::env::var("RESEND_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => Some(EmailConfig {
                api_key,
                from_address: std::env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "TrustList <no-reply@trustlist.app>".to_string()),
            }),
            _ => None,
        };

        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Send in the background; errors are logged, never propagated
    fn send(&self, to: String, subject: String, html: String) {
        let Some(config) = self.config.clone() else {
            tracing::debug!(to = %to, subject = %subject, "Email disabled, skipping notification");
            return;
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            let body = SendEmailRequest {
                from: &config.from_address,
                to: &to,
                subject: &subject,
                html: &html,
            };

            let result = client
                .post("https://api.resend.com/emails")
                .bearer_auth(&config.api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(to = %to, subject = %subject, "Notification email sent");
                }
                Ok(resp) => {
                    tracing::warn!(
                        to = %to,
                        status = %resp.status(),
                        "Email provider rejected notification"
                    );
                }
                Err(e) => {
                    tracing::warn!(to = %to, error = %e, "Failed to send notification email");
                }
            }
        });
    }

    pub fn send_upgrade_request_received(
        &self,
        to: &str,
        business_name: &str,
        current_tier: SubscriptionTier,
        requested_tier: SubscriptionTier,
    ) {
        let subject = "Tier Upgrade Request Received - TrustList".to_string();
        let html = format!(
            "<h2>Tier Upgrade Request Received</h2>\
             <p>We've received your request to upgrade <strong>{business_name}</strong>.</p>\
             <p><strong>Current Tier:</strong> {current_tier}</p>\
             <p><strong>Requested Tier:</strong> {requested_tier}</p>\
             <p>We'll notify you once your request has been reviewed.</p>"
        );
        self.send(to.to_string(), subject, html);
    }

    pub fn send_upgrade_approved(&self, to: &str, business_name: &str, tier: SubscriptionTier) {
        let subject = "Tier Upgrade Approved - TrustList".to_string();
        let html = format!(
            "<h2>Tier Upgrade Approved</h2>\
             <p>Your tier upgrade request for <strong>{business_name}</strong> has been approved.</p>\
             <p><strong>New Tier:</strong> {tier}</p>\
             <p>Visit your dashboard to explore your new features.</p>"
        );
        self.send(to.to_string(), subject, html);
    }

    pub fn send_upgrade_rejected(&self, to: &str, business_name: &str, reason: &str) {
        let subject = "Tier Upgrade Request Update - TrustList".to_string();
        let html = format!(
            "<h2>Tier Upgrade Request Update</h2>\
             <p>We've reviewed your tier upgrade request for <strong>{business_name}</strong>.</p>\
             <p><strong>Status:</strong> Not Approved</p>\
             <p><strong>Reason:</strong> {reason}</p>\
             <p>If you'd like to provide additional information, please contact support.</p>"
        );
        self.send(to.to_string(), subject, html);
    }

    pub fn send_trial_started(
        &self,
        to: &str,
        business_name: &str,
        tier: SubscriptionTier,
        trial_days: i64,
    ) {
        let subject = format!("{trial_days}-Day Trial Started - TrustList");
        let html = format!(
            "<h2>Trial Started</h2>\
             <p><strong>{business_name}</strong> is now on a {trial_days}-day <strong>{tier}</strong> trial.</p>\
             <p>Visit your dashboard to explore your new features.</p>"
        );
        self.send(to.to_string(), subject, html);
    }

    pub fn send_payment_success(
        &self,
        to: &str,
        business_name: &str,
        tier: SubscriptionTier,
        reference: &str,
    ) {
        let subject = "Payment Successful - Subscription Upgraded - TrustList".to_string();
        let html = format!(
            "<h2>Payment Successful</h2>\
             <p>Your payment has been processed and <strong>{business_name}</strong> has been upgraded.</p>\
             <p><strong>New Tier:</strong> {tier}</p>\
             <p><strong>Payment Reference:</strong> {reference}</p>"
        );
        self.send(to.to_string(), subject, html);
    }

    pub fn send_trial_expired(&self, to: &str, business_name: &str) {
        let subject = "Your Trial Has Ended - TrustList".to_string();
        let html = format!(
            "<h2>Trial Ended</h2>\
             <p>The trial for <strong>{business_name}</strong> has ended and the listing has \
             returned to the Basic tier.</p>\
             <p>Upgrade any time from your dashboard to keep your features.</p>"
        );
        self.send(to.to_string(), subject, html);
    }
}

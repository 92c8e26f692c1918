//! Feature gate
//!
//! Pure mapping from subscription tier to the capability set that
//! gates product features elsewhere in the directory. The match is
//! exhaustive over the tier enum: adding a tier without defining its
//! features is a compile error, never a silent default.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use trustlist_shared::SubscriptionTier;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Capability set derived from a subscription tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub can_respond_to_reviews: bool,
    pub can_access_analytics: bool,
    pub can_access_advanced_analytics: bool,
    pub can_be_featured: bool,
    pub has_api_access: bool,
    pub has_dedicated_support: bool,
    pub verified_badge: bool,
    pub priority_support: bool,
    pub custom_integrations: bool,
    pub white_label: bool,
    pub max_locations: u32,
    /// Days of analytics history retained; `None` = unlimited
    pub analytics_history_days: Option<u32>,
    /// Featured listing slots per month; `None` = unlimited
    pub featured_listings_per_month: Option<u32>,
}

impl FeatureSet {
    /// Derive the capability set for a tier
    ///
    /// Deterministic and side-effect free; called by every gated
    /// operation and by the tier-transition commit to refresh the
    /// stored snapshot.
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        match tier {
            SubscriptionTier::Basic => Self {
                can_respond_to_reviews: false,
                can_access_analytics: false,
                can_access_advanced_analytics: false,
                can_be_featured: false,
                has_api_access: false,
                has_dedicated_support: false,
                verified_badge: false,
                priority_support: false,
                custom_integrations: false,
                white_label: false,
                max_locations: 1,
                analytics_history_days: Some(0),
                featured_listings_per_month: Some(0),
            },
            SubscriptionTier::Verified => Self {
                can_respond_to_reviews: true,
                can_access_analytics: true,
                can_access_advanced_analytics: false,
                can_be_featured: false,
                has_api_access: false,
                has_dedicated_support: false,
                verified_badge: true,
                priority_support: true,
                custom_integrations: false,
                white_label: false,
                max_locations: 1,
                analytics_history_days: Some(90),
                featured_listings_per_month: Some(0),
            },
            SubscriptionTier::Premium => Self {
                can_respond_to_reviews: true,
                can_access_analytics: true,
                can_access_advanced_analytics: true,
                can_be_featured: true,
                has_api_access: true,
                has_dedicated_support: false,
                verified_badge: true,
                priority_support: true,
                custom_integrations: false,
                white_label: false,
                max_locations: 5,
                analytics_history_days: Some(365),
                featured_listings_per_month: Some(3),
            },
            SubscriptionTier::Enterprise => Self {
                can_respond_to_reviews: true,
                can_access_analytics: true,
                can_access_advanced_analytics: true,
                can_be_featured: true,
                has_api_access: true,
                has_dedicated_support: true,
                verified_badge: true,
                priority_support: true,
                custom_integrations: true,
                white_label: true,
                max_locations: 999,
                analytics_history_days: None,
                featured_listings_per_month: None,
            },
        }
    }

    /// JSON snapshot persisted on the business row at transition time
    pub fn to_json(&self) -> serde_json::Value {
        // FeatureSet contains only plain scalars; serialization cannot fail
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// Current capability set for a business
///
/// Always recomputed from the stored tier rather than read from the
/// persisted snapshot, so a stale cache can never grant or deny the
/// wrong capabilities.
pub async fn current_features(pool: &PgPool, business_id: Uuid) -> BillingResult<FeatureSet> {
    let tier: Option<SubscriptionTier> =
        sqlx::query_scalar("SELECT subscription_tier FROM businesses WHERE id = $1")
            .bind(business_id)
            .fetch_optional(pool)
            .await?;

    let tier = tier.ok_or_else(|| BillingError::BusinessNotFound(business_id.to_string()))?;
    Ok(FeatureSet::for_tier(tier))
}

//! Tier catalog
//!
//! The ordered definition of subscription tiers: display metadata,
//! feature set, and a price table keyed by (currency, billing cycle).
//! Built once at process start and passed explicitly to every service
//! so the engine stays testable with injected catalogs.
//!
//! Catalog changes never retroactively alter committed business
//! features: the request amount is snapshotted at creation time, and
//! features are recomputed from the tier at every transition.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use trustlist_shared::{BillingCycle, Currency, SubscriptionTier};

use crate::error::{BillingError, BillingResult};
use crate::features::FeatureSet;

/// Price table for one tier, in minor units (kobo / cents)
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: HashMap<(Currency, BillingCycle), i64>,
}

impl PriceTable {
    pub fn with(mut self, currency: Currency, cycle: BillingCycle, amount: i64) -> Self {
        self.prices.insert((currency, cycle), amount);
        self
    }

    pub fn get(&self, currency: Currency, cycle: BillingCycle) -> Option<i64> {
        self.prices.get(&(currency, cycle)).copied()
    }
}

/// Gateway subscription plan codes for one tier, keyed like prices
#[derive(Debug, Clone, Default)]
pub struct PlanCodes {
    codes: HashMap<(Currency, BillingCycle), String>,
}

impl PlanCodes {
    pub fn with(mut self, currency: Currency, cycle: BillingCycle, code: String) -> Self {
        self.codes.insert((currency, cycle), code);
        self
    }

    pub fn get(&self, currency: Currency, cycle: BillingCycle) -> Option<&str> {
        self.codes.get(&(currency, cycle)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// One tier's full catalog entry
#[derive(Debug, Clone)]
pub struct TierPlan {
    pub tier: SubscriptionTier,
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub popular: bool,
    /// No self-serve price; payment requests for this tier are rejected
    pub custom_pricing: bool,
    /// Whether the trial activator may grant this tier
    pub trial_eligible: bool,
    pub price: PriceTable,
    pub plan_codes: PlanCodes,
    /// Annual savings per currency, in minor units
    pub annual_savings: HashMap<Currency, i64>,
    pub features: FeatureSet,
}

/// Immutable, ordered tier catalog
#[derive(Debug, Clone)]
pub struct TierCatalog {
    plans: Vec<TierPlan>,
}

impl TierCatalog {
    /// Build the standard catalog with gateway plan codes taken from the
    /// environment (`PAYSTACK_PLAN_<TIER>_<CYCLE>` variables)
    pub fn from_env() -> Self {
        let plan_code = |var: &str| std::env::var(var).ok();

        let mut catalog = Self::standard();
        for plan in &mut catalog.plans {
            let mut codes = PlanCodes::default();
            let tier = plan.tier.as_str().to_uppercase();
            if let Some(code) = plan_code(&format!("PAYSTACK_PLAN_{}_MONTHLY", tier)) {
                codes = codes.with(Currency::Ngn, BillingCycle::Monthly, code);
            }
            if let Some(code) = plan_code(&format!("PAYSTACK_PLAN_{}_ANNUAL", tier)) {
                codes = codes.with(Currency::Ngn, BillingCycle::Annual, code);
            }
            if !codes.is_empty() {
                plan.plan_codes = codes;
            }
        }
        catalog
    }

    /// The standard tier definitions with published prices
    pub fn standard() -> Self {
        let basic = TierPlan {
            tier: SubscriptionTier::Basic,
            name: "Basic",
            display_name: "Basic (Free)",
            description: "Free tier for trial users and small businesses",
            popular: false,
            custom_pricing: false,
            trial_eligible: false,
            price: PriceTable::default()
                .with(Currency::Ngn, BillingCycle::Monthly, 0)
                .with(Currency::Ngn, BillingCycle::Annual, 0)
                .with(Currency::Usd, BillingCycle::Monthly, 0)
                .with(Currency::Usd, BillingCycle::Annual, 0),
            plan_codes: PlanCodes::default(),
            annual_savings: HashMap::new(),
            features: FeatureSet::for_tier(SubscriptionTier::Basic),
        };

        let verified = TierPlan {
            tier: SubscriptionTier::Verified,
            name: "Verified",
            display_name: "Verified Business",
            description: "Perfect for SMEs and established businesses",
            popular: true,
            custom_pricing: false,
            trial_eligible: true,
            price: PriceTable::default()
                .with(Currency::Ngn, BillingCycle::Monthly, 500_000)
                .with(Currency::Ngn, BillingCycle::Annual, 5_000_000)
                .with(Currency::Usd, BillingCycle::Monthly, 357)
                .with(Currency::Usd, BillingCycle::Annual, 3_571),
            plan_codes: PlanCodes::default(),
            annual_savings: HashMap::from([(Currency::Ngn, 1_000_000), (Currency::Usd, 71)]),
            features: FeatureSet::for_tier(SubscriptionTier::Verified),
        };

        let premium = TierPlan {
            tier: SubscriptionTier::Premium,
            name: "Premium",
            display_name: "Premium Business",
            description: "For growing businesses and multi-location chains",
            popular: false,
            custom_pricing: false,
            trial_eligible: false,
            price: PriceTable::default()
                .with(Currency::Ngn, BillingCycle::Monthly, 1_500_000)
                .with(Currency::Ngn, BillingCycle::Annual, 15_000_000)
                .with(Currency::Usd, BillingCycle::Monthly, 1_071)
                .with(Currency::Usd, BillingCycle::Annual, 10_714),
            plan_codes: PlanCodes::default(),
            annual_savings: HashMap::from([(Currency::Ngn, 3_000_000), (Currency::Usd, 214)]),
            features: FeatureSet::for_tier(SubscriptionTier::Premium),
        };

        // Enterprise is contact-sales only: a starting monthly price is
        // published for display, but custom_pricing blocks self-serve
        // payment requests entirely.
        let enterprise = TierPlan {
            tier: SubscriptionTier::Enterprise,
            name: "Enterprise",
            display_name: "Enterprise",
            description: "For large corporations with custom needs",
            popular: false,
            custom_pricing: true,
            trial_eligible: false,
            price: PriceTable::default(),
            plan_codes: PlanCodes::default(),
            annual_savings: HashMap::new(),
            features: FeatureSet::for_tier(SubscriptionTier::Enterprise),
        };

        Self {
            plans: vec![basic, verified, premium, enterprise],
        }
    }

    /// All plans, ascending by rank
    pub fn plans(&self) -> &[TierPlan] {
        &self.plans
    }

    pub fn plan(&self, tier: SubscriptionTier) -> &TierPlan {
        // Constructed with exactly one entry per tier, in rank order
        &self.plans[tier.rank() as usize]
    }

    /// Resolve the self-serve price for a tier, failing for tiers with
    /// custom pricing or missing (currency, cycle) entries
    pub fn price(
        &self,
        tier: SubscriptionTier,
        currency: Currency,
        cycle: BillingCycle,
    ) -> BillingResult<i64> {
        let plan = self.plan(tier);
        if plan.custom_pricing {
            return Err(BillingError::NoPriceForCycle {
                tier,
                currency: currency.to_string(),
                cycle: cycle.to_string(),
            });
        }
        plan.price
            .get(currency, cycle)
            .ok_or(BillingError::NoPriceForCycle {
                tier,
                currency: currency.to_string(),
                cycle: cycle.to_string(),
            })
    }

    /// Resolve the gateway plan code for a recurring subscription
    pub fn plan_code(
        &self,
        tier: SubscriptionTier,
        currency: Currency,
        cycle: BillingCycle,
    ) -> BillingResult<&str> {
        self.plan(tier)
            .plan_codes
            .get(currency, cycle)
            .ok_or(BillingError::NoPlanCode {
                tier,
                currency: currency.to_string(),
                cycle: cycle.to_string(),
            })
    }

    pub fn is_trial_eligible(&self, tier: SubscriptionTier) -> bool {
        self.plan(tier).trial_eligible
    }

    /// Shared handle for injection into services
    pub fn into_shared(self) -> Arc<TierCatalog> {
        Arc::new(self)
    }
}

/// One catalog entry formatted for presentation in a single currency
#[derive(Debug, Clone, Serialize)]
pub struct TierListing {
    pub tier: SubscriptionTier,
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub popular: bool,
    pub custom_pricing: bool,
    pub trial_eligible: bool,
    pub currency: Currency,
    pub monthly_amount: Option<i64>,
    pub annual_amount: Option<i64>,
    pub annual_savings: Option<i64>,
    pub features: FeatureSet,
}

impl TierCatalog {
    /// Catalog formatted for the pricing page, priced in one currency
    pub fn list(&self, currency: Currency) -> Vec<TierListing> {
        self.plans
            .iter()
            .map(|plan| TierListing {
                tier: plan.tier,
                name: plan.name,
                display_name: plan.display_name,
                description: plan.description,
                popular: plan.popular,
                custom_pricing: plan.custom_pricing,
                trial_eligible: plan.trial_eligible,
                currency,
                monthly_amount: plan.price.get(currency, BillingCycle::Monthly),
                annual_amount: plan.price.get(currency, BillingCycle::Annual),
                annual_savings: plan.annual_savings.get(&currency).copied(),
                features: plan.features.clone(),
            })
            .collect()
    }
}

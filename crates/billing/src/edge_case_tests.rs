// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Subscription Engine
//!
//! Tests critical boundary conditions in:
//! - Tier ranking (TIER-R01 to TIER-R05)
//! - Catalog pricing (CAT-P01 to CAT-P06)
//! - Feature gate (FEAT-G01 to FEAT-G04)
//! - Payment references (PAY-REF01 to PAY-REF03)
//! - Webhook signatures (WH-S01 to WH-S03)
//! - Error taxonomy (ERR-T01 to ERR-T03)

#[cfg(test)]
mod tier_rank_tests {
    use trustlist_shared::SubscriptionTier;

    // =========================================================================
    // TIER-R01: Same tier never outranks itself
    // =========================================================================
    #[test]
    fn test_same_tier_is_not_an_upgrade() {
        for tier in SubscriptionTier::ALL {
            assert!(!tier.outranks(tier), "{tier} must not outrank itself");
        }
    }

    // =========================================================================
    // TIER-R02: Downgrades never outrank
    // =========================================================================
    #[test]
    fn test_downgrade_never_outranks() {
        assert!(!SubscriptionTier::Basic.outranks(SubscriptionTier::Verified));
        assert!(!SubscriptionTier::Verified.outranks(SubscriptionTier::Enterprise));
        assert!(!SubscriptionTier::Premium.outranks(SubscriptionTier::Enterprise));
    }

    // =========================================================================
    // TIER-R03: Outranking is transitive along the ladder
    // =========================================================================
    #[test]
    fn test_outranking_is_transitive() {
        let all = SubscriptionTier::ALL;
        for (i, lower) in all.iter().enumerate() {
            for higher in &all[i + 1..] {
                assert!(
                    higher.outranks(*lower),
                    "{higher} should outrank {lower}"
                );
            }
        }
    }

    // =========================================================================
    // TIER-R04: Top tier outranks everything below, bottom tier nothing
    // =========================================================================
    #[test]
    fn test_ladder_extremes() {
        for tier in &SubscriptionTier::ALL[..3] {
            assert!(SubscriptionTier::Enterprise.outranks(*tier));
        }
        for tier in SubscriptionTier::ALL {
            assert!(!SubscriptionTier::Basic.outranks(tier));
        }
    }

    // =========================================================================
    // TIER-R05: Round-trip through the wire format preserves rank
    // =========================================================================
    #[test]
    fn test_rank_survives_string_round_trip() {
        for tier in SubscriptionTier::ALL {
            let parsed: SubscriptionTier = tier.as_str().parse().unwrap();
            assert_eq!(parsed.rank(), tier.rank());
        }
    }
}

#[cfg(test)]
mod catalog_pricing_tests {
    use crate::catalog::TierCatalog;
    use crate::error::BillingError;
    use trustlist_shared::{BillingCycle, Currency, SubscriptionTier};

    // =========================================================================
    // CAT-P01: Basic tier is free in every currency and cycle
    // =========================================================================
    #[test]
    fn test_basic_is_free_everywhere() {
        let catalog = TierCatalog::standard();
        for currency in [Currency::Ngn, Currency::Usd] {
            for cycle in [BillingCycle::Monthly, BillingCycle::Annual] {
                assert_eq!(
                    catalog.price(SubscriptionTier::Basic, currency, cycle).unwrap(),
                    0
                );
            }
        }
    }

    // =========================================================================
    // CAT-P02: Enterprise rejects every self-serve price lookup
    // =========================================================================
    #[test]
    fn test_enterprise_rejects_all_price_lookups() {
        let catalog = TierCatalog::standard();
        for currency in [Currency::Ngn, Currency::Usd] {
            for cycle in [BillingCycle::Monthly, BillingCycle::Annual] {
                let err = catalog
                    .price(SubscriptionTier::Enterprise, currency, cycle)
                    .unwrap_err();
                assert!(matches!(err, BillingError::NoPriceForCycle { .. }));
            }
        }
    }

    // =========================================================================
    // CAT-P03: Annual price exceeds monthly price for paid tiers
    // =========================================================================
    #[test]
    fn test_annual_exceeds_monthly_for_paid_tiers() {
        let catalog = TierCatalog::standard();
        for tier in [SubscriptionTier::Verified, SubscriptionTier::Premium] {
            for currency in [Currency::Ngn, Currency::Usd] {
                let monthly = catalog.price(tier, currency, BillingCycle::Monthly).unwrap();
                let annual = catalog.price(tier, currency, BillingCycle::Annual).unwrap();
                assert!(annual > monthly, "{tier}/{currency} annual should cost more");
            }
        }
    }

    // =========================================================================
    // CAT-P04: Annual billing is cheaper than 12 monthly payments
    // =========================================================================
    #[test]
    fn test_annual_saves_against_twelve_months() {
        let catalog = TierCatalog::standard();
        for tier in [SubscriptionTier::Verified, SubscriptionTier::Premium] {
            let monthly = catalog
                .price(tier, Currency::Ngn, BillingCycle::Monthly)
                .unwrap();
            let annual = catalog
                .price(tier, Currency::Ngn, BillingCycle::Annual)
                .unwrap();
            assert!(annual < monthly * 12, "{tier} annual should save money");
        }
    }

    // =========================================================================
    // CAT-P05: Prices grow with rank within one cycle
    // =========================================================================
    #[test]
    fn test_prices_grow_with_rank() {
        let catalog = TierCatalog::standard();
        let prices: Vec<i64> = [
            SubscriptionTier::Basic,
            SubscriptionTier::Verified,
            SubscriptionTier::Premium,
        ]
        .iter()
        .map(|t| {
            catalog
                .price(*t, Currency::Ngn, BillingCycle::Monthly)
                .unwrap()
        })
        .collect();
        assert!(prices.windows(2).all(|w| w[0] < w[1]));
    }

    // =========================================================================
    // CAT-P06: Listing never invents a price for custom-pricing tiers
    // =========================================================================
    #[test]
    fn test_listing_has_no_enterprise_amounts() {
        let catalog = TierCatalog::standard();
        for currency in [Currency::Ngn, Currency::Usd] {
            let listing = catalog.list(currency);
            let enterprise = listing
                .iter()
                .find(|l| l.tier == SubscriptionTier::Enterprise)
                .unwrap();
            assert!(enterprise.monthly_amount.is_none());
            assert!(enterprise.annual_amount.is_none());
        }
    }
}

#[cfg(test)]
mod feature_gate_tests {
    use crate::features::FeatureSet;
    use trustlist_shared::SubscriptionTier;

    // =========================================================================
    // FEAT-G01: All four tiers produce distinct capability sets
    // =========================================================================
    #[test]
    fn test_tiers_have_distinct_feature_sets() {
        let sets: Vec<FeatureSet> = SubscriptionTier::ALL
            .iter()
            .map(|t| FeatureSet::for_tier(*t))
            .collect();
        for i in 0..sets.len() {
            for j in (i + 1)..sets.len() {
                assert_ne!(sets[i], sets[j], "tiers {i} and {j} share a feature set");
            }
        }
    }

    // =========================================================================
    // FEAT-G02: Interleaved calls cannot perturb the result
    // =========================================================================
    #[test]
    fn test_feature_gate_has_no_memory() {
        let before = FeatureSet::for_tier(SubscriptionTier::Verified);
        for tier in SubscriptionTier::ALL {
            let _ = FeatureSet::for_tier(tier);
        }
        let after = FeatureSet::for_tier(SubscriptionTier::Verified);
        assert_eq!(before, after);
    }

    // =========================================================================
    // FEAT-G03: Verified badge tracks the tier boundary exactly
    // =========================================================================
    #[test]
    fn test_badge_granted_above_basic_only() {
        assert!(!FeatureSet::for_tier(SubscriptionTier::Basic).verified_badge);
        for tier in &SubscriptionTier::ALL[1..] {
            assert!(FeatureSet::for_tier(*tier).verified_badge);
        }
    }

    // =========================================================================
    // FEAT-G04: Snapshot JSON carries every capability field
    // =========================================================================
    #[test]
    fn test_snapshot_json_is_complete() {
        let json = FeatureSet::for_tier(SubscriptionTier::Premium).to_json();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("can_respond_to_reviews"));
        assert!(object.contains_key("max_locations"));
        assert!(object.contains_key("featured_listings_per_month"));
        assert_eq!(object.len(), 13);
    }
}

#[cfg(test)]
mod payment_reference_tests {
    use crate::payments::make_reference;
    use uuid::Uuid;

    // =========================================================================
    // PAY-REF01: References embed the request identity
    // =========================================================================
    #[test]
    fn test_reference_embeds_request_id() {
        let request_id = Uuid::new_v4();
        let reference = make_reference(request_id, 1_700_000_000);
        assert!(reference.starts_with("TIER-"));
        assert!(reference.contains(&request_id.simple().to_string()));
    }

    // =========================================================================
    // PAY-REF02: Distinct attempts for one request get distinct references
    // =========================================================================
    #[test]
    fn test_retried_attempts_get_fresh_references() {
        let request_id = Uuid::new_v4();
        let first = make_reference(request_id, 1_700_000_000);
        let second = make_reference(request_id, 1_700_000_060);
        assert_ne!(first, second);
    }

    // =========================================================================
    // PAY-REF03: References contain no whitespace or URL-unsafe chars
    // =========================================================================
    #[test]
    fn test_reference_is_url_safe() {
        let reference = make_reference(Uuid::new_v4(), 1_700_000_000);
        assert!(reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }
}

#[cfg(test)]
mod webhook_signature_tests {
    use crate::webhooks::WebhookHandler;

    // =========================================================================
    // WH-S01: HMAC-SHA512 signatures are 128 hex characters
    // =========================================================================
    #[test]
    fn test_signature_shape() {
        let sig = WebhookHandler::compute_signature("secret", "payload").unwrap();
        assert_eq!(sig.len(), 128);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // =========================================================================
    // WH-S02: Same body + key is deterministic
    // =========================================================================
    #[test]
    fn test_signature_deterministic() {
        let a = WebhookHandler::compute_signature("secret", "body").unwrap();
        let b = WebhookHandler::compute_signature("secret", "body").unwrap();
        assert_eq!(a, b);
    }

    // =========================================================================
    // WH-S03: One changed byte changes the signature
    // =========================================================================
    #[test]
    fn test_signature_sensitive_to_body() {
        let a = WebhookHandler::compute_signature("secret", "body").unwrap();
        let b = WebhookHandler::compute_signature("secret", "bodY").unwrap();
        assert_ne!(a, b);
    }
}

#[cfg(test)]
mod error_taxonomy_tests {
    use crate::error::BillingError;
    use trustlist_shared::{RequestStatus, SubscriptionTier};

    // =========================================================================
    // ERR-T01: Gateway failures are retryable, conflicts are not
    // =========================================================================
    #[test]
    fn test_retryability_classification() {
        assert!(BillingError::Gateway("timeout".into()).is_retryable());
        assert!(BillingError::GatewayPending("abandoned".into()).is_retryable());
        assert!(BillingError::ConcurrentModification("raced".into()).is_retryable());

        assert!(!BillingError::DuplicatePendingRequest.is_retryable());
        assert!(!BillingError::Forbidden.is_retryable());
        assert!(!BillingError::AlreadyResolved {
            current: RequestStatus::Approved
        }
        .is_retryable());
    }

    // =========================================================================
    // ERR-T02: Conflict errors surface the authoritative state
    // =========================================================================
    #[test]
    fn test_already_resolved_reports_current_status() {
        let err = BillingError::AlreadyResolved {
            current: RequestStatus::Rejected,
        };
        assert!(err.to_string().contains("rejected"));
    }

    // =========================================================================
    // ERR-T03: Transition errors name both tiers
    // =========================================================================
    #[test]
    fn test_invalid_transition_names_both_tiers() {
        let err = BillingError::InvalidTransition {
            from: SubscriptionTier::Premium,
            to: SubscriptionTier::Verified,
        };
        let message = err.to_string();
        assert!(message.contains("premium"));
        assert!(message.contains("verified"));
    }
}

//! Subscription pricing map.
//!
//! A static table from provider price ids to credit packages, plus an
//! optional per-tier promo bonus applied when the global promo flag is on.
//! The webhook processor consults this table to decide how many credits a
//! subscription event grants; the table itself never mutates state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Subscription package tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageTier {
    /// Entry tier.
    Starter,
    /// Mid tier.
    Creator,
    /// Top tier.
    Pro,
}

impl PackageTier {
    /// Parse a tier label as carried in checkout metadata.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "starter" => Some(Self::Starter),
            "creator" => Some(Self::Creator),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }
}

/// What a subscription price buys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPackage {
    /// Base credits granted per billing period.
    pub credits: i64,
    /// Price in cents.
    pub price_cents: i64,
    /// Package tier label.
    pub tier: PackageTier,
}

/// Static mapping from price ids to credit packages.
#[derive(Debug, Clone)]
pub struct PricingTable {
    packages: HashMap<String, CreditPackage>,
    promo_bonus: HashMap<PackageTier, i64>,
    promo_enabled: bool,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_price_ids(
            "price_starter_monthly",
            "price_creator_monthly",
            "price_pro_monthly",
            false,
        )
    }
}

impl PricingTable {
    /// Build the table with concrete provider price ids.
    #[must_use]
    pub fn with_price_ids(
        starter_price_id: impl Into<String>,
        creator_price_id: impl Into<String>,
        pro_price_id: impl Into<String>,
        promo_enabled: bool,
    ) -> Self {
        let mut packages = HashMap::new();
        packages.insert(
            starter_price_id.into(),
            CreditPackage {
                credits: 10_000,
                price_cents: 999,
                tier: PackageTier::Starter,
            },
        );
        packages.insert(
            creator_price_id.into(),
            CreditPackage {
                credits: 30_000,
                price_cents: 2499,
                tier: PackageTier::Creator,
            },
        );
        packages.insert(
            pro_price_id.into(),
            CreditPackage {
                credits: 75_000,
                price_cents: 4999,
                tier: PackageTier::Pro,
            },
        );

        let mut promo_bonus = HashMap::new();
        promo_bonus.insert(PackageTier::Starter, 2000);
        promo_bonus.insert(PackageTier::Creator, 7500);
        promo_bonus.insert(PackageTier::Pro, 20_000);

        Self {
            packages,
            promo_bonus,
            promo_enabled,
        }
    }

    /// Look up the package for a provider price id.
    #[must_use]
    pub fn package_for_price(&self, price_id: &str) -> Option<&CreditPackage> {
        self.packages.get(price_id)
    }

    /// Promo bonus for a tier; zero when the promo flag is off.
    #[must_use]
    pub fn promo_bonus(&self, tier: PackageTier) -> i64 {
        if self.promo_enabled {
            self.promo_bonus.get(&tier).copied().unwrap_or(0)
        } else {
            0
        }
    }

    /// Total grant for a price id: base credits plus any active promo bonus.
    ///
    /// Returns `None` for unmapped price ids; the caller treats that as a
    /// data-integrity problem, never as a zero grant.
    #[must_use]
    pub fn grant_amount(&self, price_id: &str) -> Option<i64> {
        self.packages
            .get(price_id)
            .map(|pkg| pkg.credits + self.promo_bonus(pkg.tier))
    }

    /// Whether the global promo flag is enabled.
    #[must_use]
    pub const fn promo_enabled(&self) -> bool {
        self.promo_enabled
    }
}

//! Customer subscription snapshots.
//!
//! The cache mirrors the payment provider's view of each customer. Every
//! relevant webhook overwrites the snapshot wholesale; there are no partial
//! updates, so staleness (not corruption) is the only failure mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription status as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active and paid.
    Active,
    /// Payment failed; provider is retrying.
    PastDue,
    /// Subscription was canceled.
    Canceled,
    /// Subscription is paused.
    Paused,
    /// No subscription on record.
    None,
    /// A provider status voxbill does not model.
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Map a provider status string onto the local enum.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" | "trialing" => Self::Active,
            "past_due" | "unpaid" => Self::PastDue,
            "canceled" | "incomplete_expired" => Self::Canceled,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }
}

/// Last-known subscription state for one external customer.
///
/// Created and overwritten wholesale on every relevant webhook event; a
/// snapshot, not an event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSubscriptionState {
    /// The provider's customer id.
    pub customer_id: String,

    /// The provider's subscription id, if one exists.
    pub subscription_id: Option<String>,

    /// Current subscription status.
    pub status: SubscriptionStatus,

    /// Price id of the current subscription item.
    pub price_id: Option<String>,

    /// Start of the current billing period.
    pub current_period_start: Option<DateTime<Utc>>,

    /// End of the current billing period.
    pub current_period_end: Option<DateTime<Utc>>,

    /// Whether the subscription will end at the period boundary.
    pub cancel_at_period_end: bool,

    /// Last-known payment method summary.
    pub payment_method: Option<String>,

    /// When this snapshot was written.
    pub updated_at: DateTime<Utc>,
}

impl CustomerSubscriptionState {
    /// Snapshot for a customer with no subscription.
    #[must_use]
    pub fn none(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            subscription_id: None,
            status: SubscriptionStatus::None,
            price_id: None,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            payment_method: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether the snapshot describes an active subscription.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

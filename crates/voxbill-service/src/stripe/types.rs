//! Stripe API types.
//!
//! Only the fields the webhook processor and the read API actually use are
//! modeled; everything else in Stripe's objects is ignored on deserialize.

use serde::Deserialize;

/// Stripe customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Stripe customer ID.
    pub id: String,
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Metadata attached to the customer. `user_id` carries our internal
    /// user id, set when the customer is created at checkout.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Customer {
    /// Our internal user id, if the customer carries one.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("user_id").and_then(|v| v.as_str())
    }
}

/// Stripe Checkout session object, as delivered in
/// `checkout.session.completed` events.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Session mode: "payment" for one-time topups, "subscription" for
    /// recurring plans.
    #[serde(default)]
    pub mode: Option<String>,
    /// Stripe customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Payment intent ID (payment mode only).
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Subscription ID (subscription mode only).
    #[serde(default)]
    pub subscription: Option<String>,
    /// Payment status ("paid", "unpaid", "no_payment_required").
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Checkout metadata set by the storefront.
    #[serde(default)]
    pub metadata: Option<CheckoutMetadata>,
}

/// Metadata attached to checkout sessions by the storefront.
///
/// All fields are strings on the wire (Stripe metadata values are always
/// strings); numeric fields are parsed at the point of use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutMetadata {
    /// Purchase kind; "topup" marks a one-time credit purchase.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Internal user ID.
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    /// Credit amount purchased.
    #[serde(default)]
    pub credits: Option<String>,
    /// Dollar amount paid, for the ledger description.
    #[serde(rename = "dollarAmount", default)]
    pub dollar_amount: Option<String>,
    /// Package label ("starter", "creator", "pro").
    #[serde(rename = "packageType", default)]
    pub package_type: Option<String>,
    /// Promo marker, recorded in transaction metadata only.
    #[serde(default)]
    pub promo: Option<String>,
}

/// Stripe subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: String,
    /// Stripe customer ID.
    pub customer: String,
    /// Provider status string ("active", "trialing", "past_due", ...).
    pub status: String,
    /// Whether the subscription cancels at the period end.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Current period start (Unix seconds).
    #[serde(default)]
    pub current_period_start: Option<i64>,
    /// Current period end (Unix seconds).
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Subscription items; the first item's price id is the plan.
    #[serde(default)]
    pub items: SubscriptionItems,
    /// Default payment method id.
    #[serde(default)]
    pub default_payment_method: Option<String>,
}

impl Subscription {
    /// The price id of the subscription's first item, if any.
    #[must_use]
    pub fn price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .map(|item| item.price.id.as_str())
    }
}

/// Subscription items container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    /// Item list.
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// A single subscription item.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    /// The item's price.
    pub price: Price,
}

/// Stripe price object (id only).
#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    /// Price ID.
    pub id: String,
}

/// Stripe list response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    /// Data items.
    pub data: Vec<T>,
    /// Whether there are more items.
    #[serde(default)]
    pub has_more: bool,
}

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object; shape depends on the event type.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}

//! Stripe webhook event processor.
//!
//! Each event is processed independently and must be safe to reprocess:
//! ledger writes are idempotent per derived key, and customer snapshots are
//! overwritten wholesale from freshly fetched provider state (never from the
//! event payload, which may describe an earlier state).
//!
//! A verified webhook is always acknowledged with `received: true`, even
//! when internal handling fails. Failing the response would make Stripe
//! retry indefinitely for problems retries cannot fix; the failure is
//! instead logged at error level with enough context for reconciliation.
//! Only an invalid signature or an unparseable body produces a 400.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use voxbill_core::{
    CustomerSubscriptionState, SubscriptionStatus, TransactionType, UserId,
};

use crate::error::ApiError;
use crate::ledger::AddCreditsOptions;
use crate::state::AppState;
use crate::stripe::types::{CheckoutSession, Subscription, WebhookEvent};
use crate::stripe::StripeClient;

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
}

/// Internal handling failure; logged, never returned to Stripe.
#[derive(Debug, thiserror::Error)]
enum WebhookFailure {
    /// The event is missing data it is required to carry.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    /// The provider customer cannot be mapped to an internal user.
    #[error("unmapped customer {0}")]
    UnmappedCustomer(String),

    /// The Stripe read API is unavailable or errored.
    #[error("upstream: {0}")]
    Upstream(#[from] crate::stripe::StripeError),

    /// The ledger or the customer cache failed.
    #[error("store: {0}")]
    Store(#[from] voxbill_store::StoreError),
}

/// Handle Stripe webhooks.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    if state.config.stripe_webhook_secret.is_some() {
        let sig =
            signature.ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

        let stripe = state.stripe.as_ref().ok_or_else(|| {
            ApiError::Internal("Webhook secret configured without a Stripe client".into())
        })?;

        stripe.verify_webhook_signature(&body, sig).map_err(|e| {
            tracing::warn!(error = %e, "Rejected Stripe webhook: invalid signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;
    } else {
        // Development mode only.
        tracing::warn!("Stripe webhook secret not configured - skipping signature verification");
    }

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    let result = match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(&state, &event).await,
        "customer.subscription.created" | "customer.subscription.updated" => {
            handle_subscription_changed(&state, &event).await
        }
        "customer.subscription.deleted" | "customer.subscription.paused" => {
            handle_subscription_ended(&state, &event).await
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
            Ok(())
        }
    };

    // Operator-visible channel for anything the processor could not apply.
    // The webhook is acknowledged regardless; Stripe retries cannot fix a
    // data problem, and the next delivery re-fetches fresh state anyway.
    if let Err(failure) = result {
        tracing::error!(
            event_type = %event.event_type,
            event_id = %event.id,
            error = %failure,
            "Stripe webhook handling failed; acknowledged for manual reconciliation"
        );
    }

    Ok(Json(WebhookResponse { received: true }))
}

async fn handle_checkout_completed(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(), WebhookFailure> {
    let session: CheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| WebhookFailure::DataIntegrity(format!("malformed checkout session: {e}")))?;

    match session.mode.as_deref() {
        Some("payment") => handle_topup_checkout(state, event, &session),
        Some("subscription") => handle_subscription_checkout(state, event, &session).await,
        other => {
            tracing::debug!(
                session_id = %session.id,
                mode = ?other,
                "Ignoring checkout session with unsupported mode"
            );
            Ok(())
        }
    }
}

/// One-time credit top-up: all required facts live in the session metadata
/// set by the storefront at checkout creation time.
fn handle_topup_checkout(
    state: &AppState,
    event: &WebhookEvent,
    session: &CheckoutSession,
) -> Result<(), WebhookFailure> {
    if session.payment_status.as_deref() != Some("paid") {
        tracing::info!(
            session_id = %session.id,
            payment_status = ?session.payment_status,
            "Checkout session not paid yet, skipping"
        );
        return Ok(());
    }

    let metadata = session
        .metadata
        .as_ref()
        .ok_or_else(|| missing_field(session, "metadata"))?;

    if metadata.kind.as_deref() != Some("topup") {
        tracing::debug!(
            session_id = %session.id,
            kind = ?metadata.kind,
            "Payment-mode checkout without topup metadata, skipping"
        );
        return Ok(());
    }

    // Missing required metadata is an inconsistency to reconcile by hand,
    // never something to coerce to a default.
    let user_id: UserId = metadata
        .user_id
        .as_deref()
        .ok_or_else(|| missing_field(session, "metadata.userId"))?
        .parse()
        .map_err(|_| {
            WebhookFailure::DataIntegrity(format!(
                "invalid userId in session {} metadata",
                session.id
            ))
        })?;

    let credits: i64 = metadata
        .credits
        .as_deref()
        .ok_or_else(|| missing_field(session, "metadata.credits"))?
        .parse()
        .map_err(|_| {
            WebhookFailure::DataIntegrity(format!(
                "non-numeric credits in session {} metadata",
                session.id
            ))
        })?;

    let dollar_amount = metadata
        .dollar_amount
        .as_deref()
        .ok_or_else(|| missing_field(session, "metadata.dollarAmount"))?;

    let package_type = metadata
        .package_type
        .as_deref()
        .ok_or_else(|| missing_field(session, "metadata.packageType"))?;

    let payment_intent = session
        .payment_intent
        .as_deref()
        .ok_or_else(|| missing_field(session, "payment_intent"))?;

    let outcome = state.ledger.add_credits(
        &user_id,
        credits,
        TransactionType::Topup,
        &format!("Top-up of {credits} credits (${dollar_amount}, {package_type})"),
        AddCreditsOptions {
            reference_id: Some(payment_intent.to_string()),
            reference_type: Some("payment_intent".into()),
            metadata: Some(serde_json::json!({
                "session_id": session.id,
                "package_type": package_type,
                "promo": metadata.promo,
            })),
            idempotency_key: Some(format!("topup_{payment_intent}")),
            created_by: Some("stripe_webhook".into()),
            ..AddCreditsOptions::default()
        },
    )?;

    tracing::info!(
        event_id = %event.id,
        user_id = %user_id,
        credits = %credits,
        duplicate = %outcome.is_duplicate(),
        "Processed topup checkout"
    );

    Ok(())
}

/// Subscription checkout: the grant amount comes from the pricing table,
/// keyed by the price on the customer's current subscription as reported by
/// the provider read API.
async fn handle_subscription_checkout(
    state: &AppState,
    event: &WebhookEvent,
    session: &CheckoutSession,
) -> Result<(), WebhookFailure> {
    let customer_id = session
        .customer
        .as_deref()
        .ok_or_else(|| missing_field(session, "customer"))?;

    let stripe = require_stripe(state)?;
    let subscription = fetch_current_subscription(stripe, customer_id, session.subscription.as_deref())
        .await?
        .ok_or_else(|| {
            WebhookFailure::DataIntegrity(format!(
                "no subscription found for customer {customer_id} after checkout"
            ))
        })?;

    state
        .store
        .put_customer_state(&snapshot_from(customer_id, &subscription))?;

    let user_id = resolve_user(stripe, customer_id).await?;
    grant_subscription_credits(state, event, &user_id, &subscription)
}

/// `customer.subscription.created` / `.updated`.
///
/// Both funnel through the same idempotent grant keyed per subscription id,
/// so redundant delivery or reordering cannot double-grant.
async fn handle_subscription_changed(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(), WebhookFailure> {
    let customer_id = event_customer_id(event)?;
    let stripe = require_stripe(state)?;

    // The event names the subscription it describes (`data.object.id`);
    // prefer that one over whatever else the customer carries.
    let subscription =
        fetch_current_subscription(stripe, &customer_id, event_subscription_id(event)).await?;
    let snapshot = match &subscription {
        Some(sub) => snapshot_from(&customer_id, sub),
        None => CustomerSubscriptionState::none(&customer_id),
    };
    state.store.put_customer_state(&snapshot)?;

    let Some(subscription) = subscription else {
        return Ok(());
    };
    if !snapshot.is_active() {
        tracing::info!(
            customer_id = %customer_id,
            subscription_id = %subscription.id,
            status = ?snapshot.status,
            "Subscription not active, snapshot updated without grant"
        );
        return Ok(());
    }

    let user_id = resolve_user(stripe, &customer_id).await?;
    grant_subscription_credits(state, event, &user_id, &subscription)
}

/// `customer.subscription.deleted` / `.paused`: snapshot only, no credits.
async fn handle_subscription_ended(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(), WebhookFailure> {
    let customer_id = event_customer_id(event)?;
    let stripe = require_stripe(state)?;

    let subscription =
        fetch_current_subscription(stripe, &customer_id, event_subscription_id(event)).await?;
    let snapshot = match &subscription {
        Some(sub) => snapshot_from(&customer_id, sub),
        None => CustomerSubscriptionState::none(&customer_id),
    };
    state.store.put_customer_state(&snapshot)?;

    tracing::info!(
        customer_id = %customer_id,
        status = ?snapshot.status,
        "Subscription ended, snapshot updated"
    );

    Ok(())
}

fn grant_subscription_credits(
    state: &AppState,
    event: &WebhookEvent,
    user_id: &UserId,
    subscription: &Subscription,
) -> Result<(), WebhookFailure> {
    let price_id = subscription.price_id().ok_or_else(|| {
        WebhookFailure::DataIntegrity(format!(
            "subscription {} has no price items",
            subscription.id
        ))
    })?;

    let amount = state.config.pricing.grant_amount(price_id).ok_or_else(|| {
        WebhookFailure::DataIntegrity(format!(
            "unmapped price id {price_id} on subscription {}",
            subscription.id
        ))
    })?;

    let outcome = state.ledger.add_credits(
        user_id,
        amount,
        TransactionType::SubscriptionGrant,
        &format!("Subscription credits ({price_id})"),
        AddCreditsOptions {
            reference_id: Some(subscription.id.clone()),
            reference_type: Some("subscription".into()),
            subscription_id: Some(subscription.id.clone()),
            idempotency_key: Some(format!("sub_{}_{user_id}", subscription.id)),
            created_by: Some("stripe_webhook".into()),
            ..AddCreditsOptions::default()
        },
    )?;

    tracing::info!(
        event_id = %event.id,
        user_id = %user_id,
        subscription_id = %subscription.id,
        amount = %amount,
        duplicate = %outcome.is_duplicate(),
        "Processed subscription grant"
    );

    Ok(())
}

/// Fetch the customer's current subscription from the provider.
///
/// When the triggering event names a subscription id, that one is preferred;
/// otherwise the first active subscription wins, then the newest of any
/// status. The event payload's embedded subscription state is never used.
async fn fetch_current_subscription(
    stripe: &StripeClient,
    customer_id: &str,
    preferred_id: Option<&str>,
) -> Result<Option<Subscription>, WebhookFailure> {
    let list = stripe.list_subscriptions(customer_id).await?;

    if let Some(id) = preferred_id {
        if let Some(sub) = list.data.iter().find(|s| s.id == id) {
            return Ok(Some(sub.clone()));
        }
    }

    let active = list
        .data
        .iter()
        .find(|s| SubscriptionStatus::from_provider(&s.status) == SubscriptionStatus::Active);

    Ok(active.or_else(|| list.data.first()).cloned())
}

/// Map a provider customer onto an internal user via the `user_id` the
/// storefront stamps into customer metadata.
async fn resolve_user(
    stripe: &StripeClient,
    customer_id: &str,
) -> Result<UserId, WebhookFailure> {
    let customer = stripe
        .get_customer(customer_id)
        .await?
        .ok_or_else(|| WebhookFailure::UnmappedCustomer(customer_id.to_string()))?;

    customer
        .user_id()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| WebhookFailure::UnmappedCustomer(customer_id.to_string()))
}

fn snapshot_from(customer_id: &str, subscription: &Subscription) -> CustomerSubscriptionState {
    CustomerSubscriptionState {
        customer_id: customer_id.to_string(),
        subscription_id: Some(subscription.id.clone()),
        status: SubscriptionStatus::from_provider(&subscription.status),
        price_id: subscription.price_id().map(String::from),
        current_period_start: subscription
            .current_period_start
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        current_period_end: subscription
            .current_period_end
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        cancel_at_period_end: subscription.cancel_at_period_end,
        payment_method: subscription.default_payment_method.clone(),
        updated_at: Utc::now(),
    }
}

/// The subscription id carried by `customer.subscription.*` events.
fn event_subscription_id(event: &WebhookEvent) -> Option<&str> {
    event.data.object.get("id").and_then(|v| v.as_str())
}

fn event_customer_id(event: &WebhookEvent) -> Result<String, WebhookFailure> {
    event
        .data
        .object
        .get("customer")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            WebhookFailure::DataIntegrity(format!("event {} has no customer id", event.id))
        })
}

fn require_stripe(state: &AppState) -> Result<&StripeClient, WebhookFailure> {
    state
        .stripe
        .as_deref()
        .ok_or_else(|| WebhookFailure::DataIntegrity("Stripe client not configured".into()))
}

fn missing_field(session: &CheckoutSession, field: &str) -> WebhookFailure {
    WebhookFailure::DataIntegrity(format!("session {} missing {field}", session.id))
}

//! Subscription snapshot read utilities.
//!
//! Both endpoints scan the full customer-state cache. The cache is small
//! and these are administrative reads, not per-request hot paths.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Active subscription statistics.
#[derive(Debug, Serialize)]
pub struct SubscriptionStatsResponse {
    /// Number of customers with an active subscription.
    pub active_subscriptions: usize,
    /// Total customer snapshots on record.
    pub total_customers: usize,
}

/// Count currently active subscriptions (service auth).
pub async fn subscription_stats(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
) -> Result<Json<SubscriptionStatsResponse>, ApiError> {
    let snapshots = state.store.scan_customer_states()?;
    let active_subscriptions = snapshots.iter().filter(|s| s.is_active()).count();

    Ok(Json(SubscriptionStatsResponse {
        active_subscriptions,
        total_customers: snapshots.len(),
    }))
}

/// The next subscription due for renewal.
#[derive(Debug, Serialize)]
pub struct NextRenewalResponse {
    /// Customer whose subscription renews next, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    /// The renewing subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// When it renews (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renews_at: Option<String>,
}

/// Find the earliest upcoming renewal among active, unexpired subscriptions
/// (service auth).
pub async fn next_renewal(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
) -> Result<Json<NextRenewalResponse>, ApiError> {
    let now = Utc::now();
    let snapshots = state.store.scan_customer_states()?;

    let next = snapshots
        .into_iter()
        .filter(|s| s.is_active() && !s.cancel_at_period_end)
        .filter_map(|s| s.current_period_end.map(|end| (s, end)))
        .filter(|(_, end)| *end > now)
        .min_by_key(|(_, end)| *end);

    let response = match next {
        Some((snapshot, end)) => NextRenewalResponse {
            customer_id: Some(snapshot.customer_id),
            subscription_id: snapshot.subscription_id,
            renews_at: Some(end.to_rfc3339()),
        },
        None => NextRenewalResponse {
            customer_id: None,
            subscription_id: None,
            renews_at: None,
        },
    };

    Ok(Json(response))
}

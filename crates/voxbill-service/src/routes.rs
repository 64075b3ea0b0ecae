//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{credits, health, subscriptions, webhooks};
use crate::state::AppState;

/// Maximum concurrent in-flight requests on the `/v1` API surface.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Credits (user auth)
/// - `GET /v1/credits/balance` - Get current balance
/// - `GET /v1/credits/transactions` - List transaction history
///
/// ## Credit operations (Service API key auth)
/// - `POST /v1/credits/add` - Add credits
/// - `POST /v1/credits/deduct` - Deduct credits
/// - `POST /v1/credits/refund` - Refund a transaction
/// - `GET /v1/credits/freemium` - Freemium limit check
///
/// ## Subscriptions (Service API key auth)
/// - `GET /v1/subscriptions/stats` - Active subscription count
/// - `GET /v1/subscriptions/next-renewal` - Earliest upcoming renewal
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // Capped API surface: caller-facing routes share one concurrency limit.
    let api_routes = Router::new()
        // Credits (user reads)
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        // Credit operations (service auth)
        .route("/credits/add", post(credits::add_credits))
        .route("/credits/deduct", post(credits::deduct_credits))
        .route("/credits/refund", post(credits::refund_transaction))
        .route("/credits/freemium", get(credits::freemium_check))
        // Subscriptions (service auth)
        .route(
            "/subscriptions/stats",
            get(subscriptions::subscription_stats),
        )
        .route(
            "/subscriptions/next-renewal",
            get(subscriptions::next_renewal),
        )
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, unlimited)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks (unlimited; paced by the payment provider)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

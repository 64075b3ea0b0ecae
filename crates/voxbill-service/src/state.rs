//! Shared application state.

use std::sync::Arc;

use voxbill_store::Store;

use crate::config::ServiceConfig;
use crate::ledger::Ledger;
use crate::stripe::StripeClient;

/// Application state shared across all handlers.
pub struct AppState {
    /// The transaction store.
    pub store: Arc<dyn Store>,
    /// Credit operations over the store.
    pub ledger: Ledger,
    /// Service configuration.
    pub config: ServiceConfig,
    /// Stripe client, present when an API key is configured.
    pub stripe: Option<Arc<StripeClient>>,
}

impl AppState {
    /// Create application state from a store and configuration.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let stripe = config.stripe_api_key.as_ref().map(|key| {
            Arc::new(StripeClient::new(
                key.clone(),
                config.stripe_webhook_secret.clone(),
            ))
        });

        Self {
            ledger: Ledger::new(Arc::clone(&store)),
            store,
            config,
            stripe,
        }
    }

    /// Replace the Stripe client, for tests that point it at a mock server.
    #[must_use]
    pub fn with_stripe(mut self, stripe: StripeClient) -> Self {
        self.stripe = Some(Arc::new(stripe));
        self
    }
}

//! Stripe integration.
//!
//! Stripe provides:
//! - Webhook delivery for checkout and subscription lifecycle events
//! - The read API used to re-fetch current customer/subscription state
//!   (event payloads are never trusted as current state)

pub mod client;
pub mod types;

pub use client::{StripeClient, StripeError};
pub use types::{
    CheckoutMetadata, CheckoutSession, Customer, StripeList, Subscription, WebhookEvent,
};

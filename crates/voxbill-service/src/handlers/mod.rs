//! API handlers.

pub mod credits;
pub mod health;
pub mod subscriptions;
pub mod webhooks;

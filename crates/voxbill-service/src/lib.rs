//! Voxbill HTTP API service.
//!
//! This crate provides the HTTP surface over the credit ledger:
//!
//! - Balance reads and transaction history
//! - Credit operations (add, deduct, refund) for trusted services
//! - The Stripe webhook event processor
//! - Customer subscription state utilities
//!
//! # Authentication
//!
//! Two authentication methods:
//!
//! 1. **User tokens** - for end-user reads (balance, history)
//! 2. **Service API keys** - for service-to-service credit operations

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for routing consistency

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{AddCreditsOptions, DeductOptions, Ledger};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};

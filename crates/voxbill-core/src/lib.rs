//! Core types for the voxbill credit ledger.
//!
//! This crate provides the foundational types used throughout voxbill:
//!
//! - **Identifiers**: `UserId`, `TransactionId`
//! - **Ledger**: `CreditTransaction`, `TransactionDraft`, `TransactionType`,
//!   `Direction`, `CachedBalance`
//! - **Customers**: `CustomerSubscriptionState`, `SubscriptionStatus`
//! - **Pricing**: `PricingTable`, `CreditPackage`, `PackageTier`
//!
//! # Credit Unit
//!
//! Credits are stored as `i64` integers; one credit is the smallest unit the
//! product meters. Amounts on transactions are always positive magnitudes;
//! the sign of a balance change comes from the transaction's `Direction`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod customer;
pub mod ids;
pub mod ledger;
pub mod pricing;

pub use customer::{CustomerSubscriptionState, SubscriptionStatus};
pub use ids::{IdError, TransactionId, UserId};
pub use ledger::{
    fold_balance, CachedBalance, CreditTransaction, Direction, TransactionDraft, TransactionType,
    FREEMIUM_USAGE_LIMIT,
};
pub use pricing::{CreditPackage, PackageTier, PricingTable};

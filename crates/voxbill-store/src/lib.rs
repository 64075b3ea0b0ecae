//! `RocksDB` storage layer for the voxbill credit ledger.
//!
//! The transaction log is the source of truth; everything else (cached
//! balances, customer snapshots) is derived or mirrored state.
//!
//! # Architecture
//!
//! Column families:
//!
//! - `transactions`: ledger rows, keyed by `transaction_id` (ULID)
//! - `transactions_by_user`: index for listing a user's rows in time order
//! - `idempotency_keys`: idempotency key -> transaction id
//! - `balances`: materialized balance per user (cache only)
//! - `customer_state`: provider customer id -> subscription snapshot
//!
//! # Atomicity
//!
//! `append` is the only write path for ledger rows. It holds a per-user
//! lock across the idempotency check, the balance fold, and the batch
//! write, so two racing debits can never both observe the same starting
//! balance and both commit past it. Drafts carrying an idempotency key
//! additionally hold a per-key lock, since key uniqueness spans users.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use voxbill_core::{
    CachedBalance, CreditTransaction, CustomerSubscriptionState, TransactionDraft, TransactionId,
    UserId,
};

/// Result of appending a drafted transaction.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// A new transaction was written.
    Applied(CreditTransaction),
    /// The draft's idempotency key was already used; the original
    /// transaction is returned unchanged and nothing was written.
    Duplicate(CreditTransaction),
}

impl AppendOutcome {
    /// The transaction this append resolved to, new or pre-existing.
    #[must_use]
    pub const fn transaction(&self) -> &CreditTransaction {
        match self {
            Self::Applied(tx) | Self::Duplicate(tx) => tx,
        }
    }

    /// Consume the outcome, returning the transaction.
    #[must_use]
    pub fn into_transaction(self) -> CreditTransaction {
        match self {
            Self::Applied(tx) | Self::Duplicate(tx) => tx,
        }
    }

    /// Whether this append was an idempotent replay.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// The storage trait defining all ledger and cache operations.
///
/// A narrow get/scan/append interface so the ledger can be backed by any
/// compliant engine; handlers and the webhook processor only ever see
/// `Arc<dyn Store>`.
pub trait Store: Send + Sync {
    // =========================================================================
    // Ledger
    // =========================================================================

    /// Append a drafted transaction atomically.
    ///
    /// Inside one atomic unit: resolves the idempotency key (replay returns
    /// the original row), folds the user's authoritative balance, rejects a
    /// debit that would drive it negative, and writes the row, the user
    /// index, the idempotency key, and the refreshed cached balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::InsufficientCredits` if a debit exceeds the balance.
    /// - `StoreError::Database` / `StoreError::Serialization` on engine
    ///   failures.
    fn append(&self, draft: TransactionDraft) -> Result<AppendOutcome>;

    /// Get a transaction by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>>;

    /// Look up the transaction recorded under an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<CreditTransaction>>;

    /// List a user's transactions, newest first, with pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;

    /// All of a user's transactions in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn all_transactions(&self, user_id: &UserId) -> Result<Vec<CreditTransaction>>;

    /// Fold the user's transaction history into their authoritative
    /// balance, floored at zero. Zero transactions means balance 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn compute_balance(&self, user_id: &UserId) -> Result<i64>;

    // =========================================================================
    // Cached balances
    // =========================================================================

    /// Read the materialized balance row, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_cached_balance(&self, user_id: &UserId) -> Result<Option<CachedBalance>>;

    /// Overwrite the materialized balance row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_cached_balance(&self, balance: &CachedBalance) -> Result<()>;

    // =========================================================================
    // Customer state
    // =========================================================================

    /// Overwrite a customer's subscription snapshot (last-write-wins).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_customer_state(&self, state: &CustomerSubscriptionState) -> Result<()>;

    /// Get a customer's subscription snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_customer_state(&self, customer_id: &str) -> Result<Option<CustomerSubscriptionState>>;

    /// Scan all customer snapshots.
    ///
    /// Full scan; acceptable because the cache is small and the callers are
    /// administrative utilities, not per-request hot paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn scan_customer_states(&self) -> Result<Vec<CustomerSubscriptionState>>;
}

//! Credit operations over the transaction store.
//!
//! `Ledger` is the only writer of ledger rows: `add_credits`,
//! `deduct_credits`, and `refund_transaction` all funnel through the
//! store's atomic `append`, which enforces idempotency and the
//! non-negative-balance invariant inside one write span.

use std::sync::Arc;

use voxbill_core::{
    CachedBalance, CreditTransaction, TransactionDraft, TransactionId, TransactionType, UserId,
    FREEMIUM_USAGE_LIMIT,
};
use voxbill_store::{AppendOutcome, Result, Store, StoreError};

/// Optional fields for `add_credits`.
#[derive(Debug, Clone, Default)]
pub struct AddCreditsOptions {
    /// External cause id (payment intent, subscription).
    pub reference_id: Option<String>,
    /// External cause kind.
    pub reference_type: Option<String>,
    /// Subscription the grant belongs to.
    pub subscription_id: Option<String>,
    /// Free-form context.
    pub metadata: Option<serde_json::Value>,
    /// Uniqueness key; required for any call that may be retried.
    pub idempotency_key: Option<String>,
    /// Who created the transaction.
    pub created_by: Option<String>,
}

/// Optional fields for `deduct_credits`.
#[derive(Debug, Clone, Default)]
pub struct DeductOptions {
    /// External cause id (generation job).
    pub reference_id: Option<String>,
    /// External cause kind.
    pub reference_type: Option<String>,
    /// Free-form context.
    pub metadata: Option<serde_json::Value>,
    /// Uniqueness key; required for any call that may be retried.
    pub idempotency_key: Option<String>,
    /// Who created the transaction.
    pub created_by: Option<String>,
}

/// The credit operations facade.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Authoritative balance: fold the full transaction history.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn compute_balance(&self, user_id: &UserId) -> Result<i64> {
        self.store.compute_balance(user_id)
    }

    /// Fast balance read from the materialized view.
    ///
    /// On a cache miss, falls back to the authoritative fold and refreshes
    /// the cache. Never returns a negative number.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn cached_balance(&self, user_id: &UserId) -> Result<i64> {
        if let Some(cached) = self.store.get_cached_balance(user_id)? {
            return Ok(cached.balance());
        }

        let balance = self.store.compute_balance(user_id)?;
        self.store
            .put_cached_balance(&CachedBalance::new(*user_id, balance))?;
        Ok(balance)
    }

    /// Add credits to a user's balance.
    ///
    /// A supplied idempotency key makes retries no-ops: the original
    /// transaction is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is not positive; callers validate wire input
    /// before reaching the ledger, so a violation is a programming error.
    pub fn add_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        transaction_type: TransactionType,
        description: &str,
        opts: AddCreditsOptions,
    ) -> Result<AppendOutcome> {
        assert!(amount > 0, "credit amount must be positive");

        let mut draft = TransactionDraft::credit(*user_id, transaction_type, amount, description);
        if let (Some(id), Some(kind)) = (opts.reference_id, opts.reference_type) {
            draft = draft.with_reference(id, kind);
        }
        if let Some(subscription_id) = opts.subscription_id {
            draft = draft.with_subscription(subscription_id);
        }
        if let Some(metadata) = opts.metadata {
            draft = draft.with_metadata(metadata);
        }
        if let Some(key) = opts.idempotency_key {
            draft = draft.with_idempotency_key(key);
        }
        if let Some(created_by) = opts.created_by {
            draft = draft.with_created_by(created_by);
        }

        self.store.append(draft)
    }

    /// Deduct credits from a user's balance.
    ///
    /// The authoritative balance is re-validated inside the store's atomic
    /// append; a deduction exceeding it fails with
    /// `StoreError::InsufficientCredits` and writes nothing.
    ///
    /// # Errors
    ///
    /// - `StoreError::InsufficientCredits` when the balance is too low.
    /// - Any store failure.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is not positive (programming error).
    pub fn deduct_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        description: &str,
        opts: DeductOptions,
    ) -> Result<AppendOutcome> {
        assert!(amount > 0, "debit amount must be positive");

        let mut draft = TransactionDraft::debit(*user_id, amount, description);
        if let (Some(id), Some(kind)) = (opts.reference_id, opts.reference_type) {
            draft = draft.with_reference(id, kind);
        }
        if let Some(metadata) = opts.metadata {
            draft = draft.with_metadata(metadata);
        }
        if let Some(key) = opts.idempotency_key {
            draft = draft.with_idempotency_key(key);
        }
        if let Some(created_by) = opts.created_by {
            draft = draft.with_created_by(created_by);
        }

        self.store.append(draft)
    }

    /// Refund an earlier transaction.
    ///
    /// Credits the same user the same amount, typed `refund`, referencing
    /// the original. The idempotency key is derived from the original id,
    /// so refunding twice is a no-op.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the original transaction is absent.
    /// - Any store failure.
    pub fn refund_transaction(
        &self,
        original_id: &TransactionId,
        reason: &str,
    ) -> Result<AppendOutcome> {
        let original = self
            .store
            .get_transaction(original_id)?
            .ok_or(StoreError::NotFound)?;

        self.add_credits(
            &original.user_id,
            original.amount,
            TransactionType::Refund,
            reason,
            AddCreditsOptions {
                reference_id: Some(original.id.to_string()),
                reference_type: Some("transaction".into()),
                idempotency_key: Some(format!("refund_{}", original.id)),
                ..AddCreditsOptions::default()
            },
        )
    }

    /// Look up a single transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_transaction(&self, id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.store.get_transaction(id)
    }

    /// List a user's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        self.store.list_transactions(user_id, limit, offset)
    }

    /// Freemium limit check.
    ///
    /// A user is subject to the limit only if every transaction they have
    /// is of type `freemium` (they have never paid). Each freemium row
    /// records exactly one free generation, so for such users the row count
    /// is compared against the fixed free quota. Everyone else passes
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn is_over_free_limit(&self, user_id: &UserId) -> Result<bool> {
        let transactions = self.store.all_transactions(user_id)?;

        let all_freemium = !transactions.is_empty()
            && transactions
                .iter()
                .all(|tx| tx.transaction_type == TransactionType::Freemium);

        if !all_freemium {
            return Ok(false);
        }

        Ok(transactions.len() >= FREEMIUM_USAGE_LIMIT)
    }
}

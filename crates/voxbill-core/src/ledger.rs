//! Ledger transaction types.
//!
//! Every balance change is an immutable `CreditTransaction`. The set of a
//! user's transactions, folded in insertion order, is the authoritative
//! balance; everything else (cached balances, `balance_after` fields) is
//! derived from that fold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// Free generations allowed before a never-paid user is cut off.
pub const FREEMIUM_USAGE_LIMIT: usize = 3;

/// Whether a transaction increases or decreases the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Increases the balance.
    Credit,
    /// Decreases the balance.
    Debit,
}

/// Business meaning of a transaction.
///
/// The type never determines the sign of a balance change; that is the
/// `Direction`. Types exist for reporting, auditing, and the freemium check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// One-time credit purchase.
    Purchase,
    /// Credits spent on a generation.
    Usage,
    /// Periodic grant tied to an active subscription.
    SubscriptionGrant,
    /// Promotional or goodwill credits.
    Bonus,
    /// Reversal of an earlier transaction.
    Refund,
    /// Manual correction by an operator.
    Adjustment,
    /// Free-tier grant or usage record for a never-paid user.
    Freemium,
    /// One-time top-up via checkout.
    Topup,
}

/// An immutable fact about a balance change.
///
/// Rows are never mutated or deleted; corrections happen via new `refund`
/// or `adjustment` rows that reference the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID, time-ordered).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Business meaning of the change.
    pub transaction_type: TransactionType,

    /// Whether the balance went up or down.
    pub direction: Direction,

    /// Positive magnitude of the change, in credits.
    pub amount: i64,

    /// Balance immediately after this transaction was applied.
    ///
    /// Derived audit field; always equals the fold of all prior
    /// transactions plus this one.
    pub balance_after: i64,

    /// External cause of this transaction (payment intent, generation job).
    pub reference_id: Option<String>,

    /// Kind of the external cause (`payment_intent`, `transaction`, ...).
    pub reference_type: Option<String>,

    /// Subscription this grant belongs to, if any.
    pub subscription_id: Option<String>,

    /// Human-readable description.
    pub description: String,

    /// Free-form context; never used for balance computation.
    pub metadata: serde_json::Value,

    /// Uniqueness key for retried operations; unique across all
    /// transactions when present.
    pub idempotency_key: Option<String>,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,

    /// Who created it (service name, `stripe_webhook`, operator).
    pub created_by: String,
}

impl CreditTransaction {
    /// The direction-signed amount of this transaction.
    #[must_use]
    pub const fn signed_amount(&self) -> i64 {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// Fold a user's transactions into their balance, floored at zero.
pub fn fold_balance<'a, I>(transactions: I) -> i64
where
    I: IntoIterator<Item = &'a CreditTransaction>,
{
    transactions
        .into_iter()
        .map(CreditTransaction::signed_amount)
        .sum::<i64>()
        .max(0)
}

/// A transaction waiting to be appended to the ledger.
///
/// The store assigns the `TransactionId`, `balance_after`, and timestamp at
/// append time, inside the same atomic unit that validates the balance and
/// the idempotency key.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    /// The user whose balance will change.
    pub user_id: UserId,
    /// Business meaning of the change.
    pub transaction_type: TransactionType,
    /// Whether the balance goes up or down.
    pub direction: Direction,
    /// Positive magnitude of the change.
    pub amount: i64,
    /// Human-readable description.
    pub description: String,
    /// Free-form context.
    pub metadata: serde_json::Value,
    /// External cause id.
    pub reference_id: Option<String>,
    /// External cause kind.
    pub reference_type: Option<String>,
    /// Subscription this grant belongs to.
    pub subscription_id: Option<String>,
    /// Uniqueness key for retried operations.
    pub idempotency_key: Option<String>,
    /// Who created it.
    pub created_by: String,
}

impl TransactionDraft {
    /// Draft a credit (balance-increasing) transaction.
    #[must_use]
    pub fn credit(
        user_id: UserId,
        transaction_type: TransactionType,
        amount: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            transaction_type,
            direction: Direction::Credit,
            amount,
            description: description.into(),
            metadata: serde_json::Value::Null,
            reference_id: None,
            reference_type: None,
            subscription_id: None,
            idempotency_key: None,
            created_by: "system".into(),
        }
    }

    /// Draft a debit (balance-decreasing) usage transaction.
    #[must_use]
    pub fn debit(user_id: UserId, amount: i64, description: impl Into<String>) -> Self {
        Self {
            user_id,
            transaction_type: TransactionType::Usage,
            direction: Direction::Debit,
            amount,
            description: description.into(),
            metadata: serde_json::Value::Null,
            reference_id: None,
            reference_type: None,
            subscription_id: None,
            idempotency_key: None,
            created_by: "system".into(),
        }
    }

    /// Attach an external reference.
    #[must_use]
    pub fn with_reference(mut self, id: impl Into<String>, kind: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self.reference_type = Some(kind.into());
        self
    }

    /// Attach a subscription id.
    #[must_use]
    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    /// Attach an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Attach free-form metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Record who created the transaction.
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Finalize the draft into a ledger row.
    #[must_use]
    pub fn into_transaction(
        self,
        id: TransactionId,
        balance_after: i64,
        created_at: DateTime<Utc>,
    ) -> CreditTransaction {
        CreditTransaction {
            id,
            user_id: self.user_id,
            transaction_type: self.transaction_type,
            direction: self.direction,
            amount: self.amount,
            balance_after,
            reference_id: self.reference_id,
            reference_type: self.reference_type,
            subscription_id: self.subscription_id,
            description: self.description,
            metadata: self.metadata,
            idempotency_key: self.idempotency_key,
            created_at,
            created_by: self.created_by,
        }
    }
}

/// A materialized `(user, balance)` row.
///
/// Always re-derivable from the transaction log; treated as a cache, never
/// as a source of truth. Absent for users with no activity (balance 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedBalance {
    /// The balance owner.
    pub user_id: UserId,
    /// Balance in credits at the time of the last refresh.
    pub balance: i64,
    /// When the cache row was last written.
    pub updated_at: DateTime<Utc>,
}

impl CachedBalance {
    /// Create a cache row for the given user and balance.
    #[must_use]
    pub fn new(user_id: UserId, balance: i64) -> Self {
        Self {
            user_id,
            balance,
            updated_at: Utc::now(),
        }
    }

    /// The cached balance, floored at zero.
    #[must_use]
    pub const fn balance(&self) -> i64 {
        if self.balance < 0 {
            0
        } else {
            self.balance
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(direction: Direction, amount: i64) -> CreditTransaction {
        let draft = TransactionDraft {
            user_id: UserId::generate(),
            transaction_type: TransactionType::Purchase,
            direction,
            amount,
            description: String::new(),
            metadata: serde_json::Value::Null,
            reference_id: None,
            reference_type: None,
            subscription_id: None,
            idempotency_key: None,
            created_by: "test".into(),
        };
        draft.into_transaction(TransactionId::generate(), 0, Utc::now())
    }

    #[test]
    fn signed_amount_follows_direction() {
        assert_eq!(tx(Direction::Credit, 100).signed_amount(), 100);
        assert_eq!(tx(Direction::Debit, 100).signed_amount(), -100);
    }

    #[test]
    fn fold_sums_credits_minus_debits() {
        let txs = vec![
            tx(Direction::Credit, 500),
            tx(Direction::Debit, 200),
            tx(Direction::Credit, 50),
        ];
        assert_eq!(fold_balance(&txs), 350);
    }

    #[test]
    fn fold_floors_at_zero() {
        let txs = vec![tx(Direction::Credit, 100), tx(Direction::Debit, 300)];
        assert_eq!(fold_balance(&txs), 0);
    }

    #[test]
    fn fold_of_nothing_is_zero() {
        assert_eq!(fold_balance(&[]), 0);
    }

    #[test]
    fn draft_builder_carries_fields() {
        let user_id = UserId::generate();
        let draft = TransactionDraft::credit(user_id, TransactionType::Topup, 5000, "Top-up")
            .with_reference("pi_123", "payment_intent")
            .with_idempotency_key("topup_pi_123")
            .with_created_by("stripe_webhook");

        let row = draft.into_transaction(TransactionId::generate(), 5000, Utc::now());
        assert_eq!(row.amount, 5000);
        assert_eq!(row.balance_after, 5000);
        assert_eq!(row.reference_id.as_deref(), Some("pi_123"));
        assert_eq!(row.idempotency_key.as_deref(), Some("topup_pi_123"));
        assert_eq!(row.created_by, "stripe_webhook");
    }

    #[test]
    fn cached_balance_never_reports_negative() {
        let mut cached = CachedBalance::new(UserId::generate(), 10);
        cached.balance = -5;
        assert_eq!(cached.balance(), 0);
    }

    #[test]
    fn transaction_type_serde_is_snake_case() {
        let json = serde_json::to_string(&TransactionType::SubscriptionGrant).unwrap();
        assert_eq!(json, "\"subscription_grant\"");
    }
}

//! Column family definitions.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Ledger rows, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Idempotency keys, mapping key -> transaction id.
    pub const IDEMPOTENCY_KEYS: &str = "idempotency_keys";

    /// Materialized balances, keyed by `user_id`.
    pub const BALANCES: &str = "balances";

    /// Customer subscription snapshots, keyed by provider customer id.
    pub const CUSTOMER_STATE: &str = "customer_state";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::IDEMPOTENCY_KEYS,
        cf::BALANCES,
        cf::CUSTOMER_STATE,
    ]
}

//! `RocksDB` storage implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use voxbill_core::{
    CachedBalance, CreditTransaction, CustomerSubscriptionState, Direction, TransactionDraft,
    TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AppendOutcome, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    // Per-user append serialization. The idempotency check, the balance
    // fold, and the batch write for one user must not interleave.
    user_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    // Per-key serialization for appends carrying an idempotency key.
    // Uniqueness of the key is global, not per user, so two appends for
    // different users reusing one key must also be serialized. Always
    // acquired after the user lock.
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            user_locks: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Get or create the append lock for a user.
    fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(*user_id).or_default())
    }

    /// Get or create the append lock for an idempotency key.
    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_owned()).or_default())
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Collect the user's index keys in insertion (ULID) order.
    fn user_index_keys(&self, user_id: &UserId) -> Result<Vec<Vec<u8>>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut index_keys = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            index_keys.push(key.to_vec());
        }

        Ok(index_keys)
    }
}

impl Store for RocksStore {
    fn append(&self, draft: TransactionDraft) -> Result<AppendOutcome> {
        let lock = self.user_lock(&draft.user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Lock order is fixed: user lock, then key lock. The key lock covers
        // the same key arriving from a different user's append.
        let key_lock = draft.idempotency_key.as_ref().map(|k| self.key_lock(k));
        let _key_guard = key_lock
            .as_ref()
            .map(|l| l.lock().unwrap_or_else(PoisonError::into_inner));

        // Idempotent replay: return the original row, write nothing. Safe
        // under the locks because every writer for this user or key holds
        // them too.
        if let Some(key) = &draft.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(key)? {
                return Ok(AppendOutcome::Duplicate(existing));
            }
        }

        // Authoritative balance: fold the full history, not the cache.
        let balance = self.compute_balance(&draft.user_id)?;

        let balance_after = match draft.direction {
            Direction::Credit => balance + draft.amount,
            Direction::Debit => {
                if balance < draft.amount {
                    return Err(StoreError::InsufficientCredits {
                        balance,
                        required: draft.amount,
                    });
                }
                balance - draft.amount
            }
        };

        let user_id = draft.user_id;
        let idempotency = draft.idempotency_key.clone();
        let tx = draft.into_transaction(TransactionId::generate(), balance_after, chrono::Utc::now());

        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let cf_idem = self.cf(cf::IDEMPOTENCY_KEYS)?;
        let cf_balances = self.cf(cf::BALANCES)?;

        let tx_key = keys::transaction_key(&tx.id);
        let user_tx_key = keys::user_transaction_key(&user_id, &tx.id);
        let tx_value = Self::serialize(&tx)?;

        let cached = CachedBalance::new(user_id, balance_after);
        let balance_value = Self::serialize(&cached)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_tx, &tx_key, &tx_value);
        batch.put_cf(&cf_by_user, &user_tx_key, b"");
        batch.put_cf(&cf_balances, keys::balance_key(&user_id), &balance_value);
        if let Some(key) = &idempotency {
            batch.put_cf(&cf_idem, keys::idempotency_key(key), &tx_key);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(AppendOutcome::Applied(tx))
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        let key = keys::transaction_key(transaction_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<CreditTransaction>> {
        let cf_idem = self.cf(cf::IDEMPOTENCY_KEYS)?;

        let Some(tx_key) = self
            .db
            .get_cf(&cf_idem, keys::idempotency_key(key))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if tx_key.len() != 16 {
            return Err(StoreError::Serialization(
                "idempotency entry does not hold a transaction id".into(),
            ));
        }
        bytes.copy_from_slice(&tx_key);
        let tx_id = TransactionId::from_bytes(bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.get_transaction(&tx_id)
    }

    fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let mut index_keys = self.user_index_keys(user_id)?;
        // Newest first.
        index_keys.reverse();

        let mut transactions = Vec::new();
        for key in index_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }

            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn all_transactions(&self, user_id: &UserId) -> Result<Vec<CreditTransaction>> {
        let index_keys = self.user_index_keys(user_id)?;

        let mut transactions = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    fn compute_balance(&self, user_id: &UserId) -> Result<i64> {
        let transactions = self.all_transactions(user_id)?;
        Ok(voxbill_core::fold_balance(&transactions))
    }

    fn get_cached_balance(&self, user_id: &UserId) -> Result<Option<CachedBalance>> {
        let cf = self.cf(cf::BALANCES)?;

        self.db
            .get_cf(&cf, keys::balance_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_cached_balance(&self, balance: &CachedBalance) -> Result<()> {
        let cf = self.cf(cf::BALANCES)?;
        let value = Self::serialize(balance)?;

        self.db
            .put_cf(&cf, keys::balance_key(&balance.user_id), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn put_customer_state(&self, state: &CustomerSubscriptionState) -> Result<()> {
        let cf = self.cf(cf::CUSTOMER_STATE)?;
        let value = Self::serialize(state)?;

        self.db
            .put_cf(&cf, keys::customer_state_key(&state.customer_id), value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_customer_state(&self, customer_id: &str) -> Result<Option<CustomerSubscriptionState>> {
        let cf = self.cf(cf::CUSTOMER_STATE)?;

        self.db
            .get_cf(&cf, keys::customer_state_key(customer_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn scan_customer_states(&self) -> Result<Vec<CustomerSubscriptionState>> {
        let cf = self.cf(cf::CUSTOMER_STATE)?;

        let mut states = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            states.push(Self::deserialize(&value)?);
        }

        Ok(states)
    }
}

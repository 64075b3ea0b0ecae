//! Credit balance, history, and ledger-write handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use voxbill_core::{CreditTransaction, TransactionId, TransactionType, UserId};
use voxbill_store::AppendOutcome;

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::ledger::{AddCreditsOptions, DeductOptions};
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// User ID.
    pub user_id: String,
    /// Current credit balance.
    pub balance: i64,
}

/// Get the current credit balance (materialized view, fold fallback).
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.cached_balance(&auth.user_id)?;

    Ok(Json(BalanceResponse {
        user_id: auth.user_id.to_string(),
        balance,
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Direction: credit or debit.
    pub direction: String,
    /// Magnitude of the change.
    pub amount: i64,
    /// Balance after this transaction.
    pub balance_after: i64,
    /// Description.
    pub description: String,
    /// External cause id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            transaction_type: tx.transaction_type,
            direction: match tx.direction {
                voxbill_core::Direction::Credit => "credit".to_string(),
                voxbill_core::Direction::Debit => "debit".to_string(),
            },
            amount: tx.amount,
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            reference_id: tx.reference_id.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let transactions = state
        .ledger
        .list_transactions(&auth.user_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Request body for adding credits.
#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    /// Target user.
    pub user_id: UserId,
    /// Amount to add (positive).
    pub amount: i64,
    /// Transaction type for the grant.
    pub transaction_type: TransactionType,
    /// Description for the ledger row.
    pub description: String,
    /// External cause id.
    #[serde(default)]
    pub reference_id: Option<String>,
    /// External cause kind.
    #[serde(default)]
    pub reference_type: Option<String>,
    /// Subscription the grant belongs to.
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Free-form context.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Uniqueness key for retried calls.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Outcome of a ledger write.
#[derive(Debug, Serialize)]
pub struct WriteResponse {
    /// The resulting transaction (the original row on idempotent replay).
    pub transaction: TransactionResponse,
    /// True when the request replayed an earlier write.
    pub duplicate: bool,
}

impl From<AppendOutcome> for WriteResponse {
    fn from(outcome: AppendOutcome) -> Self {
        let duplicate = outcome.is_duplicate();
        Self {
            transaction: TransactionResponse::from(outcome.transaction()),
            duplicate,
        }
    }
}

/// Add credits to a user (service auth).
pub async fn add_credits(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(req): Json<AddCreditsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    if req.amount <= 0 {
        return Err(ApiError::BadRequest("amount must be positive".into()));
    }
    if req.transaction_type == TransactionType::Usage {
        return Err(ApiError::BadRequest(
            "usage transactions go through the deduct endpoint".into(),
        ));
    }

    let outcome = state.ledger.add_credits(
        &req.user_id,
        req.amount,
        req.transaction_type,
        &req.description,
        AddCreditsOptions {
            reference_id: req.reference_id,
            reference_type: req.reference_type,
            subscription_id: req.subscription_id,
            metadata: req.metadata,
            idempotency_key: req.idempotency_key,
            created_by: Some(service.service_name),
        },
    )?;

    Ok(Json(WriteResponse::from(outcome)))
}

/// Request body for deducting credits.
#[derive(Debug, Deserialize)]
pub struct DeductCreditsRequest {
    /// Target user.
    pub user_id: UserId,
    /// Amount to deduct (positive).
    pub amount: i64,
    /// Description for the ledger row.
    pub description: String,
    /// External cause id (generation job).
    #[serde(default)]
    pub reference_id: Option<String>,
    /// External cause kind.
    #[serde(default)]
    pub reference_type: Option<String>,
    /// Free-form context.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Uniqueness key for retried calls.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Deduct credits from a user (service auth).
///
/// Fails with a 402-shaped insufficient-credits error when the balance is
/// too low; nothing is written in that case.
pub async fn deduct_credits(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(req): Json<DeductCreditsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    if req.amount <= 0 {
        return Err(ApiError::BadRequest("amount must be positive".into()));
    }

    let outcome = state.ledger.deduct_credits(
        &req.user_id,
        req.amount,
        &req.description,
        DeductOptions {
            reference_id: req.reference_id,
            reference_type: req.reference_type,
            metadata: req.metadata,
            idempotency_key: req.idempotency_key,
            created_by: Some(service.service_name),
        },
    )?;

    Ok(Json(WriteResponse::from(outcome)))
}

/// Request body for refunding a transaction.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// The transaction being refunded.
    pub transaction_id: TransactionId,
    /// Operator-supplied reason, recorded as the refund's description.
    pub reason: String,
}

/// Refund an earlier transaction (service auth). Refunding twice is a no-op.
pub async fn refund_transaction(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
    Json(req): Json<RefundRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcome = state
        .ledger
        .refund_transaction(&req.transaction_id, &req.reason)?;

    Ok(Json(WriteResponse::from(outcome)))
}

/// Freemium check query parameters.
#[derive(Debug, Deserialize)]
pub struct FreemiumQuery {
    /// User to check.
    pub user_id: UserId,
}

/// Freemium check response.
#[derive(Debug, Serialize)]
pub struct FreemiumResponse {
    /// User ID.
    pub user_id: String,
    /// True when the free quota is exhausted.
    pub over_limit: bool,
}

/// Check whether a never-paid user has exhausted the free quota
/// (service auth).
pub async fn freemium_check(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
    Query(query): Query<FreemiumQuery>,
) -> Result<Json<FreemiumResponse>, ApiError> {
    let over_limit = state.ledger.is_over_free_limit(&query.user_id)?;

    Ok(Json(FreemiumResponse {
        user_id: query.user_id.to_string(),
        over_limit,
    }))
}

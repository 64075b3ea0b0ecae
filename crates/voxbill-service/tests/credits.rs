//! Credit balance, history, and ledger-write integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

// ============================================================================
// Balance
// ============================================================================

#[tokio::test]
async fn balance_starts_at_zero() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 0);
}

#[tokio::test]
async fn balance_reflects_grants_and_spends() {
    let harness = TestHarness::new();

    harness.grant(5000, "topup").await;

    harness
        .server
        .post("/v1/credits/deduct")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 1200,
            "description": "voice generation",
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 3800);
}

#[tokio::test]
async fn balance_without_auth_fails() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/credits/balance").await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn list_transactions_empty() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["transactions"].as_array().unwrap().is_empty());
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn list_transactions_newest_first_with_pagination() {
    let harness = TestHarness::new();

    for i in 1..=5 {
        harness.grant(i * 100, "bonus").await;
    }

    let response = harness
        .server
        .get("/v1/credits/transactions?limit=2&offset=0")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(body["has_more"], true);
    // Newest first: the last grant (500) leads.
    assert_eq!(transactions[0]["amount"], 500);
    assert_eq!(transactions[1]["amount"], 400);
}

// ============================================================================
// Add credits
// ============================================================================

#[tokio::test]
async fn add_credits_requires_service_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/add")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 100,
            "transaction_type": "bonus",
            "description": "nope",
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn add_credits_rejects_wrong_service_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/add")
        .add_header("x-api-key", "wrong-key")
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 100,
            "transaction_type": "bonus",
            "description": "nope",
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn add_credits_rejects_non_positive_amount() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/add")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 0,
            "transaction_type": "bonus",
            "description": "zero",
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn add_credits_with_same_key_applies_once() {
    let harness = TestHarness::new();

    let request = json!({
        "user_id": harness.test_user_id.to_string(),
        "amount": 10000,
        "transaction_type": "subscription_grant",
        "description": "Monthly grant",
        "idempotency_key": "sub_abc_user1",
    });

    let first = harness
        .server
        .post("/v1/credits/add")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&request)
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();
    assert_eq!(first["duplicate"], false);

    let second = harness
        .server
        .post("/v1/credits/add")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&request)
        .await;
    second.assert_status_ok();
    let second: serde_json::Value = second.json();
    assert_eq!(second["duplicate"], true);
    assert_eq!(second["transaction"]["id"], first["transaction"]["id"]);

    // Balance is 10000, not 20000.
    let balance = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = balance.json();
    assert_eq!(body["balance"], 10000);
}

// ============================================================================
// Deduct credits
// ============================================================================

#[tokio::test]
async fn deduct_beyond_balance_is_payment_required() {
    let harness = TestHarness::new();

    harness.grant(500, "purchase").await;

    let response = harness
        .server
        .post("/v1/credits/deduct")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 600,
            "description": "too expensive",
        }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_credits");
    assert_eq!(body["error"]["details"]["balance"], 500);
    assert_eq!(body["error"]["details"]["required"], 600);

    // Balance unchanged after the failed deduction.
    let balance = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = balance.json();
    assert_eq!(body["balance"], 500);
}

// ============================================================================
// Refunds
// ============================================================================

#[tokio::test]
async fn refund_twice_applies_once() {
    let harness = TestHarness::new();

    harness.grant(1000, "purchase").await;

    let spend = harness
        .server
        .post("/v1/credits/deduct")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "user_id": harness.test_user_id.to_string(),
            "amount": 400,
            "description": "failed job",
        }))
        .await;
    spend.assert_status_ok();
    let spend: serde_json::Value = spend.json();
    let transaction_id = spend["transaction"]["id"].as_str().unwrap().to_string();

    let refund_request = json!({
        "transaction_id": transaction_id,
        "reason": "Job failed",
    });

    let first = harness
        .server
        .post("/v1/credits/refund")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&refund_request)
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();
    assert_eq!(first["duplicate"], false);
    assert_eq!(first["transaction"]["amount"], 400);
    assert_eq!(first["transaction"]["transaction_type"], "refund");

    let second = harness
        .server
        .post("/v1/credits/refund")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&refund_request)
        .await;
    second.assert_status_ok();
    let second: serde_json::Value = second.json();
    assert_eq!(second["duplicate"], true);

    let balance = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = balance.json();
    assert_eq!(body["balance"], 1000);
}

#[tokio::test]
async fn refund_of_unknown_transaction_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/credits/refund")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "transaction_id": "01HV0000000000000000000000",
            "reason": "nope",
        }))
        .await;

    response.assert_status_not_found();
}

// ============================================================================
// Freemium
// ============================================================================

#[tokio::test]
async fn freemium_limit_binds_after_quota() {
    let harness = TestHarness::new();

    let url = format!("/v1/credits/freemium?user_id={}", harness.test_user_id);

    let response = harness
        .server
        .get(&url)
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["over_limit"], false);

    for _ in 0..3 {
        harness.grant(1, "freemium").await;
    }

    let response = harness
        .server
        .get(&url)
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["over_limit"], true);

    // Paying removes the limit.
    harness.grant(5000, "topup").await;

    let response = harness
        .server
        .get(&url)
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["over_limit"], false);
}

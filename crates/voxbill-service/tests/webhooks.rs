//! Stripe webhook processor integration tests.
//!
//! The Stripe read API is stood in for by a wiremock server; webhook bodies
//! are signed with the test secret the harness configures.

mod common;

use common::TestHarness;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn topup_event(user_id: &str, payment_intent: &str) -> String {
    json!({
        "id": "evt_topup_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "mode": "payment",
                "customer": "cus_1",
                "payment_intent": payment_intent,
                "payment_status": "paid",
                "metadata": {
                    "type": "topup",
                    "userId": user_id,
                    "credits": "5000",
                    "dollarAmount": "5.00",
                    "packageType": "starter"
                }
            }
        }
    })
    .to_string()
}

fn subscription_event(event_id: &str, event_type: &str, customer: &str) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "data": {
            "object": {
                "id": "sub_abc",
                "customer": customer,
                "status": "active",
                "items": { "data": [ { "price": { "id": "price_starter_monthly" } } ] }
            }
        }
    })
    .to_string()
}

async fn mount_customer(mock: &MockServer, customer_id: &str, user_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/customers/{customer_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": customer_id,
            "metadata": { "user_id": user_id }
        })))
        .mount(mock)
        .await;
}

async fn mount_subscriptions(mock: &MockServer, customer_id: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "sub_abc",
                "customer": customer_id,
                "status": status,
                "cancel_at_period_end": false,
                "current_period_start": 1_700_000_000,
                "current_period_end": 4_102_444_800i64,
                "items": { "data": [ { "price": { "id": "price_starter_monthly" } } ] }
            }],
            "has_more": false
        })))
        .mount(mock)
        .await;
}

async fn balance_of(harness: &TestHarness) -> i64 {
    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    body["balance"].as_i64().unwrap()
}

// ============================================================================
// Signature verification
// ============================================================================

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);

    let body = topup_event(&harness.test_user_id.to_string(), "pi_1");

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", "t=1,v1=deadbeef")
        .add_header("content-type", "application/json")
        .text(body)
        .await;

    response.assert_status_bad_request();
    assert_eq!(balance_of(&harness).await, 0);
}

#[tokio::test]
async fn webhook_without_signature_is_rejected() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);

    let body = topup_event(&harness.test_user_id.to_string(), "pi_1");

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("content-type", "application/json")
        .text(body)
        .await;

    response.assert_status_bad_request();
}

// ============================================================================
// Topup checkout
// ============================================================================

#[tokio::test]
async fn topup_checkout_grants_credits_once() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);

    let body = topup_event(&harness.test_user_id.to_string(), "pi_1");
    let signature = harness.sign_webhook(&body);

    // Deliver the same event twice, as Stripe does under retry.
    for _ in 0..2 {
        let response = harness
            .server
            .post("/webhooks/stripe")
            .add_header("stripe-signature", signature.clone())
            .add_header("content-type", "application/json")
            .text(body.clone())
            .await;
        response.assert_status_ok();
        let ack: serde_json::Value = response.json();
        assert_eq!(ack["received"], true);
    }

    assert_eq!(balance_of(&harness).await, 5000);

    let history = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = history.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["transaction_type"], "topup");
    assert_eq!(transactions[0]["reference_id"], "pi_1");
}

#[tokio::test]
async fn topup_with_missing_metadata_is_acked_without_ledger_write() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);

    // No userId: a data-integrity problem to reconcile by hand, not a retry.
    let body = json!({
        "id": "evt_bad_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_bad_1",
                "mode": "payment",
                "payment_intent": "pi_bad",
                "payment_status": "paid",
                "metadata": { "type": "topup", "credits": "5000" }
            }
        }
    })
    .to_string();
    let signature = harness.sign_webhook(&body);

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await;

    response.assert_status_ok();
    assert_eq!(balance_of(&harness).await, 0);
}

#[tokio::test]
async fn unpaid_checkout_is_acked_without_grant() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);

    let body = json!({
        "id": "evt_unpaid",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_unpaid",
                "mode": "payment",
                "payment_intent": "pi_unpaid",
                "payment_status": "unpaid",
                "metadata": {
                    "type": "topup",
                    "userId": harness.test_user_id.to_string(),
                    "credits": "5000",
                    "dollarAmount": "5.00",
                    "packageType": "starter"
                }
            }
        }
    })
    .to_string();
    let signature = harness.sign_webhook(&body);

    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await
        .assert_status_ok();

    assert_eq!(balance_of(&harness).await, 0);
}

// ============================================================================
// Subscription lifecycle
// ============================================================================

#[tokio::test]
async fn subscription_created_and_updated_grant_once() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);
    let user_id = harness.test_user_id.to_string();

    mount_customer(&mock, "cus_1", &user_id).await;
    mount_subscriptions(&mock, "cus_1", "active").await;

    // created and updated in either order funnel through the same
    // per-subscription idempotency key.
    for (event_id, event_type) in [
        ("evt_sub_2", "customer.subscription.updated"),
        ("evt_sub_1", "customer.subscription.created"),
    ] {
        let body = subscription_event(event_id, event_type, "cus_1");
        let signature = harness.sign_webhook(&body);

        harness
            .server
            .post("/webhooks/stripe")
            .add_header("stripe-signature", signature)
            .add_header("content-type", "application/json")
            .text(body)
            .await
            .assert_status_ok();
    }

    // Starter tier, no promo: exactly one 10000 grant.
    assert_eq!(balance_of(&harness).await, 10000);

    let history = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = history.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["transaction_type"], "subscription_grant");
}

#[tokio::test]
async fn grant_follows_the_subscription_named_by_the_event() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);
    let user_id = harness.test_user_id.to_string();

    mount_customer(&mock, "cus_1", &user_id).await;

    // Two active subscriptions: a lingering starter listed first and the
    // creator upgrade the event is actually about.
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "id": "sub_old",
                    "customer": "cus_1",
                    "status": "active",
                    "cancel_at_period_end": false,
                    "current_period_start": 1_700_000_000,
                    "current_period_end": 4_102_444_800i64,
                    "items": { "data": [ { "price": { "id": "price_starter_monthly" } } ] }
                },
                {
                    "id": "sub_new",
                    "customer": "cus_1",
                    "status": "active",
                    "cancel_at_period_end": false,
                    "current_period_start": 1_700_000_000,
                    "current_period_end": 4_102_444_800i64,
                    "items": { "data": [ { "price": { "id": "price_creator_monthly" } } ] }
                }
            ],
            "has_more": false
        })))
        .mount(&mock)
        .await;

    let body = json!({
        "id": "evt_upgrade",
        "type": "customer.subscription.updated",
        "data": {
            "object": {
                "id": "sub_new",
                "customer": "cus_1",
                "status": "active",
                "items": { "data": [ { "price": { "id": "price_creator_monthly" } } ] }
            }
        }
    })
    .to_string();
    let signature = harness.sign_webhook(&body);

    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await
        .assert_status_ok();

    // Creator tier, not the first-listed starter.
    assert_eq!(balance_of(&harness).await, 30000);

    let history = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = history.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["reference_id"], "sub_new");
}

#[tokio::test]
async fn promo_flag_adds_tier_bonus_to_grant() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), true);
    let user_id = harness.test_user_id.to_string();

    mount_customer(&mock, "cus_1", &user_id).await;
    mount_subscriptions(&mock, "cus_1", "active").await;

    let body = subscription_event("evt_sub_promo", "customer.subscription.created", "cus_1");
    let signature = harness.sign_webhook(&body);

    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await
        .assert_status_ok();

    // Starter 10000 + promo bonus 2000.
    assert_eq!(balance_of(&harness).await, 12000);
}

#[tokio::test]
async fn inactive_subscription_updates_snapshot_without_grant() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);
    let user_id = harness.test_user_id.to_string();

    mount_customer(&mock, "cus_1", &user_id).await;
    mount_subscriptions(&mock, "cus_1", "past_due").await;

    let body = subscription_event("evt_sub_pd", "customer.subscription.updated", "cus_1");
    let signature = harness.sign_webhook(&body);

    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await
        .assert_status_ok();

    assert_eq!(balance_of(&harness).await, 0);

    // Snapshot exists but is not counted as active.
    let stats = harness
        .server
        .get("/v1/subscriptions/stats")
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    stats.assert_status_ok();
    let body: serde_json::Value = stats.json();
    assert_eq!(body["active_subscriptions"], 0);
    assert_eq!(body["total_customers"], 1);
}

#[tokio::test]
async fn subscription_deleted_only_updates_snapshot() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);
    let user_id = harness.test_user_id.to_string();

    mount_customer(&mock, "cus_1", &user_id).await;
    mount_subscriptions(&mock, "cus_1", "canceled").await;

    let body = subscription_event("evt_sub_del", "customer.subscription.deleted", "cus_1");
    let signature = harness.sign_webhook(&body);

    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await
        .assert_status_ok();

    assert_eq!(balance_of(&harness).await, 0);
}

#[tokio::test]
async fn unmapped_customer_is_acked_without_grant() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);

    // Customer exists but carries no user_id metadata.
    Mock::given(method("GET"))
        .and(path("/customers/cus_orphan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cus_orphan",
            "metadata": {}
        })))
        .mount(&mock)
        .await;
    mount_subscriptions(&mock, "cus_orphan", "active").await;

    let body = subscription_event("evt_orphan", "customer.subscription.created", "cus_orphan");
    let signature = harness.sign_webhook(&body);

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await;

    // Acknowledged: retries cannot fix a data problem.
    response.assert_status_ok();
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);

    let body = json!({
        "id": "evt_future",
        "type": "invoice.finalized",
        "data": { "object": {} }
    })
    .to_string();
    let signature = harness.sign_webhook(&body);

    let response = harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await;

    response.assert_status_ok();
    let ack: serde_json::Value = response.json();
    assert_eq!(ack["received"], true);
}

// ============================================================================
// Subscription read utilities
// ============================================================================

#[tokio::test]
async fn next_renewal_finds_earliest_active_period_end() {
    let mock = MockServer::start().await;
    let harness = TestHarness::with_stripe(&mock.uri(), false);
    let user_id = harness.test_user_id.to_string();

    mount_customer(&mock, "cus_1", &user_id).await;
    mount_subscriptions(&mock, "cus_1", "active").await;

    let body = subscription_event("evt_sub_1", "customer.subscription.created", "cus_1");
    let signature = harness.sign_webhook(&body);
    harness
        .server
        .post("/webhooks/stripe")
        .add_header("stripe-signature", signature)
        .add_header("content-type", "application/json")
        .text(body)
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get("/v1/subscriptions/next-renewal")
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["customer_id"], "cus_1");
    assert_eq!(body["subscription_id"], "sub_abc");
    assert!(body["renews_at"].as_str().is_some());
}

#[tokio::test]
async fn next_renewal_is_empty_without_subscriptions() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/subscriptions/next-renewal")
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body.get("customer_id").is_none() || body["customer_id"].is_null());
}

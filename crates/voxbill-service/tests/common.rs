//! Common test utilities for voxbill integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use voxbill_core::{PricingTable, UserId};
use voxbill_service::crypto::hmac_sha256_hex;
use voxbill_service::{create_router, AppState, ServiceConfig, StripeClient};
use voxbill_store::RocksStore;

/// Webhook signing secret used across the webhook tests.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database and no Stripe client.
    pub fn new() -> Self {
        Self::build(None, false)
    }

    /// Harness whose Stripe client talks to a mock server and whose webhook
    /// endpoint verifies signatures against `TEST_WEBHOOK_SECRET`.
    pub fn with_stripe(mock_base_url: &str, promo_enabled: bool) -> Self {
        Self::build(Some(mock_base_url.to_string()), promo_enabled)
    }

    fn build(stripe_base_url: Option<String>, promo_enabled: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let service_api_key = "test-service-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            stripe_api_key: stripe_base_url.as_ref().map(|_| "sk_test_xxx".into()),
            stripe_webhook_secret: stripe_base_url
                .as_ref()
                .map(|_| TEST_WEBHOOK_SECRET.to_string()),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            pricing: PricingTable::with_price_ids(
                "price_starter_monthly",
                "price_creator_monthly",
                "price_pro_monthly",
                promo_enabled,
            ),
        };

        let mut state = AppState::new(Arc::new(store), config);
        if let Some(base_url) = stripe_base_url {
            state = state.with_stripe(
                StripeClient::new("sk_test_xxx", Some(TEST_WEBHOOK_SECRET.to_string()))
                    .with_base_url(base_url),
            );
        }

        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            _temp_dir: temp_dir,
            test_user_id,
            service_api_key,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.test_user_id)
    }

    /// Build a valid `Stripe-Signature` header for a webhook body.
    pub fn sign_webhook(&self, body: &str) -> String {
        let ts = chrono::Utc::now().timestamp();
        let sig = hmac_sha256_hex(TEST_WEBHOOK_SECRET, &format!("{ts}.{body}"));
        format!("t={ts},v1={sig}")
    }

    /// Add credits via the service API; returns the response body.
    pub async fn grant(&self, amount: i64, transaction_type: &str) -> serde_json::Value {
        let response = self
            .server
            .post("/v1/credits/add")
            .add_header("x-api-key", self.service_api_key.clone())
            .json(&serde_json::json!({
                "user_id": self.test_user_id.to_string(),
                "amount": amount,
                "transaction_type": transaction_type,
                "description": "test grant",
            }))
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

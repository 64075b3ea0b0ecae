//! Service configuration.

use voxbill_core::PricingTable;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory (default: "/data/voxbill").
    pub data_dir: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Stripe API key for the read API (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe webhook signing secret (optional; verification is skipped
    /// with a warning when absent, for development only).
    pub stripe_webhook_secret: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Price-id to credit-package mapping, including the promo flag.
    pub pricing: PricingTable,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let promo_enabled = std::env::var("PROMO_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let pricing = PricingTable::with_price_ids(
            std::env::var("STRIPE_PRICE_STARTER")
                .unwrap_or_else(|_| "price_starter_monthly".into()),
            std::env::var("STRIPE_PRICE_CREATOR")
                .unwrap_or_else(|_| "price_creator_monthly".into()),
            std::env::var("STRIPE_PRICE_PRO").unwrap_or_else(|_| "price_pro_monthly".into()),
            promo_enabled,
        );

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/voxbill".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            stripe_api_key: std::env::var("STRIPE_API_KEY").ok(),
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            pricing,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/voxbill".into(),
            service_api_key: None,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            pricing: PricingTable::default(),
        }
    }
}

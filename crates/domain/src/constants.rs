//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Credential refresh
pub const CREDENTIAL_SAFETY_BUFFER_SECS: u64 = 300;
pub const CREDENTIAL_EXCHANGE_MAX_RETRIES: u32 = 2;
pub const STS_SESSION_DURATION_SECS: u64 = 3600;
pub const STS_ROLE_SESSION_NAME: &str = "sellerscan-session";
pub const DEFAULT_LWA_ENDPOINT: &str = "https://api.amazon.com/auth/o2/token";
pub const DEFAULT_STS_ENDPOINT: &str = "https://sts.amazonaws.com/";
pub const STS_SIGNING_REGION: &str = "us-east-1";

// HTTP client
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
pub const DEFAULT_MAX_JITTER_MS: u64 = 250;
pub const USER_AGENT: &str = concat!("sellerscan/", env!("CARGO_PKG_VERSION"), " (Language=Rust)");
pub const RATE_LIMIT_HEADER: &str = "x-amzn-ratelimit-limit";

// SP-API
pub const SP_API_SERVICE: &str = "execute-api";
pub const DEFAULT_MARKETPLACE_ID: &str = "ATVPDKIKX0DER";
pub const MAX_COMPETITIVE_PRICING_ASINS: usize = 20;

// Rate limit families: (name, sustained requests per second, burst)
pub const FAMILY_CATALOG: &str = "catalog";
pub const FAMILY_PRICING: &str = "pricing";
pub const FAMILY_OFFERS: &str = "offers";
pub const FAMILY_COMPETITIVE_PRICING: &str = "competitive_pricing";
pub const FAMILY_FEES: &str = "fees";
pub const FAMILY_REPORTS: &str = "reports";
pub const FAMILY_DEFAULT: &str = "default";

pub const DEFAULT_RATE_FAMILIES: &[(&str, f64, u32)] = &[
    (FAMILY_CATALOG, 2.0, 2),
    (FAMILY_PRICING, 0.5, 1),
    (FAMILY_OFFERS, 0.5, 1),
    (FAMILY_COMPETITIVE_PRICING, 0.5, 1),
    (FAMILY_FEES, 1.0, 2),
    (FAMILY_REPORTS, 0.0167, 15),
    (FAMILY_DEFAULT, 1.0, 1),
];

// Scan orchestration
pub const MIN_SCAN_CONCURRENCY: usize = 1;
pub const MAX_SCAN_CONCURRENCY: usize = 8;
pub const DEFAULT_SCAN_RATE_LIMIT: f64 = 1.0;
pub const DEFAULT_SCAN_JITTER_MS: u64 = 500;
pub const DEFAULT_SCAN_SOURCE: &str = "manual";

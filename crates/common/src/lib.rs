//! Modular common utilities shared across SellerScan crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `runtime`: async resilience primitives (clock, rate limiting, retry)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use resilience::{
    Clock, ExponentialBackoff, FamilyRateLimiter, Jitter, MockClock, RateLimitConfig,
    RetryConfig, RetryConfigBuilder, SharedClock, SystemClock, TokenBucket,
};

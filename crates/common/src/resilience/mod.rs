//! Resilience primitives for talking to rate-limited external APIs
//!
//! This module provides **generic, reusable** building blocks:
//! - **Clock**: time abstraction so waits are deterministic in tests
//! - **Rate Limiting**: per-family token buckets that make callers wait
//! - **Retry Backoff**: capped exponential delays with bounded jitter
//!
//! Domain-specific retry loops (which errors to retry, what to record) live
//! with the adapters that own those errors.

pub mod clock;
pub mod rate_limiter;
pub mod retry;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use rate_limiter::{FamilyRateLimiter, RateLimitConfig, TokenBucket};
pub use retry::{ExponentialBackoff, Jitter, RetryConfig, RetryConfigBuilder};

//! Token bucket rate limiting for external API families
//!
//! Each API family (e.g. `catalog`, `reports`) owns an isolated bucket that
//! refills continuously at its sustained rate and holds at most its burst
//! capacity. `acquire` never fails: callers that find the bucket empty sleep
//! on the injected [`Clock`] until a token has accrued, so a slow family can
//! never block a fast one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::clock::SharedClock;

/// Tolerance for floating point drift when comparing token counts
const TOKEN_EPSILON: f64 = 1e-9;

/// Configuration for a single token bucket
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Tokens added per second
    pub sustained_rate: f64,
    /// Maximum number of tokens the bucket can hold
    pub burst_capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { sustained_rate: 1.0, burst_capacity: 1 }
    }
}

impl RateLimitConfig {
    /// Create a validated configuration
    pub fn new(sustained_rate: f64, burst_capacity: u32) -> Result<Self, String> {
        let config = Self { sustained_rate, burst_capacity };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.sustained_rate.is_finite() || self.sustained_rate <= 0.0 {
            return Err("sustained_rate must be a positive number".to_string());
        }
        if self.burst_capacity == 0 {
            return Err("burst_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    sustained_rate: f64,
    burst_capacity: f64,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.sustained_rate).min(self.burst_capacity);
            self.last_refill = now;
        }
    }

    fn wait_for_one_token(&self) -> Duration {
        let missing = (1.0 - self.tokens).max(0.0);
        Duration::try_from_secs_f64(missing / self.sustained_rate).unwrap_or(Duration::MAX)
    }
}

/// Continuously refilled token bucket
///
/// The refill-and-consume step runs under a single mutex so two callers can
/// never take the same token. Waiting happens outside the lock.
pub struct TokenBucket {
    name: String,
    state: Mutex<BucketState>,
    clock: SharedClock,
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket").field("name", &self.name).field("state", &self.state).finish()
    }
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(
        name: impl Into<String>,
        config: &RateLimitConfig,
        clock: SharedClock,
    ) -> Result<Self, String> {
        config.validate()?;
        Ok(Self::from_validated(name.into(), config, clock))
    }

    fn from_validated(name: String, config: &RateLimitConfig, clock: SharedClock) -> Self {
        let burst = f64::from(config.burst_capacity);
        Self {
            name,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: clock.now(),
                sustained_rate: config.sustained_rate,
                burst_capacity: burst,
            }),
            clock,
        }
    }

    /// Name of the family this bucket guards
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take one token without waiting
    ///
    /// Returns `Ok(())` when a token was consumed, otherwise the time until
    /// one token will be available.
    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        state.refill(self.clock.now());

        if state.tokens + TOKEN_EPSILON >= 1.0 {
            state.tokens = (state.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            Err(state.wait_for_one_token())
        }
    }

    /// Wait until a token is available and consume exactly one
    ///
    /// Returns the total time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;

        loop {
            match self.try_take() {
                Ok(()) => {
                    if !waited.is_zero() {
                        debug!(
                            family = %self.name,
                            waited_ms = waited.as_millis() as u64,
                            "Rate limiter token acquired after wait"
                        );
                    }
                    return waited;
                }
                Err(wait) => {
                    let wait = wait.max(Duration::from_micros(1));
                    self.clock.sleep(wait).await;
                    waited = waited.saturating_add(wait);
                }
            }
        }
    }

    /// Try to consume a token without waiting
    pub fn try_acquire(&self) -> bool {
        self.try_take().is_ok()
    }

    /// Tokens currently available (after refill)
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        state.tokens
    }

    /// Current sustained rate in tokens per second
    pub fn sustained_rate(&self) -> f64 {
        self.state.lock().sustained_rate
    }

    /// Change the sustained rate, keeping tokens accrued at the old rate
    pub fn set_sustained_rate(&self, rate: f64) {
        if !rate.is_finite() || rate <= 0.0 {
            return;
        }
        let mut state = self.state.lock();
        state.refill(self.clock.now());
        state.sustained_rate = rate;
    }
}

/// Registry of per-family token buckets
///
/// Families that were never registered get a bucket built from the default
/// configuration on first use.
pub struct FamilyRateLimiter {
    buckets: DashMap<String, Arc<TokenBucket>>,
    default_config: RateLimitConfig,
    clock: SharedClock,
}

impl std::fmt::Debug for FamilyRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FamilyRateLimiter")
            .field("families", &self.families())
            .field("default_config", &self.default_config)
            .finish()
    }
}

impl FamilyRateLimiter {
    /// Create an empty limiter
    pub fn new(default_config: RateLimitConfig, clock: SharedClock) -> Result<Self, String> {
        default_config.validate()?;
        Ok(Self { buckets: DashMap::new(), default_config, clock })
    }

    /// Register (or replace) a family's bucket
    pub fn register(&self, family: &str, config: &RateLimitConfig) -> Result<(), String> {
        let bucket = TokenBucket::new(family, config, Arc::clone(&self.clock))?;
        self.buckets.insert(family.to_string(), Arc::new(bucket));
        debug!(
            family,
            sustained_rate = config.sustained_rate,
            burst = config.burst_capacity,
            "Registered rate limit family"
        );
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_family(self, family: &str, config: &RateLimitConfig) -> Result<Self, String> {
        self.register(family, config)?;
        Ok(self)
    }

    fn bucket(&self, family: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(family) {
            return Arc::clone(bucket.value());
        }

        let entry = self.buckets.entry(family.to_string()).or_insert_with(|| {
            debug!(family, "Creating rate limit bucket from default configuration");
            Arc::new(TokenBucket::from_validated(
                family.to_string(),
                &self.default_config,
                Arc::clone(&self.clock),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Wait for and consume one token from `family`
    pub async fn acquire(&self, family: &str) -> Duration {
        self.bucket(family).acquire().await
    }

    /// Try to consume one token from `family` without waiting
    pub fn try_acquire(&self, family: &str) -> bool {
        self.bucket(family).try_acquire()
    }

    /// Tokens currently available in `family`
    pub fn available_tokens(&self, family: &str) -> f64 {
        self.bucket(family).available_tokens()
    }

    /// Sustained rate currently applied to `family`
    pub fn sustained_rate(&self, family: &str) -> f64 {
        self.bucket(family).sustained_rate()
    }

    /// Adopt a new sustained rate for `family` (e.g. announced by the server)
    pub fn set_sustained_rate(&self, family: &str, rate: f64) {
        let bucket = self.bucket(family);
        let previous = bucket.sustained_rate();
        if (previous - rate).abs() > f64::EPSILON {
            bucket.set_sustained_rate(rate);
            info!(family, previous, rate, "Adjusted rate limit family");
        }
    }

    /// Names of all families with a bucket
    pub fn families(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buckets.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

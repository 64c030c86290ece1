//! Retry backoff configuration
//!
//! Describes how long to wait between attempts of a retried operation. The
//! retry loop itself lives with the caller (it has to classify its own
//! errors); this module only answers "how many retries" and "how long before
//! retry N".

use std::time::Duration;

use rand::Rng;

/// Exponential backoff: `initial_delay * base^retry`, capped at `max_delay`
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub initial_delay: Duration,
    pub base: f64,
    pub max_delay: Duration,
}

impl ExponentialBackoff {
    /// Calculate the delay before the given retry (0-based)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay = self.initial_delay.as_secs_f64() * self.base.powi(exponent);
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay.max(0.0))
        }
    }
}

/// Jitter added to a computed backoff delay
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Additive jitter: calculated delay plus uniform 0..=max
    Bounded { max: Duration },
}

impl Jitter {
    /// Apply jitter using the thread-local RNG
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with(delay, &mut rand::thread_rng())
    }

    /// Apply jitter using the supplied RNG
    pub fn apply_with<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Self::None => delay,
            Self::Bounded { max } => {
                let max = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                if max == 0 {
                    delay
                } else {
                    delay + Duration::from_millis(rng.gen_range(0..=max))
                }
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before each retry, before jitter
    pub backoff: ExponentialBackoff,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff {
                initial_delay: Duration::from_secs(1),
                base: 2.0,
                max_delay: Duration::from_secs(10),
            },
            jitter: Jitter::Bounded { max: Duration::from_millis(250) },
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let base = self.backoff.base;
        if !base.is_finite() || base < 1.0 {
            return Err("exponential base must be at least 1.0".to_string());
        }
        Ok(())
    }

    /// Total number of attempts allowed (first try + retries)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Same policy with a different retry budget
    #[must_use]
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self { max_retries, ..self.clone() }
    }

    /// Jittered delay before the given retry (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.jitter.apply(self.backoff.calculate_delay(retry))
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = ExponentialBackoff { initial_delay, base, max_delay };
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    pub fn bounded_jitter(mut self, max: Duration) -> Self {
        self.config.jitter = Jitter::Bounded { max };
        self
    }

    pub fn build(self) -> Result<RetryConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let backoff = ExponentialBackoff {
            initial_delay: Duration::from_secs(1),
            base: 2.0,
            max_delay: Duration::from_secs(10),
        };

        let delays: Vec<u64> = (0..6).map(|n| backoff.calculate_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(backoff.calculate_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_bounded_jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let jitter = Jitter::Bounded { max: Duration::from_millis(250) };

        for _ in 0..200 {
            let delay = jitter.apply_with(Duration::from_secs(1), &mut rng);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1_250));
        }
    }

    #[test]
    fn test_zero_bound_adds_nothing() {
        let mut rng = StdRng::seed_from_u64(11);
        let jitter = Jitter::Bounded { max: Duration::ZERO };
        let delay = jitter.apply_with(Duration::from_millis(800), &mut rng);
        assert_eq!(delay, Duration::from_millis(800));
    }

    #[test]
    fn test_builder_and_validation() {
        let config = RetryConfig::builder()
            .max_retries(5)
            .exponential_backoff(Duration::from_millis(10), 2.0, Duration::from_millis(100))
            .no_jitter()
            .build()
            .unwrap();

        assert_eq!(config.max_attempts(), 6);
        assert_eq!(config.delay_for(3), Duration::from_millis(80));
        assert_eq!(config.with_max_retries(1).max_attempts(), 2);

        assert!(RetryConfig::builder()
            .exponential_backoff(Duration::from_secs(1), 0.5, Duration::from_secs(2))
            .build()
            .is_err());
    }
}

//! Transport-level retry with exponential backoff and jitter.
//!
//! [`BackoffConfig`] controls how transient provider errors (429, 5xx,
//! timeouts) are retried with increasing delays. Tests use
//! [`BackoffConfig::none()`]; real runs use [`BackoffConfig::provider()`]
//! or [`PipelineConfig::backoff`](crate::config::PipelineConfig::backoff).

use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff and jitter.
///
/// # Example
///
/// ```
/// use content_pipeline::backend::BackoffConfig;
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_retries, 0);
///
/// let provider = BackoffConfig::provider();
/// assert_eq!(provider.max_retries, 3);
/// assert!(provider.rate_limit_delay.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of transport retries after the first attempt.
    pub max_retries: u32,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to delay after each retry.
    /// Delay grows: initial, initial * multiplier, initial * multiplier^2, ...
    pub multiplier: f64,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    pub jitter: JitterStrategy,

    /// HTTP status codes that trigger retry.
    pub retryable_statuses: Vec<u16>,

    /// Whether to respect `Retry-After` headers from the provider.
    pub respect_retry_after: bool,

    /// Fixed wait for a 429 without `Retry-After`. `None` falls back to the
    /// exponential schedule.
    pub rate_limit_delay: Option<Duration>,
}

/// Jitter strategy applied on top of the exponential delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// 3 retries, 1s initial, 2x multiplier, 60s max, full jitter,
    /// respects Retry-After.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
            respect_retry_after: true,
            rate_limit_delay: None,
        }
    }

    /// Hosted router settings: base-2 schedule (1s, 2s, 4s) with equal
    /// jitter, and a longer fixed wait on rate limits.
    pub fn provider() -> Self {
        Self {
            jitter: JitterStrategy::Equal,
            rate_limit_delay: Some(Duration::from_secs(15)),
            ..Self::standard()
        }
    }

    /// Calculate the delay for attempt N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`. Jitter is then applied according to the configured strategy.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::provider()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(max_delay: Duration) -> BackoffConfig {
        BackoffConfig {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay,
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429],
            respect_retry_after: false,
            rate_limit_delay: None,
        }
    }

    #[test]
    fn test_backoff_delay_base_two() {
        let config = exact(Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_delay_capped_at_max() {
        let config = exact(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_jitter_ranges() {
        let full = BackoffConfig {
            jitter: JitterStrategy::Full,
            ..exact(Duration::from_secs(60))
        };
        let equal = BackoffConfig {
            jitter: JitterStrategy::Equal,
            ..exact(Duration::from_secs(60))
        };
        for _ in 0..100 {
            assert!(full.delay_for_attempt(1) <= Duration::from_secs(2));
            let d = equal.delay_for_attempt(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2), "{:?}", d);
        }
    }

    #[test]
    fn test_presets() {
        assert_eq!(BackoffConfig::none().max_retries, 0);
        let standard = BackoffConfig::standard();
        assert_eq!(standard.max_retries, 3);
        assert!(standard.retryable_statuses.contains(&429));
        assert!(standard.retryable_statuses.contains(&503));
        assert_eq!(
            BackoffConfig::provider().rate_limit_delay,
            Some(Duration::from_secs(15))
        );
    }
}

//! Request pacing for registry lookups
//!
//! The registry is queried one identifier at a time. Between requests the
//! batch waits either a fixed delay after every lookup or for a token from a
//! per-minute token bucket.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;
use crate::config::{PacingStrategy, RateLimitConfig};

/// A token bucket rate limiter for controlling request rates
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens available in the bucket
    tokens: f64,
    /// Maximum tokens (bucket capacity)
    max_tokens: f64,
    /// Tokens added per second (refill rate)
    refill_rate: f64,
    /// Last time tokens were updated
    last_update: Instant,
    /// Whether rate limiting is enabled (false if rate is 0/unlimited)
    enabled: bool,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_minute` requests with no burst
    /// If requests_per_minute is 0, rate limiting is disabled
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let enabled = requests_per_minute > 0;

        Self {
            tokens: if enabled { 1.0 } else { f64::INFINITY },
            max_tokens: if enabled { 1.0 } else { f64::INFINITY },
            refill_rate: requests_per_minute as f64 / 60.0,
            last_update: Instant::now(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Refill tokens based on elapsed time
    fn refill(&mut self) {
        if !self.enabled {
            return;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_update = now;
    }

    /// Try to acquire a token, returning time to wait if not available
    pub fn try_acquire(&mut self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let wait_secs = (1.0 - self.tokens) / self.refill_rate;
            Some(Duration::from_secs_f64(wait_secs))
        }
    }

    /// Acquire a token, waiting if necessary
    pub async fn acquire(&mut self) {
        while let Some(wait_duration) = self.try_acquire() {
            debug!("Rate limiter waiting {:?} for token", wait_duration);
            sleep(wait_duration).await;
        }
    }
}

/// Pacing applied around each registry request
#[derive(Debug)]
pub enum RequestGate {
    /// Sleep a fixed interval after every request
    FixedDelay(Duration),
    /// Wait for a token before every request
    TokenBucket(RateLimiter),
    /// No pacing
    Disabled,
}

impl RequestGate {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        match config.strategy {
            PacingStrategy::FixedDelay if config.delay_ms > 0 => {
                Self::FixedDelay(Duration::from_millis(config.delay_ms))
            }
            PacingStrategy::TokenBucket if config.requests_per_minute > 0 => {
                Self::TokenBucket(RateLimiter::per_minute(config.requests_per_minute))
            }
            _ => Self::Disabled,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        if delay.is_zero() {
            Self::Disabled
        } else {
            Self::FixedDelay(delay)
        }
    }

    /// Called right before a request goes out
    pub async fn before_request(&mut self) {
        if let Self::TokenBucket(limiter) = self {
            limiter.acquire().await;
        }
    }

    /// Called once a request has completed, successfully or not
    pub async fn after_request(&mut self) {
        if let Self::FixedDelay(delay) = self {
            debug!("Waiting {:?} before the next lookup", delay);
            sleep(*delay).await;
        }
    }

    /// Human readable pacing description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::FixedDelay(delay) => format!("fixed delay of {} ms", delay.as_millis()),
            Self::TokenBucket(limiter) => format!("{:.0} requests/minute", limiter.refill_rate * 60.0),
            Self::Disabled => "unlimited".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_disabled() {
        let mut limiter = RateLimiter::per_minute(0);
        assert!(!limiter.is_enabled());
        assert!(limiter.try_acquire().is_none());
        assert!(limiter.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_rate_limiter_has_no_burst() {
        let mut limiter = RateLimiter::per_minute(60);
        assert!(limiter.is_enabled());
        // First request should succeed immediately
        assert!(limiter.try_acquire().is_none());
        // Second needs roughly one more second
        let wait = limiter.try_acquire().expect("second token should require a wait");
        assert!(wait > Duration::from_millis(900));
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn test_gate_from_config() {
        let config = RateLimitConfig {
            strategy: PacingStrategy::FixedDelay,
            delay_ms: 4000,
            requests_per_minute: 15,
        };
        assert!(matches!(
            RequestGate::from_config(&config),
            RequestGate::FixedDelay(d) if d == Duration::from_secs(4)
        ));

        let config = RateLimitConfig {
            strategy: PacingStrategy::TokenBucket,
            ..config
        };
        assert!(matches!(RequestGate::from_config(&config), RequestGate::TokenBucket(_)));

        let config = RateLimitConfig {
            strategy: PacingStrategy::FixedDelay,
            delay_ms: 0,
            requests_per_minute: 0,
        };
        assert!(matches!(RequestGate::from_config(&config), RequestGate::Disabled));
    }

    #[tokio::test]
    async fn test_fixed_delay_sleeps_after_request() {
        let mut gate = RequestGate::fixed(Duration::from_millis(50));
        let start = std::time::Instant::now();
        gate.before_request().await;
        assert!(start.elapsed() < Duration::from_millis(50));
        gate.after_request().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_disabled_gate_does_not_wait() {
        let mut gate = RequestGate::fixed(Duration::ZERO);
        assert_eq!(gate.describe(), "unlimited");
        let start = std::time::Instant::now();
        gate.before_request().await;
        gate.after_request().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}

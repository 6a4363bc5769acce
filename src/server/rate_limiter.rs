//! Per-client request throttling.
//!
//! Each client IP gets a token bucket holding up to `burst_size` tokens that
//! refills at `requests_per_second`. A request spends one token.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::config::LimitsSection;

/// Buckets untouched for this long are dropped by [`RateLimiter::cleanup`].
const STALE_AFTER: Duration = Duration::from_secs(60);

pub struct RateLimiter {
  config: LimitsSection,
  buckets: RwLock<HashMap<IpAddr, TokenBucket>>,
}

struct TokenBucket {
  tokens: f64,
  last_update: Instant,
  rate: f64,
  capacity: f64,
}

impl TokenBucket {
  fn new(rate: u32, capacity: u32) -> Self {
    Self {
      tokens: capacity as f64,
      last_update: Instant::now(),
      rate: rate as f64,
      capacity: capacity as f64,
    }
  }

  fn refill(&mut self, now: Instant) {
    let elapsed = now.duration_since(self.last_update).as_secs_f64();
    self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
    self.last_update = now;
  }

  /// Time until the next whole token is available.
  fn wait_time(&self) -> Duration {
    let missing = (1.0 - self.tokens).max(0.0);
    Duration::from_secs_f64(missing / self.rate)
  }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("rate limit exceeded for {ip}, retry after {retry_after:?}")]
pub struct RateLimited {
  pub ip: IpAddr,
  pub retry_after: Duration,
}

impl RateLimited {
  /// Whole seconds for a `Retry-After` header, never zero.
  pub fn retry_after_secs(&self) -> u64 {
    self.retry_after.as_secs_f64().ceil().max(1.0) as u64
  }
}

impl RateLimiter {
  pub fn new(config: LimitsSection) -> Self {
    Self {
      config,
      buckets: RwLock::new(HashMap::new()),
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.config.requests_per_second > 0
  }

  /// Spends one token for `ip`.
  pub fn check_request(&self, ip: IpAddr) -> Result<(), RateLimited> {
    if !self.is_enabled() {
      return Ok(());
    }

    let now = Instant::now();
    let mut buckets = self.buckets.write();
    let bucket = buckets.entry(ip).or_insert_with(|| {
      TokenBucket::new(self.config.requests_per_second, self.config.burst_size.max(1))
    });
    bucket.refill(now);

    if bucket.tokens >= 1.0 {
      bucket.tokens -= 1.0;
      Ok(())
    } else {
      Err(RateLimited {
        ip,
        retry_after: bucket.wait_time(),
      })
    }
  }

  /// Drops buckets that are idle and full again. Returns how many were removed.
  pub fn cleanup(&self) -> usize {
    let now = Instant::now();
    let mut buckets = self.buckets.write();
    let before = buckets.len();
    buckets.retain(|_, bucket| {
      let idle = now.duration_since(bucket.last_update) >= STALE_AFTER;
      bucket.refill(now);
      !(idle && bucket.tokens >= bucket.capacity)
    });
    before - buckets.len()
  }

  pub fn tracked_clients(&self) -> usize {
    self.buckets.read().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  fn limits(requests_per_second: u32, burst_size: u32) -> LimitsSection {
    LimitsSection {
      requests_per_second,
      burst_size,
    }
  }

  #[test]
  fn test_burst_then_limited() {
    let limiter = RateLimiter::new(limits(10, 5));
    let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

    for _ in 0..5 {
      assert!(limiter.check_request(ip).is_ok());
    }
    let err = limiter.check_request(ip).unwrap_err();
    assert_eq!(err.retry_after_secs(), 1);

    // Other clients have their own bucket.
    assert!(limiter
      .check_request(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)))
      .is_ok());
    assert_eq!(limiter.tracked_clients(), 2);
  }

  #[test]
  fn test_disabled_limiter_allows_everything() {
    let limiter = RateLimiter::new(limits(0, 0));
    let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    for _ in 0..1000 {
      assert!(limiter.check_request(ip).is_ok());
    }
    assert_eq!(limiter.tracked_clients(), 0);
  }

  #[test]
  fn test_cleanup_keeps_recent_buckets() {
    let limiter = RateLimiter::new(limits(10, 5));
    limiter
      .check_request(IpAddr::V4(Ipv4Addr::LOCALHOST))
      .unwrap();
    assert_eq!(limiter.cleanup(), 0);
    assert_eq!(limiter.tracked_clients(), 1);
  }
}

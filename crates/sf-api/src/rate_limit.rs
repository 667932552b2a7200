//! Per-client token buckets over the `/api` scope.
//!
//! Each client address gets `requests` tokens, refilled evenly over `window`.
//! Requests without a peer address (unix sockets, in-process tests) share one
//! bucket.

use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{web, ResponseError};
use dashmap::DashMap;
use sf_core::error::AppError;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    /// 100 requests per 15 minutes.
    fn default() -> Self {
        Self { requests: 100, window: Duration::from_secs(15 * 60) }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig) -> Self {
        Self { tokens: f64::from(config.requests), last_refill: Instant::now() }
    }

    fn try_consume(&mut self, config: &RateLimitConfig) -> bool {
        let now = Instant::now();
        let per_sec = f64::from(config.requests) / config.window.as_secs_f64();
        let refill = now.duration_since(self.last_refill).as_secs_f64() * per_sec;
        self.tokens = (self.tokens + refill).min(f64::from(config.requests));
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Untouched for a whole window means the bucket is full again.
    fn is_stale(&self, window: Duration) -> bool {
        self.last_refill.elapsed() > window
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<Option<IpAddr>, TokenBucket>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, buckets: DashMap::new(), last_sweep: Mutex::new(Instant::now()) }
    }

    /// Takes one token for `client`; `RateLimitExceeded` when none are left.
    pub fn check(&self, client: Option<IpAddr>) -> Result<(), AppError> {
        let allowed = self
            .buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::full(&self.config))
            .try_consume(&self.config);
        self.sweep_stale();

        if allowed {
            return Ok(());
        }
        warn!(client = ?client, "rate limit exceeded");
        Err(AppError::RateLimitExceeded(format!(
            "at most {} requests per {} seconds",
            self.config.requests,
            self.config.window.as_secs()
        )))
    }

    fn sweep_stale(&self) {
        // A sweep already in progress elsewhere is enough.
        let Ok(mut last) = self.last_sweep.try_lock() else { return };
        if last.elapsed() < self.config.window {
            return;
        }
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_stale(self.config.window));
        *last = Instant::now();
        debug!(removed = before - self.buckets.len(), "rate limit buckets swept");
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

/// `from_fn` middleware: answers 429 before routing when the client's
/// bucket is empty.
pub async fn limit_requests<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, actix_web::Error> {
    let verdict = match req.app_data::<web::Data<AppState>>() {
        Some(state) => state.rate_limiter.check(req.peer_addr().map(|addr| addr.ip())),
        None => Ok(()),
    };
    if let Err(err) = verdict {
        let response = ApiError::from(err).error_response();
        return Ok(req.into_response(response).map_into_right_body());
    }
    Ok(next.call(req).await?.map_into_left_body())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight(requests: u32) -> RateLimitConfig {
        RateLimitConfig { requests, window: Duration::from_secs(60) }
    }

    #[test]
    fn bucket_allows_its_capacity_then_refuses() {
        let limiter = RateLimiter::new(tight(3));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..3 {
            assert!(limiter.check(Some(ip)).is_ok());
        }
        assert!(matches!(limiter.check(Some(ip)), Err(AppError::RateLimitExceeded(_))));
    }

    #[test]
    fn clients_have_separate_buckets() {
        let limiter = RateLimiter::new(tight(1));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check(Some(a)).is_ok());
        assert!(limiter.check(Some(a)).is_err());
        assert!(limiter.check(Some(b)).is_ok());
        assert!(limiter.check(None).is_ok());
        assert_eq!(limiter.tracked_clients(), 3);
    }

    #[test]
    fn tokens_refill_over_the_window() {
        let config = RateLimitConfig { requests: 1, window: Duration::from_millis(20) };
        let limiter = RateLimiter::new(config);
        assert!(limiter.check(None).is_ok());
        assert!(limiter.check(None).is_err());
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check(None).is_ok());
    }

    #[test]
    fn stale_buckets_are_swept() {
        let config = RateLimitConfig { requests: 5, window: Duration::from_millis(10) };
        let limiter = RateLimiter::new(config);
        for last_octet in 1..=4u8 {
            limiter.check(Some(IpAddr::from([10, 0, 0, last_octet]))).unwrap();
        }
        std::thread::sleep(Duration::from_millis(30));
        limiter.check(Some(IpAddr::from([10, 0, 0, 9]))).unwrap();
        assert_eq!(limiter.tracked_clients(), 1);
    }
}

//! Rate limiting middleware.
//!
//! In-memory fixed-window limiting per client IP, applied to the credential endpoints.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Configuration for rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    /// Extra requests tolerated above `max_requests` before rejecting.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window: Duration::from_secs(60),
            burst: 5,
        }
    }
}

/// Rate limiter state tracking requests per IP.
#[derive(Clone)]
pub struct RateLimitLayer {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<IpAddr, RateLimitEntry>>>,
}

struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Debug, PartialEq, Eq)]
enum RateLimitResult {
    Allowed { remaining: u32 },
    BurstUsed { remaining: u32 },
    Exceeded { retry_after: Duration },
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn check(&self, ip: IpAddr) -> RateLimitResult {
        let mut state = self.state.lock();
        let now = Instant::now();

        let entry = state.entry(ip).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count = entry.count.saturating_add(1);

        let limit = self.config.max_requests.saturating_add(self.config.burst);
        let remaining = limit.saturating_sub(entry.count);
        let reset_at = entry.window_start + self.config.window;

        if entry.count > limit {
            RateLimitResult::Exceeded {
                retry_after: reset_at.saturating_duration_since(now),
            }
        } else if entry.count > self.config.max_requests {
            RateLimitResult::BurstUsed { remaining }
        } else {
            RateLimitResult::Allowed { remaining }
        }
    }

    /// Drop entries idle for two windows. Called periodically from a background task.
    pub fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        state.retain(|_, entry| now.duration_since(entry.window_start) < window * 2);
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.state.lock().len()
    }
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<RateLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();

    match limiter.check(ip) {
        RateLimitResult::Allowed { remaining } | RateLimitResult::BurstUsed { remaining } => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            response
        }
        RateLimitResult::Exceeded { retry_after } => {
            // Round up so clients never retry inside the same window.
            let retry_secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            warn!(
                ip = %ip,
                path = %request.uri().path(),
                retry_after_secs = retry_secs,
                "Rate limit exceeded"
            );

            let body = serde_json::json!({
                "detail": "Too many requests. Please slow down.",
                "retry_after_seconds": retry_secs,
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_secs.to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, burst: u32, window: Duration) -> RateLimitLayer {
        RateLimitLayer::new(RateLimitConfig {
            max_requests,
            window,
            burst,
        })
    }

    #[test]
    fn test_rate_limit_allows_under_limit() {
        let limiter = limiter(10, 5, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for i in 0..10 {
            assert_eq!(limiter.check(ip), RateLimitResult::Allowed { remaining: 14 - i });
        }
    }

    #[test]
    fn test_rate_limit_allows_burst_then_rejects() {
        let limiter = limiter(5, 3, Duration::from_secs(60));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..5 {
            assert!(matches!(limiter.check(ip), RateLimitResult::Allowed { .. }));
        }
        for _ in 0..3 {
            assert!(matches!(limiter.check(ip), RateLimitResult::BurstUsed { .. }));
        }
        match limiter.check(ip) {
            RateLimitResult::Exceeded { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
            }
            other => panic!("expected exceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_clients_are_counted_separately() {
        let limiter = limiter(1, 0, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(matches!(limiter.check(a), RateLimitResult::Allowed { .. }));
        assert!(matches!(limiter.check(a), RateLimitResult::Exceeded { .. }));
        assert!(matches!(limiter.check(b), RateLimitResult::Allowed { .. }));
    }

    #[test]
    fn test_window_reset_and_cleanup() {
        let limiter = limiter(1, 0, Duration::from_millis(20));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert!(matches!(limiter.check(ip), RateLimitResult::Allowed { .. }));
        assert!(matches!(limiter.check(ip), RateLimitResult::Exceeded { .. }));

        std::thread::sleep(Duration::from_millis(30));
        assert!(matches!(limiter.check(ip), RateLimitResult::Allowed { .. }));

        std::thread::sleep(Duration::from_millis(50));
        limiter.cleanup();
        assert_eq!(limiter.tracked_clients(), 0);
    }
}

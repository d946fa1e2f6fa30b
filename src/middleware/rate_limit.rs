use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::error::AppError;
use crate::state::AppState;

/// Requests allowed per client per window.
pub const RATE_LIMIT: u32 = 500;
/// Window duration in seconds; tokens refill fully after this period.
pub const WINDOW_SECS: u64 = 15 * 60;

#[derive(Debug, Clone)]
struct Bucket {
    remaining: u32,
    last_refill: Instant,
}

/// Token buckets keyed by client.
pub struct RateLimiter {
    capacity: u32,
    window_secs: u64,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window_secs: u64) -> Self {
        Self {
            capacity,
            window_secs,
            buckets: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Take one token for `key`. `Ok` carries the tokens left, `Err` the
    /// seconds to wait.
    pub fn check(&self, key: &str, now: Instant) -> Result<u32, u64> {
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                remaining: self.capacity,
                last_refill: now,
            });
        let bucket = entry.value_mut();

        let elapsed = now.duration_since(bucket.last_refill).as_secs();
        if elapsed >= self.window_secs {
            bucket.remaining = self.capacity;
            bucket.last_refill = now;
        } else if elapsed > 0 {
            let refill =
                ((elapsed as f64 / self.window_secs as f64) * self.capacity as f64) as u32;
            if refill > 0 {
                bucket.remaining = (bucket.remaining + refill).min(self.capacity);
                bucket.last_refill = now;
            }
        }

        if bucket.remaining == 0 {
            let wait = self
                .window_secs
                .saturating_sub(now.duration_since(bucket.last_refill).as_secs());
            Err(wait.max(1))
        } else {
            bucket.remaining -= 1;
            Ok(bucket.remaining)
        }
    }
}

impl RateLimiter {
    /// Drop buckets untouched for a full window; they would refill to
    /// capacity anyway. Returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.duration_since(b.last_refill).as_secs() < self.window_secs);
        before.saturating_sub(self.buckets.len())
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RATE_LIMIT, WINDOW_SECS)
    }
}

/// Key a request by its hashed Authorization header, else its forwarded
/// client address.
fn client_key(req: &Request) -> String {
    let headers = req.headers();
    if let Some(auth) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
        let mut hasher = Sha256::new();
        hasher.update(auth.as_bytes());
        return format!("auth:{:x}", hasher.finalize());
    }
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "anon".to_string())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if state.test_mode {
        return next.run(req).await;
    }

    let key = client_key(&req);
    let remaining = match state.rate_limiter.check(&key, Instant::now()) {
        Ok(remaining) => remaining,
        Err(retry_after) => {
            tracing::debug!("rate limited {key} for {retry_after}s");
            return AppError::RateLimited { retry_after }.into_response();
        }
    };

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from(state.rate_limiter.capacity()),
    );
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    response
}

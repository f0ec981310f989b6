use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";

const ANONYMOUS: &str = "anonymous";

/// Rate limiter configuration
pub struct RateLimiterConfig {
    /// Maximum requests per minute for one user
    pub requests_per_minute: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100, // Default: 100 requests per minute
        }
    }
}

/// Per-user rate limiter
pub type UserRateLimiter = Arc<RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>;

/// Create a new rate limiter
pub fn create_rate_limiter(config: RateLimiterConfig) -> UserRateLimiter {
    let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
}

/// Forget users whose quota has fully replenished. Returns how many remain.
pub fn prune_rate_limiter(limiter: &UserRateLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

/// Prune the per-user state every `period`, until the handle is aborted
pub fn spawn_rate_limiter_pruner(limiter: UserRateLimiter, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let remaining = prune_rate_limiter(&limiter);
            debug!("Rate limiter tracking {} users", remaining);
        }
    })
}

fn user_key(request: &Request) -> String {
    request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

/// Middleware to apply rate limiting, keyed by `X-User-ID`
pub async fn rate_limit_middleware(
    limiter: UserRateLimiter,
    request: Request,
    next: Next,
) -> Response {
    let key = user_key(&request);
    match limiter.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!("Rate limit exceeded for {}", key);
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Please try again later.",
            )
                .into_response()
        }
    }
}

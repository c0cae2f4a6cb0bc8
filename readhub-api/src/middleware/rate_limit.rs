/// Fixed-window rate limiting for the authentication endpoints
///
/// Each client IP gets `auth_per_minute` requests per 60 second window,
/// counted in Redis under `readhub:ratelimit:auth:{ip}` so every API
/// instance shares the same budget. Without Redis, or when Redis fails, the
/// limiter lets requests through.
///
/// The client IP is the socket peer. `X-Forwarded-For` is only read when
/// `TRUSTED_PROXY_HOPS` is set, and then only the entry appended by the
/// outermost trusted proxy counts; anything to its left is client supplied.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: requests allowed per window
/// - `X-RateLimit-Remaining`: requests left in the current window
/// - `X-RateLimit-Reset`: seconds until the window resets
/// - `Retry-After`: seconds to wait (429 responses only)

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use readhub_shared::cache::keys;
use std::net::SocketAddr;

/// Length of one counting window
pub const WINDOW_SECS: u64 = 60;

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_in_secs: u64,
}

impl RateLimitDecision {
    pub fn new(count: u64, limit: u64, reset_in_secs: u64) -> Self {
        Self {
            allowed: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            reset_in_secs: reset_in_secs.max(1),
        }
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(self.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(self.reset_in_secs));
    }
}

/// Client address as seen by the outermost of `trusted_hops` proxies, or
/// the socket peer when no proxy is trusted
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_hops: usize) -> String {
    let forwarded = (trusted_hops > 0)
        .then(|| forwarded_client(headers, trusted_hops))
        .flatten();

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// The `trusted_hops`-th `X-Forwarded-For` entry counted from the right
fn forwarded_client(headers: &HeaderMap, trusted_hops: usize) -> Option<String> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let hops: Vec<&str> = value.split(',').map(str::trim).collect();
    let index = hops.len().checked_sub(trusted_hops)?;

    hops.get(index)
        .filter(|hop| !hop.is_empty())
        .map(|hop| hop.to_string())
}

/// Middleware applied to `/v1/auth/*`
pub async fn auth_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limit = state.config.rate_limit.auth_per_minute;
    let Some(cache) = state.cache.as_ref().filter(|_| limit > 0) else {
        return Ok(next.run(request).await);
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(
        request.headers(),
        peer,
        state.config.rate_limit.trusted_proxy_hops,
    );

    let window = match cache
        .incr_window(&keys::rate_limit("auth", &ip), WINDOW_SECS)
        .await
    {
        Ok(window) => window,
        Err(e) => {
            tracing::warn!(error = %e, "Rate limit check failed, allowing request");
            return Ok(next.run(request).await);
        }
    };

    let decision = RateLimitDecision::new(window.count, limit, window.reset_in_secs);
    if !decision.allowed {
        tracing::info!(ip = %ip, count = window.count, "Auth rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after: decision.reset_in_secs,
            message: format!(
                "Too many attempts. Try again in {} seconds",
                decision.reset_in_secs
            ),
        });
    }

    let mut response = next.run(request).await;
    decision.apply_headers(response.headers_mut());
    Ok(response)
}

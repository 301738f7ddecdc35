//! Per-client rate limiting for the unauthenticated write routes.

use super::{ApiError, AppState};
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::SocketAddr;
use std::num::NonZeroU32;

/// Limiter keyed by client address.
pub type ClientLimiter = DefaultKeyedRateLimiter<String>;

pub fn client_limiter(per_minute: NonZeroU32) -> ClientLimiter {
    RateLimiter::keyed(Quota::per_minute(per_minute))
}

/// Client key: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// peer address.
pub fn client_key(req: &Request) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = client_key(&req);
    if state.limiter.check_key(&key).is_err() {
        tracing::warn!(client = %key, path = %req.uri().path(), "Rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }
    next.run(req).await
}

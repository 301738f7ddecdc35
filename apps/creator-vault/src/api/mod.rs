//! # HTTP API
//!
//! JSON API under `/api/*`. Every response uses the envelope
//! `{ "success": bool, "data"?: ..., "error"?: string }`.
//!
//! ```text
//! /api/health                                  GET
//! /api/auth/nonce                              GET    (rate limited)
//! /api/auth/verify                             POST   (rate limited)
//! /api/auth/session                            GET
//! /api/auth/logout                             POST
//! /api/waitlist/signup                         POST   (rate limited)
//! /api/waitlist/status                         GET
//! /api/waitlist/leaderboard                    GET
//! /api/waitlist/points                         POST   (internal key or admin)
//! /api/admin/access-requests                   GET    (admin)
//! /api/admin/access-requests/{id}/approve      POST   (admin)
//! /api/admin/access-requests/{id}/deny         POST   (admin)
//! /api/admin/allowlist                         GET, POST (admin)
//! /api/admin/allowlist/{address}               DELETE (admin)
//! /api/creator/access-requests                 POST   (session)
//! /api/creator/access-status                   GET    (session)
//! /api/creator/wallets                         GET, POST (session)
//! ```

mod admin;
mod auth;
mod cookies;
mod creator;
mod rate_limit;
mod response;
mod session;
mod waitlist;

pub use cookies::{NONCE_COOKIE, SESSION_COOKIE};
pub use rate_limit::ClientLimiter;
pub use response::{ApiError, ApiQuery, ApiResponse, ApiResult};
pub use session::{AdminSession, AuthSession};

use crate::config::ServerConfig;
use crate::rpc::{RpcClient, RpcError};
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{delete, get, post};
use axum::{Json, Router, middleware};
use creator_vault_core::Store;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the internal API key.
pub const INTERNAL_KEY_HEADER: &str = "x-internal-api-key";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<ServerConfig>,
    pub rpc: Option<RpcClient>,
    pub limiter: Arc<ClientLimiter>,
}

impl AppState {
    pub fn new(store: Store, config: ServerConfig) -> Result<Self, RpcError> {
        let rpc = if config.rpc_urls.is_empty() {
            None
        } else {
            Some(RpcClient::new(config.rpc_urls.clone())?)
        };
        let limiter = Arc::new(rate_limit::client_limiter(config.rate_limit_per_minute));
        Ok(Self {
            store,
            config: Arc::new(config),
            rpc,
            limiter,
        })
    }
}

/// Build the router.
pub fn create_router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/api/auth/nonce", get(auth::nonce))
        .route("/api/auth/verify", post(auth::verify))
        .route("/api/waitlist/signup", post(waitlist::signup))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit,
        ));

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/session", get(auth::session))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/waitlist/status", get(waitlist::status))
        .route("/api/waitlist/leaderboard", get(waitlist::leaderboard))
        .route("/api/waitlist/points", post(waitlist::award))
        .route("/api/admin/access-requests", get(admin::list_requests))
        .route(
            "/api/admin/access-requests/{id}/approve",
            post(admin::approve_request),
        )
        .route(
            "/api/admin/access-requests/{id}/deny",
            post(admin::deny_request),
        )
        .route(
            "/api/admin/allowlist",
            get(admin::list_allowlist).post(admin::add_allowlist),
        )
        .route(
            "/api/admin/allowlist/{address}",
            delete(admin::revoke_allowlist),
        )
        .route(
            "/api/creator/access-requests",
            post(creator::request_access),
        )
        .route("/api/creator/access-status", get(creator::access_status))
        .route(
            "/api/creator/wallets",
            get(creator::list_wallets).post(creator::link_wallet),
        )
        .merge(limited)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(INTERNAL_KEY_HEADER),
        ])
}

async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

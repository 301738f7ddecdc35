//! Session extractors.

use super::cookies::{SESSION_COOKIE, bearer_token, get_cookie};
use super::{ApiError, AppState, unix_now};
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use creator_vault_core::Session;

/// The signed-in wallet. Rejects with 401.
#[derive(Debug, Clone, Copy)]
pub struct AuthSession(pub Session);

/// A signed-in admin. Rejects with 401 without a session, 403 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct AdminSession(pub Session);

/// Session from the `session` cookie, else from a bearer token.
pub fn current_session(headers: &HeaderMap, state: &AppState, now: u64) -> Option<Session> {
    [get_cookie(headers, SESSION_COOKIE), bearer_token(headers)]
        .into_iter()
        .flatten()
        .find_map(|token| state.config.signer.verify_session(&token, now).ok())
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        current_session(&parts.headers, state, unix_now())
            .map(Self)
            .ok_or_else(|| ApiError::Unauthorized("sign in required".to_string()))
    }
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthSession(session) = AuthSession::from_request_parts(parts, state).await?;
        if state.config.is_admin(&session.address) {
            Ok(Self(session))
        } else {
            tracing::warn!(address = %session.address, "Admin endpoint denied");
            Err(ApiError::Forbidden("admin access required".to_string()))
        }
    }
}

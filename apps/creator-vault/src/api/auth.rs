//! SIWE sign-in: nonce, verify, session, logout.

use super::cookies::{
    NONCE_COOKIE, SESSION_COOKIE, clear_cookie, get_cookie, set_cookie, with_cookies,
};
use super::response::{ApiError, ApiResult, ok};
use super::{AppState, AuthSession, unix_now};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::http::header::HOST;
use axum::response::Response;
use creator_vault_core::token::{NONCE_TTL_SECS, SESSION_TTL_SECS};
use creator_vault_core::{Address, SiweMessage, VerifyOptions};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of issued nonces.
pub const NONCE_LEN: usize = 17;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub nonce: String,
    pub nonce_token: String,
    pub expires_at: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub message: Option<String>,
    pub signature: Option<String>,
    pub nonce_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub address: Address,
    pub chain_id: u64,
    pub session_token: String,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub address: Address,
    pub is_admin: bool,
    pub is_creator: bool,
    pub expires_at: u64,
}

fn random_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Domains a message may be addressed to. Configured domains win; the
/// request `Host` is only trusted when none are configured.
fn accepted_domains(allowed: &[String], headers: &HeaderMap) -> Vec<String> {
    if !allowed.is_empty() {
        return allowed.to_vec();
    }
    headers
        .get_all(HOST)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// GET /api/auth/nonce
pub async fn nonce(State(state): State<AppState>) -> ApiResult<Response> {
    let now = unix_now();
    let nonce = random_nonce();
    let (nonce_token, expires_at) = state.config.signer.issue_nonce(&nonce, now)?;
    let cookie = set_cookie(NONCE_COOKIE, &nonce, NONCE_TTL_SECS, state.config.cookie_secure);
    let body = NonceResponse {
        nonce,
        nonce_token,
        expires_at,
    };
    Ok(with_cookies(ok(body), &[cookie]))
}

/// POST /api/auth/verify
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (Some(text), Some(signature)) = (
        body.message.filter(|m| !m.trim().is_empty()),
        body.signature.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "message and signature are required".to_string(),
        ));
    };

    let message = SiweMessage::parse(&text)?;
    let now = unix_now();
    let signer = &state.config.signer;

    let domains = accepted_domains(&state.config.allowed_domains, &headers);

    let mut nonces = Vec::new();
    let mut nonce_expires_at = now.saturating_add(NONCE_TTL_SECS);
    if let Some(cookie) = get_cookie(&headers, NONCE_COOKIE) {
        nonces.push(cookie);
    }
    if let Some(token) = body.nonce_token.as_deref() {
        match signer.verify_nonce(token, now) {
            Ok((nonce, expires_at)) => {
                if nonce == message.nonce {
                    nonce_expires_at = expires_at;
                }
                nonces.push(nonce);
            }
            Err(e) => tracing::debug!(error = %e, "Ignoring invalid nonce token"),
        }
    }

    let opts = VerifyOptions::new(domains, nonces, now);
    let address = message.verify(&text, &signature, &opts)?;

    // Keep the nonce recorded for as long as the message itself verifies.
    let keep_until = nonce_expires_at.max(message.usable_until(opts.max_age_secs)?);
    if !state.store.consume_nonce(&message.nonce, keep_until, now)?
    {
        tracing::warn!(address = %address, "Replayed SIWE nonce");
        return Err(ApiError::BadRequest("nonce already used".to_string()));
    }

    let (session_token, expires_at) = signer.issue_session(&address, now)?;
    tracing::info!(address = %address, chain_id = message.chain_id, "SIWE sign-in");

    let secure = state.config.cookie_secure;
    let cookies = [
        set_cookie(SESSION_COOKIE, &session_token, SESSION_TTL_SECS, secure),
        clear_cookie(NONCE_COOKIE, secure),
    ];
    let body = VerifyResponse {
        address,
        chain_id: message.chain_id,
        session_token,
        expires_at,
    };
    Ok(with_cookies(ok(body), &cookies))
}

/// GET /api/auth/session
pub async fn session(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> ApiResult<Response> {
    let is_creator = state.store.is_allowlisted(&session.address)?;
    Ok(ok(SessionResponse {
        address: session.address,
        is_admin: state.config.is_admin(&session.address),
        is_creator,
        expires_at: session.expires_at,
    }))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>) -> Response {
    let cookie = clear_cookie(SESSION_COOKIE, state.config.cookie_secure);
    with_cookies(ok(serde_json::json!({ "loggedOut": true })), &[cookie])
}

//! Waitlist signup, status, leaderboard and point awards.

use super::response::{ApiError, ApiQuery, ApiResult, created, ok};
use super::session::current_session;
use super::{AppState, INTERNAL_KEY_HEADER, unix_now};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use creator_vault_core::{Address, AwardOutcome, NewSignup, PointSource, Signup, VaultError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Length of generated referral codes.
pub const REFERRAL_CODE_LEN: usize = 8;

/// Unambiguous uppercase characters used in referral codes.
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Attempts at drawing an unused referral code.
const CODE_ATTEMPTS: usize = 5;

const DEFAULT_LEADERBOARD: usize = 10;
const MAX_LEADERBOARD: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: Option<String>,
    pub wallet_address: Option<String>,
    pub referral_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub email: Option<String>,
    pub wallet: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub signup: Signup,
    pub points: u64,
    pub referral_count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRequest {
    pub signup_id: u64,
    pub source: String,
    pub source_id: String,
}

#[derive(Debug, Serialize)]
pub struct AwardResponse {
    #[serde(flatten)]
    pub outcome: AwardOutcome,
    pub balance: u64,
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| char::from(CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())]))
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /api/waitlist/signup
pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let wallet = non_empty(body.wallet_address)
        .map(|w| Address::parse(&w))
        .transpose()?;
    let email = non_empty(body.email);
    let referred_by_code = non_empty(body.referral_code);
    let now = unix_now();

    for _ in 0..CODE_ATTEMPTS {
        let new = NewSignup {
            email: email.clone(),
            wallet,
            referral_code: random_code(),
            referred_by_code: referred_by_code.clone(),
        };
        match state.store.create_signup(new, now) {
            Ok(outcome) if outcome.created => {
                tracing::info!(
                    signup_id = outcome.signup.id,
                    referred_by = ?outcome.signup.referred_by,
                    "Waitlist signup"
                );
                return Ok(created(outcome));
            }
            Ok(outcome) => return Ok(ok(outcome)),
            Err(VaultError::Conflict(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Internal(
        "could not allocate a referral code".to_string(),
    ))
}

/// GET /api/waitlist/status?email=|wallet=|code=
pub async fn status(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> ApiResult<Response> {
    let signup = if let Some(email) = non_empty(query.email) {
        state.store.signup_by_email(&email)?
    } else if let Some(wallet) = non_empty(query.wallet) {
        state.store.signup_by_wallet(&Address::parse(&wallet)?)?
    } else if let Some(code) = non_empty(query.code) {
        state.store.signup_by_code(&code)?
    } else {
        return Err(ApiError::BadRequest(
            "one of email, wallet or code is required".to_string(),
        ));
    };
    let signup = signup.ok_or_else(|| ApiError::NotFound("signup not found".to_string()))?;

    let points = state.store.points_balance(signup.id)?;
    let referral_count = state.store.referral_count(signup.id)?;
    Ok(ok(StatusResponse {
        signup,
        points,
        referral_count,
    }))
}

/// GET /api/waitlist/leaderboard?limit=
pub async fn leaderboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> ApiResult<Response> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD)
        .clamp(1, MAX_LEADERBOARD);
    Ok(ok(state.store.leaderboard(limit)?))
}

/// Internal key (constant-time) or an admin session.
fn authorize_award(headers: &HeaderMap, state: &AppState) -> ApiResult<()> {
    if let Some(given) = headers.get(INTERNAL_KEY_HEADER) {
        let Some(expected) = state.config.internal_api_key.as_deref() else {
            return Err(ApiError::Unauthorized("internal API key is disabled".to_string()));
        };
        if bool::from(given.as_bytes().ct_eq(expected.as_bytes())) {
            return Ok(());
        }
        tracing::warn!("Rejected internal API key");
        return Err(ApiError::Unauthorized("invalid internal API key".to_string()));
    }
    match current_session(headers, state, unix_now()) {
        Some(session) if state.config.is_admin(&session.address) => Ok(()),
        Some(_) => Err(ApiError::Forbidden("admin access required".to_string())),
        None => Err(ApiError::Unauthorized(
            "internal API key or admin session required".to_string(),
        )),
    }
}

/// POST /api/waitlist/points
pub async fn award(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AwardRequest>, JsonRejection>,
) -> ApiResult<Response> {
    authorize_award(&headers, &state)?;
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let source: PointSource = body.source.parse()?;

    let outcome = state
        .store
        .award_points(body.signup_id, source, &body.source_id, unix_now())?;
    if outcome.is_awarded() {
        tracing::info!(
            signup_id = body.signup_id,
            source = %source,
            source_id = %body.source_id,
            "Points awarded"
        );
    }
    let balance = state.store.points_balance(body.signup_id)?;
    Ok(ok(AwardResponse { outcome, balance }))
}

//! Admin moderation of creator access.

use super::response::{ApiError, ApiQuery, ApiResult, json_body, ok};
use super::{AdminSession, AppState, unix_now};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;
use creator_vault_core::{Address, RequestStatus};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct RequestsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DenyRequest {
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistQuery {
    pub include_revoked: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AllowlistRequest {
    pub address: Option<String>,
    pub note: Option<String>,
}

fn parse_id(raw: &str) -> ApiResult<u64> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid request id '{}'", raw)))
}

fn clean_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// GET /api/admin/access-requests?status=
pub async fn list_requests(
    State(state): State<AppState>,
    _admin: AdminSession,
    ApiQuery(query): ApiQuery<RequestsQuery>,
) -> ApiResult<Response> {
    let status = query
        .status
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<RequestStatus>())
        .transpose()?;
    Ok(ok(state.store.access_requests(status)?))
}

/// POST /api/admin/access-requests/{id}/approve
pub async fn approve_request(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let request = state
        .store
        .approve_access_request(id, admin.address, unix_now())?;
    tracing::info!(
        request_id = id,
        wallet = %request.wallet_address,
        reviewer = %admin.address,
        "Access request approved"
    );
    Ok(ok(request))
}

/// POST /api/admin/access-requests/{id}/deny
pub async fn deny_request(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let body: DenyRequest = json_body(&body)?;
    let request =
        state
            .store
            .deny_access_request(id, admin.address, clean_note(body.note), unix_now())?;
    tracing::info!(
        request_id = id,
        wallet = %request.wallet_address,
        reviewer = %admin.address,
        "Access request denied"
    );
    Ok(ok(request))
}

/// GET /api/admin/allowlist?includeRevoked=
pub async fn list_allowlist(
    State(state): State<AppState>,
    _admin: AdminSession,
    ApiQuery(query): ApiQuery<AllowlistQuery>,
) -> ApiResult<Response> {
    let include_revoked = query.include_revoked.unwrap_or(false);
    Ok(ok(state.store.allowlist(include_revoked)?))
}

/// POST /api/admin/allowlist
pub async fn add_allowlist(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    body: Bytes,
) -> ApiResult<Response> {
    let body: AllowlistRequest = json_body(&body)?;
    let address = body
        .address
        .ok_or_else(|| ApiError::BadRequest("address is required".to_string()))?;
    let address = Address::parse(&address)?;
    let entry = state.store.allowlist_add(
        address,
        Some(admin.address),
        clean_note(body.note),
        unix_now(),
    )?;
    tracing::info!(address = %address, approved_by = %admin.address, "Allowlisted creator");
    Ok(ok(entry))
}

/// DELETE /api/admin/allowlist/{address}
pub async fn revoke_allowlist(
    State(state): State<AppState>,
    AdminSession(admin): AdminSession,
    Path(address): Path<String>,
) -> ApiResult<Response> {
    let address = Address::parse(&address)?;
    let entry = state.store.allowlist_revoke(&address, unix_now())?;
    tracing::info!(address = %address, revoked_by = %admin.address, "Revoked creator");
    Ok(ok(entry))
}

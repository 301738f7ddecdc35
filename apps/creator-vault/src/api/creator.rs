//! Creator self-service: access requests and wallet links.

use super::response::{ApiError, ApiQuery, ApiResult, created, json_body, ok};
use super::{AppState, AuthSession, unix_now};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use creator_vault_core::store::OWNER_ROLE;
use creator_vault_core::{AccessRequest, Address, CreatorWallet};
use serde::{Deserialize, Serialize};

/// `verified_via` for links made by a signed-in wallet.
const VERIFIED_VIA_SIWE: &str = "siwe";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestBody {
    pub coin_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessStatus {
    pub allowlisted: bool,
    pub request: Option<AccessRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkWalletBody {
    pub coin_address: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LinkedWallet {
    pub wallet: CreatorWallet,
    pub created: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct WalletsQuery {
    pub coin: Option<String>,
}

/// When RPC is configured, `coin` must hold contract code.
async fn ensure_contract(state: &AppState, coin: &Address) -> ApiResult<()> {
    let Some(rpc) = &state.rpc else {
        return Ok(());
    };
    if rpc.has_code(coin).await? {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("no contract deployed at {}", coin)))
    }
}

fn parse_coin(raw: Option<String>) -> ApiResult<Option<Address>> {
    Ok(raw
        .filter(|c| !c.trim().is_empty())
        .map(|c| Address::parse(&c))
        .transpose()?)
}

/// POST /api/creator/access-requests
pub async fn request_access(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    body: Bytes,
) -> ApiResult<Response> {
    let body: AccessRequestBody = json_body(&body)?;
    let coin = parse_coin(body.coin_address)?;
    if let Some(coin) = &coin {
        ensure_contract(&state, coin).await?;
    }
    let request = state
        .store
        .create_access_request(session.address, coin, unix_now())?;
    tracing::info!(
        request_id = request.id,
        wallet = %session.address,
        "Creator access requested"
    );
    Ok(created(request))
}

/// GET /api/creator/access-status
pub async fn access_status(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> ApiResult<Response> {
    Ok(ok(AccessStatus {
        allowlisted: state.store.is_allowlisted(&session.address)?,
        request: state.store.latest_access_request(&session.address)?,
    }))
}

/// POST /api/creator/wallets
pub async fn link_wallet(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    body: Bytes,
) -> ApiResult<Response> {
    let body: LinkWalletBody = json_body(&body)?;
    let coin = parse_coin(body.coin_address)?
        .ok_or_else(|| ApiError::BadRequest("coinAddress is required".to_string()))?;
    if !state.store.is_allowlisted(&session.address)? {
        return Err(ApiError::Forbidden(
            "wallet is not an approved creator".to_string(),
        ));
    }
    ensure_contract(&state, &coin).await?;

    let role = body.role.unwrap_or_else(|| OWNER_ROLE.to_string());
    let (wallet, created_row) = state.store.link_creator_wallet(
        coin,
        session.address,
        &role,
        VERIFIED_VIA_SIWE,
        unix_now(),
    )?;
    tracing::info!(coin = %coin, wallet = %session.address, role = %wallet.wallet_role, "Creator wallet linked");
    let linked = LinkedWallet {
        wallet,
        created: created_row,
    };
    Ok(if created_row {
        created(linked)
    } else {
        ok(linked)
    })
}

/// GET /api/creator/wallets?coin=
pub async fn list_wallets(
    State(state): State<AppState>,
    _session: AuthSession,
    ApiQuery(query): ApiQuery<WalletsQuery>,
) -> ApiResult<Response> {
    let coin = parse_coin(query.coin)?
        .ok_or_else(|| ApiError::BadRequest("coin is required".to_string()))?;
    Ok(ok(state.store.creator_wallets(&coin)?))
}

//! Creator allowlist, access requests and creator wallets.

use super::records::{AccessRequest, AllowlistEntry, CreatorWallet, RequestStatus};
use super::tables::{Tables, wallet_key, wallet_range};
use super::{Store, decode, encode, next_id};
use crate::address::Address;
use crate::error::{Result, VaultError};
use redb::{ReadableDatabase, ReadableTable, WriteTransaction};

const REQUEST_COUNTER: &str = "access_request";
const WALLET_COUNTER: &str = "creator_wallet";

/// Role given to the wallet of an approved access request.
pub const OWNER_ROLE: &str = "owner";

impl Store {
    // =========================================================================
    // ALLOWLIST
    // =========================================================================

    /// Add or re-activate an address on the allowlist.
    pub fn allowlist_add(
        &self,
        address: Address,
        approved_by: Option<Address>,
        note: Option<String>,
        now: u64,
    ) -> Result<AllowlistEntry> {
        let txn = self.db.begin_write()?;
        let entry = put_allowlist(&txn, address, approved_by, note, now)?;
        txn.commit()?;
        Ok(entry)
    }

    /// Revoke an allowlisted address. Revoking twice keeps the first time.
    pub fn allowlist_revoke(&self, address: &Address, now: u64) -> Result<AllowlistEntry> {
        let key = address.to_lower_hex();
        let txn = self.db.begin_write()?;
        let entry = {
            let mut table = txn.open_table(Tables::ALLOWLIST)?;
            let existing = table.get(key.as_str())?.map(|g| g.value().to_vec());
            let bytes = existing.ok_or_else(|| VaultError::not_found("allowlist entry", address))?;
            let mut entry: AllowlistEntry = decode(&bytes)?;
            if entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                table.insert(key.as_str(), encode(&entry)?.as_slice())?;
            }
            entry
        };
        txn.commit()?;
        Ok(entry)
    }

    pub fn allowlist_get(&self, address: &Address) -> Result<Option<AllowlistEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::ALLOWLIST)?;
        let result = match table.get(address.to_lower_hex().as_str())? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        Ok(result)
    }

    /// True if the address has an active (non-revoked) allowlist row.
    pub fn is_allowlisted(&self, address: &Address) -> Result<bool> {
        Ok(self
            .allowlist_get(address)?
            .map(|e| e.is_active())
            .unwrap_or(false))
    }

    /// Allowlist rows ordered by address.
    pub fn allowlist(&self, include_revoked: bool) -> Result<Vec<AllowlistEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::ALLOWLIST)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let entry: AllowlistEntry = decode(value.value())?;
            if include_revoked || entry.is_active() {
                out.push(entry);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // ACCESS REQUESTS
    // =========================================================================

    /// File a pending request for `wallet`.
    ///
    /// Fails with [`VaultError::AlreadyAllowlisted`] for active creators and
    /// [`VaultError::PendingRequestExists`] if a request is already pending.
    pub fn create_access_request(
        &self,
        wallet: Address,
        coin: Option<Address>,
        now: u64,
    ) -> Result<AccessRequest> {
        let wallet_key = wallet.to_lower_hex();
        let txn = self.db.begin_write()?;

        {
            let allowlist = txn.open_table(Tables::ALLOWLIST)?;
            if let Some(guard) = allowlist.get(wallet_key.as_str())? {
                let entry: AllowlistEntry = decode(guard.value())?;
                if entry.is_active() {
                    return Err(VaultError::AlreadyAllowlisted(wallet.to_checksum()));
                }
            }
        }
        {
            let pending = txn.open_table(Tables::PENDING_BY_WALLET)?;
            if let Some(guard) = pending.get(wallet_key.as_str())? {
                return Err(VaultError::PendingRequestExists {
                    wallet: wallet.to_checksum(),
                    request_id: guard.value(),
                });
            }
        }

        let request = AccessRequest {
            id: next_id(&txn, REQUEST_COUNTER)?,
            wallet_address: wallet,
            coin_address: coin,
            status: RequestStatus::Pending,
            created_at: now,
            reviewed_at: None,
            reviewer: None,
            note: None,
        };
        txn.open_table(Tables::ACCESS_REQUESTS)?
            .insert(request.id, encode(&request)?.as_slice())?;
        txn.open_table(Tables::PENDING_BY_WALLET)?
            .insert(wallet_key.as_str(), request.id)?;
        txn.commit()?;
        Ok(request)
    }

    pub fn access_request(&self, id: u64) -> Result<Option<AccessRequest>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::ACCESS_REQUESTS)?;
        let result = match table.get(id)? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        Ok(result)
    }

    /// The most recent request filed by `wallet`, whatever its status.
    pub fn latest_access_request(&self, wallet: &Address) -> Result<Option<AccessRequest>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::ACCESS_REQUESTS)?;
        for item in table.iter()?.rev() {
            let (_, value) = item?;
            let request: AccessRequest = decode(value.value())?;
            if request.wallet_address == *wallet {
                return Ok(Some(request));
            }
        }
        Ok(None)
    }

    /// Requests ordered by id, optionally filtered by status.
    pub fn access_requests(&self, status: Option<RequestStatus>) -> Result<Vec<AccessRequest>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::ACCESS_REQUESTS)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let request: AccessRequest = decode(value.value())?;
            if status.is_none_or(|s| s == request.status) {
                out.push(request);
            }
        }
        Ok(out)
    }

    /// pending → approved. Allowlists the wallet and, when the request names
    /// a coin, links the wallet to it as owner.
    pub fn approve_access_request(
        &self,
        id: u64,
        reviewer: Address,
        now: u64,
    ) -> Result<AccessRequest> {
        let txn = self.db.begin_write()?;
        let request = review(&txn, id, RequestStatus::Approved, reviewer, None, now)?;
        put_allowlist(
            &txn,
            request.wallet_address,
            Some(reviewer),
            Some(format!("access request #{}", id)),
            now,
        )?;
        if let Some(coin) = request.coin_address {
            upsert_wallet(&txn, coin, request.wallet_address, OWNER_ROLE, "admin", now)?;
        }
        txn.commit()?;
        Ok(request)
    }

    /// pending → denied.
    pub fn deny_access_request(
        &self,
        id: u64,
        reviewer: Address,
        note: Option<String>,
        now: u64,
    ) -> Result<AccessRequest> {
        let txn = self.db.begin_write()?;
        let request = review(&txn, id, RequestStatus::Denied, reviewer, note, now)?;
        txn.commit()?;
        Ok(request)
    }

    // =========================================================================
    // CREATOR WALLETS
    // =========================================================================

    /// Link `wallet` to `coin`. Re-linking updates role and verification and
    /// returns `false` for "created".
    pub fn link_creator_wallet(
        &self,
        coin: Address,
        wallet: Address,
        role: &str,
        verified_via: &str,
        now: u64,
    ) -> Result<(CreatorWallet, bool)> {
        if role.trim().is_empty() {
            return Err(VaultError::validation("wallet role must not be empty"));
        }
        let txn = self.db.begin_write()?;
        let linked = upsert_wallet(&txn, coin, wallet, role.trim(), verified_via, now)?;
        txn.commit()?;
        Ok(linked)
    }

    /// Wallets linked to `coin`, ordered by wallet address.
    pub fn creator_wallets(&self, coin: &Address) -> Result<Vec<CreatorWallet>> {
        let (lo, hi) = wallet_range(&coin.to_lower_hex());
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::CREATOR_WALLETS)?;
        let mut out = Vec::new();
        for item in table.range(lo.as_str()..hi.as_str())? {
            let (_, value) = item?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }
}

// =============================================================================
// TRANSACTION HELPERS
// =============================================================================

fn put_allowlist(
    txn: &WriteTransaction,
    address: Address,
    approved_by: Option<Address>,
    note: Option<String>,
    now: u64,
) -> Result<AllowlistEntry> {
    let entry = AllowlistEntry {
        address,
        approved_by,
        approved_at: now,
        revoked_at: None,
        note,
    };
    txn.open_table(Tables::ALLOWLIST)?
        .insert(address.to_lower_hex().as_str(), encode(&entry)?.as_slice())?;
    Ok(entry)
}

fn review(
    txn: &WriteTransaction,
    id: u64,
    to: RequestStatus,
    reviewer: Address,
    note: Option<String>,
    now: u64,
) -> Result<AccessRequest> {
    let mut requests = txn.open_table(Tables::ACCESS_REQUESTS)?;
    let bytes = requests
        .get(id)?
        .map(|g| g.value().to_vec())
        .ok_or_else(|| VaultError::not_found("access request", id))?;
    let mut request: AccessRequest = decode(&bytes)?;
    if request.status != RequestStatus::Pending {
        return Err(VaultError::InvalidTransition {
            id,
            status: request.status.to_string(),
        });
    }

    request.status = to;
    request.reviewed_at = Some(now);
    request.reviewer = Some(reviewer);
    request.note = note;
    requests.insert(id, encode(&request)?.as_slice())?;
    drop(requests);

    txn.open_table(Tables::PENDING_BY_WALLET)?
        .remove(request.wallet_address.to_lower_hex().as_str())?;
    Ok(request)
}

fn upsert_wallet(
    txn: &WriteTransaction,
    coin: Address,
    wallet: Address,
    role: &str,
    verified_via: &str,
    now: u64,
) -> Result<(CreatorWallet, bool)> {
    let key = wallet_key(&coin.to_lower_hex(), &wallet.to_lower_hex());
    let existing = {
        let table = txn.open_table(Tables::CREATOR_WALLETS)?;
        let bytes = table.get(key.as_str())?.map(|g| g.value().to_vec());
        bytes
    };

    let (id, created) = match existing {
        Some(bytes) => {
            let current: CreatorWallet = decode(&bytes)?;
            (current.id, false)
        }
        None => (next_id(txn, WALLET_COUNTER)?, true),
    };
    let row = CreatorWallet {
        id,
        coin_address: coin,
        wallet_address: wallet,
        wallet_role: role.to_string(),
        verified_via: verified_via.to_string(),
        verified_at: now,
    };
    txn.open_table(Tables::CREATOR_WALLETS)?
        .insert(key.as_str(), encode(&row)?.as_slice())?;
    Ok((row, created))
}

// =============================================================================
// TESTS
// =============================================================================

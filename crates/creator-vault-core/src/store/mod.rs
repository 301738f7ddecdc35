//! # Store Module
//!
//! Embedded storage for the creator vault, backed by redb.
//!
//! Every uniqueness rule (one pending request per wallet, one row per
//! (coin, wallet), one ledger row per (signup, source, sourceId), single-use
//! nonces) is checked and written inside one redb write transaction.
//! redb serialises writers, so the transaction is the only coordination.
//!
//! Tables are created when the store is opened.

mod creators;
mod records;
mod tables;
mod waitlist;

pub use records::*;
pub use tables::Tables;
pub use creators::OWNER_ROLE;
pub use waitlist::{
    MAX_SOURCE_ID_LEN, NewSignup, REFERRER_BONUS_PERCENT, SignupOutcome, normalize_code,
    normalize_email,
};

use crate::error::{Result, VaultError};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open the database at `path`, creating it and its tables if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())?;
        Self::from_database(db)
    }

    /// Open an existing database; fails if the file is missing.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path.as_ref())?;
        Self::from_database(db)
    }

    /// A throwaway in-memory store.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::from_database(db)
    }

    fn from_database(db: Database) -> Result<Self> {
        let txn = db.begin_write()?;
        {
            txn.open_table(Tables::ALLOWLIST)?;
            txn.open_table(Tables::ACCESS_REQUESTS)?;
            txn.open_table(Tables::PENDING_BY_WALLET)?;
            txn.open_table(Tables::CREATOR_WALLETS)?;
            txn.open_table(Tables::SIGNUPS)?;
            txn.open_table(Tables::SIGNUP_BY_EMAIL)?;
            txn.open_table(Tables::SIGNUP_BY_WALLET)?;
            txn.open_table(Tables::REFERRAL_CODES)?;
            txn.open_table(Tables::REFERRAL_CONVERSIONS)?;
            txn.open_table(Tables::POINTS_LEDGER)?;
            txn.open_table(Tables::POINTS_BALANCE)?;
            txn.open_table(Tables::CONSUMED_NONCES)?;
            txn.open_table(Tables::COUNTERS)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Mark `nonce` as used. Returns `false` if it was already consumed.
    ///
    /// Entries whose expiry has passed are purged first; by then the nonce
    /// can no longer pass verification anyway.
    pub fn consume_nonce(&self, nonce: &str, expires_at: u64, now: u64) -> Result<bool> {
        if nonce.is_empty() {
            return Err(VaultError::validation("empty nonce"));
        }
        let txn = self.db.begin_write()?;
        let fresh = {
            let mut table = txn.open_table(Tables::CONSUMED_NONCES)?;
            let mut expired = Vec::new();
            for item in table.iter()? {
                let (key, exp) = item?;
                if exp.value() <= now {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                table.remove(key.as_str())?;
            }

            let seen = table.get(nonce)?.is_some();
            if !seen {
                table.insert(nonce, expires_at.max(now.saturating_add(1)))?;
            }
            !seen
        };
        txn.commit()?;
        Ok(fresh)
    }

    /// Row counts across the store.
    pub fn stats(&self) -> Result<StoreStats> {
        let txn = self.db.begin_read()?;
        let allowlist = txn.open_table(Tables::ALLOWLIST)?;
        let mut allowlisted = 0u64;
        for item in allowlist.iter()? {
            let (_, value) = item?;
            let entry: AllowlistEntry = decode(value.value())?;
            if entry.is_active() {
                allowlisted += 1;
            }
        }
        Ok(StoreStats {
            allowlisted,
            access_requests: txn.open_table(Tables::ACCESS_REQUESTS)?.len()?,
            pending_requests: txn.open_table(Tables::PENDING_BY_WALLET)?.len()?,
            creator_wallets: txn.open_table(Tables::CREATOR_WALLETS)?.len()?,
            signups: txn.open_table(Tables::SIGNUPS)?.len()?,
            referral_conversions: txn.open_table(Tables::REFERRAL_CONVERSIONS)?.len()?,
            ledger_entries: txn.open_table(Tables::POINTS_LEDGER)?.len()?,
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Allocate the next id from a named counter (first id is 1).
pub(crate) fn next_id(txn: &WriteTransaction, counter: &str) -> Result<u64> {
    let mut table = txn.open_table(Tables::COUNTERS)?;
    let current = table.get(counter)?.map(|g| g.value()).unwrap_or(0);
    let next = current.saturating_add(1);
    table.insert(counter, next)?;
    Ok(next)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    #[test]
    fn nonce_is_single_use() {
        let store = Store::in_memory().unwrap();
        assert!(store.consume_nonce("abcdefgh12", 2_000, 1_000).unwrap());
        assert!(!store.consume_nonce("abcdefgh12", 2_000, 1_001).unwrap());
        assert!(store.consume_nonce("other12345", 2_000, 1_001).unwrap());
    }

    #[test]
    fn expired_nonces_are_purged() {
        let store = Store::in_memory().unwrap();
        assert!(store.consume_nonce("abcdefgh12", 1_500, 1_000).unwrap());
        // after expiry the row is gone, which is harmless: verification
        // rejects the expired token before reaching the store
        assert!(store.consume_nonce("abcdefgh12", 3_000, 2_000).unwrap());
    }

    #[test]
    fn signed_message_cannot_be_replayed_after_nonce_ttl() {
        use crate::siwe::signing::{key_address, personal_sign, test_key};
        use crate::siwe::{
            MAX_MESSAGE_AGE_SECS, SiweMessage, VerifyOptions, format_timestamp,
        };
        use crate::token::NONCE_TTL_SECS;

        let t0: u64 = 1_760_000_000;
        let key = test_key(4);
        let msg = SiweMessage::new(
            "app.example.com",
            key_address(&key),
            "https://app.example.com",
            1,
            "replayNonce123",
            format_timestamp(t0 as i64),
        );
        let text = msg.to_message();
        let sig = personal_sign(&key, &text);
        let store = Store::in_memory().unwrap();

        let sign_in = |now: u64| -> bool {
            let opts = VerifyOptions::new(
                vec!["app.example.com".into()],
                vec![msg.nonce.clone()],
                now,
            );
            if msg.verify(&text, &sig, &opts).is_err() {
                return false;
            }
            let keep_until = (now + NONCE_TTL_SECS)
                .max(msg.usable_until(MAX_MESSAGE_AGE_SECS).unwrap());
            store.consume_nonce(&msg.nonce, keep_until, now).unwrap()
        };

        assert!(sign_in(t0 + 10));
        assert!(!sign_in(t0 + 20));
        // past the cookie TTL but still inside the message age window
        assert!(!sign_in(t0 + NONCE_TTL_SECS + 100));
        assert!(!sign_in(t0 + MAX_MESSAGE_AGE_SECS));
    }

    #[test]
    fn empty_nonce_is_rejected() {
        let store = Store::in_memory().unwrap();
        assert!(store.consume_nonce("", 10, 1).is_err());
    }

    #[test]
    fn stats_on_empty_store() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.redb");
        let addr = Address([9u8; 20]);
        {
            let store = Store::open(&path).unwrap();
            store.allowlist_add(addr, None, None, 10).unwrap();
        }
        let store = Store::open_existing(&path).unwrap();
        assert!(store.is_allowlisted(&addr).unwrap());
        assert_eq!(store.stats().unwrap().allowlisted, 1);
    }

    #[test]
    fn open_existing_fails_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Store::open_existing(dir.path().join("missing.redb")).is_err());
    }
}

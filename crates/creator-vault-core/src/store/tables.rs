//! Table definitions for the redb store.
//!
//! Address-keyed tables use the lowercase `0x` hex form as key.
//! Values are postcard-encoded records unless noted.

use redb::TableDefinition;

/// Table definitions.
pub struct Tables;

impl Tables {
    // =========================================================================
    // Creator access
    // =========================================================================

    /// address → AllowlistEntry
    pub const ALLOWLIST: TableDefinition<'static, &'static str, &'static [u8]> =
        TableDefinition::new("creator_allowlist");

    /// request id → AccessRequest
    pub const ACCESS_REQUESTS: TableDefinition<'static, u64, &'static [u8]> =
        TableDefinition::new("creator_access_requests");

    /// wallet → id of its pending request. At most one pending per wallet.
    pub const PENDING_BY_WALLET: TableDefinition<'static, &'static str, u64> =
        TableDefinition::new("creator_access_pending");

    /// "{coin}|{wallet}" → CreatorWallet
    pub const CREATOR_WALLETS: TableDefinition<'static, &'static str, &'static [u8]> =
        TableDefinition::new("creator_wallets");

    // =========================================================================
    // Waitlist
    // =========================================================================

    /// signup id → Signup
    pub const SIGNUPS: TableDefinition<'static, u64, &'static [u8]> =
        TableDefinition::new("waitlist_signups");

    /// normalised email → signup id
    pub const SIGNUP_BY_EMAIL: TableDefinition<'static, &'static str, u64> =
        TableDefinition::new("waitlist_signup_email");

    /// wallet → signup id
    pub const SIGNUP_BY_WALLET: TableDefinition<'static, &'static str, u64> =
        TableDefinition::new("waitlist_signup_wallet");

    /// referral code → signup id
    pub const REFERRAL_CODES: TableDefinition<'static, &'static str, u64> =
        TableDefinition::new("waitlist_referral_codes");

    /// referred signup id → ReferralConversion
    pub const REFERRAL_CONVERSIONS: TableDefinition<'static, u64, &'static [u8]> =
        TableDefinition::new("referral_conversions");

    /// "{signup:020}|{source}|{source_id}" → PointsEntry
    pub const POINTS_LEDGER: TableDefinition<'static, &'static str, &'static [u8]> =
        TableDefinition::new("points_ledger");

    /// signup id → running balance (u64)
    pub const POINTS_BALANCE: TableDefinition<'static, u64, u64> =
        TableDefinition::new("points_balance");

    // =========================================================================
    // Auth / bookkeeping
    // =========================================================================

    /// nonce → expiry (unix seconds) of the consumed nonce
    pub const CONSUMED_NONCES: TableDefinition<'static, &'static str, u64> =
        TableDefinition::new("consumed_nonces");

    /// counter name → last issued id
    pub const COUNTERS: TableDefinition<'static, &'static str, u64> =
        TableDefinition::new("counters");
}

/// Ledger key. The zero-padded signup id keeps one signup's rows contiguous.
pub fn ledger_key(signup_id: u64, source: &str, source_id: &str) -> String {
    format!("{:020}|{}|{}", signup_id, source, source_id)
}

/// Inclusive start and exclusive end of one signup's ledger rows.
pub fn ledger_range(signup_id: u64) -> (String, String) {
    (format!("{:020}|", signup_id), format!("{:020}}}", signup_id))
}

/// Creator wallet key.
pub fn wallet_key(coin: &str, wallet: &str) -> String {
    format!("{}|{}", coin, wallet)
}

/// Inclusive start and exclusive end of one coin's wallet rows.
pub fn wallet_range(coin: &str) -> (String, String) {
    (format!("{}|", coin), format!("{}}}", coin))
}

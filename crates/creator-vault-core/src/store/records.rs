//! Persisted record types.
//!
//! Records are stored with postcard and served as camelCase JSON, so no
//! field may be conditionally skipped during serialization.

use crate::address::Address;
use crate::error::VaultError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// CREATOR ACCESS
// =============================================================================

/// A row of the creator allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistEntry {
    pub address: Address,
    pub approved_by: Option<Address>,
    pub approved_at: u64,
    pub revoked_at: Option<u64>,
    pub note: Option<String>,
}

impl AllowlistEntry {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// Lifecycle of a creator access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            other => Err(VaultError::validation(format!("unknown status '{}'", other))),
        }
    }
}

/// A creator's request to be allowlisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub id: u64,
    pub wallet_address: Address,
    pub coin_address: Option<Address>,
    pub status: RequestStatus,
    pub created_at: u64,
    pub reviewed_at: Option<u64>,
    pub reviewer: Option<Address>,
    pub note: Option<String>,
}

/// A wallet linked to a creator coin. Unique per (coin, wallet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorWallet {
    pub id: u64,
    pub coin_address: Address,
    pub wallet_address: Address,
    pub wallet_role: String,
    pub verified_via: String,
    pub verified_at: u64,
}

// =============================================================================
// WAITLIST
// =============================================================================

/// A waitlist signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signup {
    pub id: u64,
    pub email: Option<String>,
    pub wallet_address: Option<Address>,
    pub referral_code: String,
    pub referred_by: Option<u64>,
    pub created_at: u64,
}

/// A referred signup. Each signup converts at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralConversion {
    pub referred_signup_id: u64,
    pub referrer_signup_id: u64,
    pub created_at: u64,
}

/// Why points were awarded. Each source pays a fixed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    Signup,
    Referral,
    Follow,
    WalletLinked,
    Share,
    ReferralBonus,
}

impl PointSource {
    /// Sources an external caller may award.
    pub const AWARDABLE: [Self; 5] = [
        Self::Signup,
        Self::Referral,
        Self::Follow,
        Self::WalletLinked,
        Self::Share,
    ];

    /// Fixed amount for this source. Referral bonuses are derived, not fixed.
    pub fn points(&self) -> u64 {
        match self {
            Self::Signup => 100,
            Self::Referral => 50,
            Self::Follow => 25,
            Self::WalletLinked => 50,
            Self::Share => 10,
            Self::ReferralBonus => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Referral => "referral",
            Self::Follow => "follow",
            Self::WalletLinked => "wallet_linked",
            Self::Share => "share",
            Self::ReferralBonus => "referral_bonus",
        }
    }
}

impl fmt::Display for PointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointSource {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "signup" => Ok(Self::Signup),
            "referral" => Ok(Self::Referral),
            "follow" => Ok(Self::Follow),
            "wallet_linked" => Ok(Self::WalletLinked),
            "share" => Ok(Self::Share),
            "referral_bonus" => Ok(Self::ReferralBonus),
            other => Err(VaultError::validation(format!("unknown point source '{}'", other))),
        }
    }
}

/// One ledger row, unique by (signup_id, source, source_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsEntry {
    pub signup_id: u64,
    pub source: PointSource,
    pub source_id: String,
    pub points: u64,
    pub awarded_at: u64,
}

/// Result of an award attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AwardOutcome {
    Awarded {
        points: u64,
        #[serde(rename = "referrerBonus")]
        referrer_bonus: Option<ReferrerBonus>,
    },
    Duplicate,
}

impl AwardOutcome {
    pub fn is_awarded(&self) -> bool {
        matches!(self, Self::Awarded { .. })
    }
}

/// Bonus propagated to the referrer of an awarded signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerBonus {
    pub referrer_signup_id: u64,
    pub points: u64,
}

/// Leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub signup_id: u64,
    pub referral_code: String,
    pub points: u64,
}

/// Row counts for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub allowlisted: u64,
    pub access_requests: u64,
    pub pending_requests: u64,
    pub creator_wallets: u64,
    pub signups: u64,
    pub referral_conversions: u64,
    pub ledger_entries: u64,
}

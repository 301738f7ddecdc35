//! Waitlist signups, referral conversions and the points ledger.

use super::records::{
    AwardOutcome, LeaderboardEntry, PointSource, PointsEntry, ReferralConversion, ReferrerBonus,
    Signup,
};
use super::tables::{Tables, ledger_key, ledger_range};
use super::{Store, decode, encode, next_id};
use crate::address::Address;
use crate::error::{Result, VaultError};
use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;

const SIGNUP_COUNTER: &str = "signup";

/// Percentage of every award that is propagated to the referrer.
pub const REFERRER_BONUS_PERCENT: u64 = 10;

/// Longest accepted `sourceId`.
pub const MAX_SOURCE_ID_LEN: usize = 128;

/// Input for [`Store::create_signup`].
#[derive(Debug, Clone, Default)]
pub struct NewSignup {
    pub email: Option<String>,
    pub wallet: Option<Address>,
    /// Code assigned to the new signup; must be unique.
    pub referral_code: String,
    /// Code of the signup that referred this one, if any.
    pub referred_by_code: Option<String>,
}

/// Result of [`Store::create_signup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupOutcome {
    pub signup: Signup,
    /// `false` when an existing signup matched the email or wallet.
    pub created: bool,
    pub points: u64,
}

/// Trim and lowercase an email, rejecting obviously invalid ones.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    let valid = email.len() <= 254
        && !email.contains(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(email)
    } else {
        Err(VaultError::validation(format!("invalid email '{}'", email)))
    }
}

/// Uppercase a referral code, rejecting non-alphanumeric input.
pub fn normalize_code(code: &str) -> Result<String> {
    let code = code.trim().to_ascii_uppercase();
    if (4..=32).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(code)
    } else {
        Err(VaultError::validation(format!("invalid referral code '{}'", code)))
    }
}

impl Store {
    // =========================================================================
    // SIGNUPS
    // =========================================================================

    /// Create a signup, or return the existing one for the same email/wallet.
    ///
    /// A known `referred_by_code` records a conversion and pays the
    /// referrer; an unknown one is ignored.
    pub fn create_signup(&self, new: NewSignup, now: u64) -> Result<SignupOutcome> {
        let email = new.email.as_deref().map(normalize_email).transpose()?;
        if email.is_none() && new.wallet.is_none() {
            return Err(VaultError::validation("email or wallet address is required"));
        }
        let code = normalize_code(&new.referral_code)?;
        let wallet_key = new.wallet.map(|w| w.to_lower_hex());

        let txn = self.db.begin_write()?;

        let existing = {
            let by_email = txn.open_table(Tables::SIGNUP_BY_EMAIL)?;
            let by_wallet = txn.open_table(Tables::SIGNUP_BY_WALLET)?;
            let mut found = None;
            if let Some(email) = &email {
                found = by_email.get(email.as_str())?.map(|g| g.value());
            }
            if found.is_none() {
                if let Some(key) = &wallet_key {
                    found = by_wallet.get(key.as_str())?.map(|g| g.value());
                }
            }
            found
        };
        if let Some(id) = existing {
            let signup = load_signup(&txn, id)?;
            let points = balance_in(&txn, id)?;
            txn.abort()?;
            return Ok(SignupOutcome {
                signup,
                created: false,
                points,
            });
        }

        let referrer = {
            let codes = txn.open_table(Tables::REFERRAL_CODES)?;
            if codes.get(code.as_str())?.is_some() {
                return Err(VaultError::Conflict(format!("referral code {}", code)));
            }
            match new.referred_by_code.as_deref().map(normalize_code) {
                Some(Ok(by)) => codes.get(by.as_str())?.map(|g| g.value()),
                _ => None,
            }
        };

        let id = next_id(&txn, SIGNUP_COUNTER)?;
        let signup = Signup {
            id,
            email: email.clone(),
            wallet_address: new.wallet,
            referral_code: code.clone(),
            referred_by: referrer,
            created_at: now,
        };
        txn.open_table(Tables::SIGNUPS)?
            .insert(id, encode(&signup)?.as_slice())?;
        txn.open_table(Tables::REFERRAL_CODES)?
            .insert(code.as_str(), id)?;
        if let Some(email) = &email {
            txn.open_table(Tables::SIGNUP_BY_EMAIL)?
                .insert(email.as_str(), id)?;
        }
        if let Some(key) = &wallet_key {
            txn.open_table(Tables::SIGNUP_BY_WALLET)?
                .insert(key.as_str(), id)?;
        }

        let id_str = id.to_string();
        if let Some(referrer_id) = referrer {
            let conversion = ReferralConversion {
                referred_signup_id: id,
                referrer_signup_id: referrer_id,
                created_at: now,
            };
            txn.open_table(Tables::REFERRAL_CONVERSIONS)?
                .insert(id, encode(&conversion)?.as_slice())?;
        }
        award_in(&txn, id, PointSource::Signup, &id_str, now)?;
        if let Some(referrer_id) = referrer {
            award_in(&txn, referrer_id, PointSource::Referral, &id_str, now)?;
        }
        let points = balance_in(&txn, id)?;

        txn.commit()?;
        Ok(SignupOutcome {
            signup,
            created: true,
            points,
        })
    }

    pub fn signup(&self, id: u64) -> Result<Option<Signup>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::SIGNUPS)?;
        let result = match table.get(id)? {
            Some(guard) => Some(decode(guard.value())?),
            None => None,
        };
        Ok(result)
    }

    pub fn signup_by_email(&self, email: &str) -> Result<Option<Signup>> {
        let email = normalize_email(email)?;
        let id = {
            let txn = self.db.begin_read()?;
            let table = txn.open_table(Tables::SIGNUP_BY_EMAIL)?;
            let id = table.get(email.as_str())?.map(|g| g.value());
            id
        };
        id.map_or(Ok(None), |id| self.signup(id))
    }

    pub fn signup_by_wallet(&self, wallet: &Address) -> Result<Option<Signup>> {
        let id = {
            let txn = self.db.begin_read()?;
            let table = txn.open_table(Tables::SIGNUP_BY_WALLET)?;
            let id = table.get(wallet.to_lower_hex().as_str())?.map(|g| g.value());
            id
        };
        id.map_or(Ok(None), |id| self.signup(id))
    }

    pub fn signup_by_code(&self, code: &str) -> Result<Option<Signup>> {
        let code = normalize_code(code)?;
        let id = {
            let txn = self.db.begin_read()?;
            let table = txn.open_table(Tables::REFERRAL_CODES)?;
            let id = table.get(code.as_str())?.map(|g| g.value());
            id
        };
        id.map_or(Ok(None), |id| self.signup(id))
    }

    /// Number of signups referred by `id`.
    pub fn referral_count(&self, id: u64) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::REFERRAL_CONVERSIONS)?;
        let mut count = 0u64;
        for item in table.iter()? {
            let (_, value) = item?;
            let conversion: ReferralConversion = decode(value.value())?;
            if conversion.referrer_signup_id == id {
                count += 1;
            }
        }
        Ok(count)
    }

    // =========================================================================
    // POINTS
    // =========================================================================

    /// Award the fixed amount for `source` to a signup, once per
    /// `(signup_id, source, source_id)`. Repeats return
    /// [`AwardOutcome::Duplicate`] and change nothing.
    pub fn award_points(
        &self,
        signup_id: u64,
        source: PointSource,
        source_id: &str,
        now: u64,
    ) -> Result<AwardOutcome> {
        if source == PointSource::ReferralBonus {
            return Err(VaultError::validation("referral bonuses are not awarded directly"));
        }
        let source_id = source_id.trim();
        if source_id.is_empty() || source_id.len() > MAX_SOURCE_ID_LEN {
            return Err(VaultError::validation(format!(
                "sourceId must be 1..={} characters",
                MAX_SOURCE_ID_LEN
            )));
        }

        let txn = self.db.begin_write()?;
        let outcome = award_in(&txn, signup_id, source, source_id, now)?;
        if outcome.is_awarded() {
            txn.commit()?;
        } else {
            txn.abort()?;
        }
        Ok(outcome)
    }

    pub fn points_balance(&self, signup_id: u64) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::POINTS_BALANCE)?;
        let balance = table.get(signup_id)?.map(|g| g.value()).unwrap_or(0);
        Ok(balance)
    }

    /// Ledger rows of one signup, ordered by source then sourceId.
    pub fn ledger(&self, signup_id: u64) -> Result<Vec<PointsEntry>> {
        let (lo, hi) = ledger_range(signup_id);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(Tables::POINTS_LEDGER)?;
        let mut out = Vec::new();
        for item in table.range(lo.as_str()..hi.as_str())? {
            let (_, value) = item?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    /// Top signups by balance; ties go to the earlier signup.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let txn = self.db.begin_read()?;
        let balances = txn.open_table(Tables::POINTS_BALANCE)?;
        let signups = txn.open_table(Tables::SIGNUPS)?;

        let mut rows: Vec<(u64, u64)> = Vec::new();
        for item in balances.iter()? {
            let (id, points) = item?;
            rows.push((id.value(), points.value()));
        }
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        rows.truncate(limit);

        let mut out = Vec::with_capacity(rows.len());
        for (signup_id, points) in rows {
            if let Some(guard) = signups.get(signup_id)? {
                let signup: Signup = decode(guard.value())?;
                out.push(LeaderboardEntry {
                    signup_id,
                    referral_code: signup.referral_code,
                    points,
                });
            }
        }
        Ok(out)
    }
}

// =============================================================================
// TRANSACTION HELPERS
// =============================================================================

fn load_signup(txn: &WriteTransaction, id: u64) -> Result<Signup> {
    let table = txn.open_table(Tables::SIGNUPS)?;
    let bytes = table
        .get(id)?
        .map(|g| g.value().to_vec())
        .ok_or_else(|| VaultError::not_found("signup", id))?;
    decode(&bytes)
}

fn balance_in(txn: &WriteTransaction, id: u64) -> Result<u64> {
    let table = txn.open_table(Tables::POINTS_BALANCE)?;
    let balance = table.get(id)?.map(|g| g.value()).unwrap_or(0);
    Ok(balance)
}

fn add_balance(txn: &WriteTransaction, id: u64, points: u64) -> Result<()> {
    let mut table = txn.open_table(Tables::POINTS_BALANCE)?;
    let current = table.get(id)?.map(|g| g.value()).unwrap_or(0);
    table.insert(id, current.saturating_add(points))?;
    Ok(())
}

/// Insert a ledger row if its key is new. Returns whether it was inserted.
fn insert_entry(txn: &WriteTransaction, entry: &PointsEntry) -> Result<bool> {
    let key = ledger_key(entry.signup_id, entry.source.as_str(), &entry.source_id);
    let mut ledger = txn.open_table(Tables::POINTS_LEDGER)?;
    if ledger.get(key.as_str())?.is_some() {
        return Ok(false);
    }
    ledger.insert(key.as_str(), encode(entry)?.as_slice())?;
    drop(ledger);
    add_balance(txn, entry.signup_id, entry.points)?;
    Ok(true)
}

fn award_in(
    txn: &WriteTransaction,
    signup_id: u64,
    source: PointSource,
    source_id: &str,
    now: u64,
) -> Result<AwardOutcome> {
    let signup = load_signup(txn, signup_id)?;
    let points = source.points();
    let entry = PointsEntry {
        signup_id,
        source,
        source_id: source_id.to_string(),
        points,
        awarded_at: now,
    };
    if !insert_entry(txn, &entry)? {
        return Ok(AwardOutcome::Duplicate);
    }

    let mut referrer_bonus = None;
    if let Some(referrer_id) = signup.referred_by {
        let bonus = points * REFERRER_BONUS_PERCENT / 100;
        if bonus > 0 {
            let bonus_entry = PointsEntry {
                signup_id: referrer_id,
                source: PointSource::ReferralBonus,
                source_id: format!("{}:{}:{}", signup_id, source, source_id),
                points: bonus,
                awarded_at: now,
            };
            if insert_entry(txn, &bonus_entry)? {
                referrer_bonus = Some(ReferrerBonus {
                    referrer_signup_id: referrer_id,
                    points: bonus,
                });
            }
        }
    }

    Ok(AwardOutcome::Awarded {
        points,
        referrer_bonus,
    })
}

// =============================================================================
// TESTS
// =============================================================================

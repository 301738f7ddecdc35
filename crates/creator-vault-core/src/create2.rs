//! # CREATE2 Module
//!
//! Deterministic contract addresses and a sequential vanity-salt search.
//!
//! `address = keccak256(0xff ++ factory ++ salt ++ keccak256(init_code))[12..]`
//!
//! Salts are derived from a `u64` counter stored big-endian in the last
//! eight bytes, so a counter range fully describes a slice of the search
//! space and can be split across workers by the caller.

use crate::address::{Address, keccak256, strip_0x};
use crate::error::{Result, VaultError};
use std::ops::Range;

/// The deterministic deployment proxy present on most EVM chains.
pub const DEFAULT_FACTORY: Address = Address([
    0x4e, 0x59, 0xb4, 0x48, 0x47, 0xb3, 0x79, 0x57, 0x85, 0x88, 0x92, 0x0c, 0xa7, 0x8f, 0xbf, 0x26,
    0xc0, 0xb4, 0x95, 0x6c,
]);

/// How often the stop callback is polled during a search.
const STOP_POLL_INTERVAL: u64 = 4096;

/// Hash of contract creation code.
pub fn init_code_hash(init_code: &[u8]) -> [u8; 32] {
    keccak256(init_code)
}

/// Parse a 32-byte hex value with optional `0x`.
pub fn parse_hash32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(strip_0x(s.trim()))
        .map_err(|e| VaultError::validation(format!("invalid hex '{}': {}", s, e)))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| VaultError::validation(format!("expected 32 bytes, got {}", bytes.len())))
}

/// Address a CREATE2 deployment from `factory` will land on.
pub fn create2_address(factory: &Address, salt: &[u8; 32], init_code_hash: &[u8; 32]) -> Address {
    let mut preimage = [0u8; 85];
    preimage[0] = 0xff;
    preimage[1..21].copy_from_slice(factory.as_bytes());
    preimage[21..53].copy_from_slice(salt);
    preimage[53..].copy_from_slice(init_code_hash);
    let hash = keccak256(preimage);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address(out)
}

/// 32-byte salt with `counter` big-endian in the last eight bytes.
pub fn salt_from_counter(counter: u64) -> [u8; 32] {
    let mut salt = [0u8; 32];
    salt[24..].copy_from_slice(&counter.to_be_bytes());
    salt
}

// =============================================================================
// PATTERN
// =============================================================================

/// Hex prefix and suffix an address must carry. Case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VanityPattern {
    prefix: String,
    suffix: String,
}

impl VanityPattern {
    pub fn new(prefix: &str, suffix: &str) -> Result<Self> {
        let prefix = strip_0x(prefix.trim()).to_ascii_lowercase();
        let suffix = suffix.trim().to_ascii_lowercase();
        for part in [&prefix, &suffix] {
            if !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(VaultError::validation(format!("'{}' is not hex", part)));
            }
        }
        if prefix.is_empty() && suffix.is_empty() {
            return Err(VaultError::validation("pattern needs a prefix or a suffix"));
        }
        if prefix.len() + suffix.len() > 40 {
            return Err(VaultError::validation("pattern longer than an address"));
        }
        Ok(Self { prefix, suffix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn matches(&self, address: &Address) -> bool {
        let hex = hex::encode(address.as_bytes());
        hex.starts_with(&self.prefix) && hex.ends_with(&self.suffix)
    }

    /// Bits of work: four per pinned nibble.
    pub fn difficulty_bits(&self) -> u32 {
        ((self.prefix.len() + self.suffix.len()) * 4) as u32
    }

    /// Expected number of attempts before a hit.
    pub fn expected_attempts(&self) -> u128 {
        1u128.checked_shl(self.difficulty_bits()).unwrap_or(u128::MAX)
    }
}

// =============================================================================
// SEARCH
// =============================================================================

/// A salt that produced a matching address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VanityMatch {
    pub counter: u64,
    pub salt: [u8; 32],
    pub address: Address,
}

/// Outcome of scanning a counter range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOutcome {
    pub found: Option<VanityMatch>,
    pub attempts: u64,
}

/// Factory plus init code hash: everything fixed during a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Create2Target {
    pub factory: Address,
    pub init_code_hash: [u8; 32],
}

impl Create2Target {
    pub fn new(factory: Address, init_code_hash: [u8; 32]) -> Self {
        Self {
            factory,
            init_code_hash,
        }
    }

    pub fn address_for(&self, counter: u64) -> Address {
        create2_address(
            &self.factory,
            &salt_from_counter(counter),
            &self.init_code_hash,
        )
    }

    /// Scan `range` in order and return the first match.
    pub fn search(&self, pattern: &VanityPattern, range: Range<u64>) -> SearchOutcome {
        self.search_until(pattern, range, || false)
    }

    /// Like [`search`](Self::search), but gives up once `stop` returns true.
    /// `stop` is polled every few thousand attempts.
    pub fn search_until(
        &self,
        pattern: &VanityPattern,
        range: Range<u64>,
        stop: impl Fn() -> bool,
    ) -> SearchOutcome {
        let mut attempts = 0u64;
        for counter in range {
            if attempts % STOP_POLL_INTERVAL == 0 && attempts > 0 && stop() {
                break;
            }
            attempts += 1;
            let salt = salt_from_counter(counter);
            let address = create2_address(&self.factory, &salt, &self.init_code_hash);
            if pattern.matches(&address) {
                return SearchOutcome {
                    found: Some(VanityMatch {
                        counter,
                        salt,
                        address,
                    }),
                    attempts,
                };
            }
        }
        SearchOutcome {
            found: None,
            attempts,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

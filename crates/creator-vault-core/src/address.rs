//! # Address Module
//!
//! 20-byte Ethereum addresses with EIP-55 checksum rendering.
//!
//! Human-readable serializers (JSON) see the checksummed `0x` string;
//! binary serializers (postcard) see the raw 20 bytes.

use crate::error::{Result, VaultError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Keccak-256 digest.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Keccak256::digest(data.as_ref()).into()
}

/// Strip an optional `0x`/`0X` prefix.
pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// An Ethereum account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Build from a byte slice that must be exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| VaultError::validation(format!("address must be 20 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Derive the address of an uncompressed secp256k1 public key
    /// (64 bytes, without the 0x04 tag).
    pub fn from_public_key(uncompressed: &[u8]) -> Result<Self> {
        if uncompressed.len() != 64 {
            return Err(VaultError::validation("public key must be 64 bytes"));
        }
        let hash = keccak256(uncompressed);
        Self::from_slice(&hash[12..])
    }

    /// Parse a `0x`-prefixed (or bare) hex address.
    ///
    /// Mixed-case input must carry a valid EIP-55 checksum; all-lowercase
    /// and all-uppercase input is accepted as-is.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex_part = strip_0x(trimmed);
        if hex_part.len() != 40 {
            return Err(VaultError::validation(format!(
                "address must be 40 hex chars, got {}",
                hex_part.len()
            )));
        }
        let bytes = hex::decode(hex_part)
            .map_err(|e| VaultError::validation(format!("address is not hex: {}", e)))?;
        let addr = Self::from_slice(&bytes)?;

        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && addr.to_checksum()[2..] != *hex_part {
            return Err(VaultError::validation(format!(
                "address {} has an invalid EIP-55 checksum",
                trimmed
            )));
        }
        Ok(addr)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x` hex, used as the storage key for address-indexed tables.
    pub fn to_lower_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// EIP-55 mixed-case checksum encoding.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_checksum())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::parse(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; 20]>::deserialize(deserializer).map(Self)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Reference vectors from EIP-55.
    const CHECKSUMMED: [&str; 4] = [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ];

    #[test]
    fn checksum_matches_eip55_vectors() {
        for s in CHECKSUMMED {
            let addr = Address::parse(s).unwrap();
            assert_eq!(addr.to_checksum(), s);
        }
    }

    #[test]
    fn lowercase_input_is_accepted() {
        let addr = Address::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(addr.to_checksum(), CHECKSUMMED[0]);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        // flip the case of one letter
        let result = Address::parse("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert!(result.is_err());
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn json_uses_checksum_string() {
        let addr = Address::parse(CHECKSUMMED[1]).unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", CHECKSUMMED[1]));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn postcard_uses_raw_bytes() {
        let addr = Address::parse(CHECKSUMMED[2]).unwrap();
        let bytes = postcard::to_allocvec(&addr).unwrap();
        assert_eq!(bytes.len(), 20);
        let back: Address = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, addr);
    }

    proptest! {
        #[test]
        fn checksum_always_reparses(bytes in proptest::array::uniform20(any::<u8>())) {
            let addr = Address(bytes);
            prop_assert_eq!(Address::parse(&addr.to_checksum()).unwrap(), addr);
            prop_assert_eq!(Address::parse(&addr.to_lower_hex()).unwrap(), addr);
        }
    }
}

//! # SIWE Module
//!
//! Sign-In-With-Ethereum (EIP-4361) message parsing and verification.
//!
//! Verification is a single linear pipeline, run in this order:
//!
//! 1. domain matches one of the accepted domains
//! 2. nonce matches one of the issued nonces
//! 3. `Issued At` is not older than the maximum age (and not in the future),
//!    `Expiration Time` has not passed, `Not Before` has passed
//! 4. the EIP-191 `personal_sign` signature recovers to the message address
//!
//! The first failing step decides the error.

use crate::address::{Address, keccak256, strip_0x};
use chrono::{DateTime, SecondsFormat};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use thiserror::Error;

/// Messages issued longer ago than this are rejected.
pub const MAX_MESSAGE_AGE_SECS: u64 = 15 * 60;

/// Tolerated clock drift for `Issued At` values in the future.
pub const CLOCK_SKEW_SECS: u64 = 5 * 60;

/// Minimum nonce length per EIP-4361.
pub const MIN_NONCE_LEN: usize = 8;

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";

// =============================================================================
// ERRORS
// =============================================================================

/// Reasons a SIWE message is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiweError {
    #[error("malformed SIWE message: {0}")]
    Parse(String),

    #[error("domain mismatch: message is for {got}")]
    DomainMismatch { got: String },

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("message expired")]
    Expired,

    #[error("message is not valid yet")]
    NotYetValid,

    #[error("invalid signature: {0}")]
    BadSignature(String),

    #[error("signature does not match address {0}")]
    AddressMismatch(Address),
}

impl SiweError {
    /// True when the failure is about the signature itself rather than the
    /// message content. The HTTP layer maps these to 401.
    pub fn is_signature_failure(&self) -> bool {
        matches!(self, Self::BadSignature(_) | Self::AddressMismatch(_))
    }
}

fn parse_err(msg: impl Into<String>) -> SiweError {
    SiweError::Parse(msg.into())
}

// =============================================================================
// MESSAGE
// =============================================================================

/// A parsed EIP-4361 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub scheme: Option<String>,
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: String,
    pub expiration_time: Option<String>,
    pub not_before: Option<String>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

/// Options for [`SiweMessage::verify`].
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Domains the message may be addressed to (case-insensitive).
    pub domains: Vec<String>,
    /// Nonces that were issued to this client. Any one may match.
    pub nonces: Vec<String>,
    /// Current unix time in seconds.
    pub now: u64,
    /// Maximum accepted age of `Issued At`.
    pub max_age_secs: u64,
}

impl VerifyOptions {
    /// Options with the default 15 minute message age.
    pub fn new(domains: Vec<String>, nonces: Vec<String>, now: u64) -> Self {
        Self {
            domains,
            nonces,
            now,
            max_age_secs: MAX_MESSAGE_AGE_SECS,
        }
    }
}

impl SiweMessage {
    /// Build a minimal message (no statement, resources or optional times).
    pub fn new(
        domain: impl Into<String>,
        address: Address,
        uri: impl Into<String>,
        chain_id: u64,
        nonce: impl Into<String>,
        issued_at: impl Into<String>,
    ) -> Self {
        Self {
            scheme: None,
            domain: domain.into(),
            address,
            statement: None,
            uri: uri.into(),
            version: "1".to_string(),
            chain_id,
            nonce: nonce.into(),
            issued_at: issued_at.into(),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
    }

    /// Parse the plain-text message a wallet signed.
    pub fn parse(text: &str) -> Result<Self, SiweError> {
        let text = text.replace("\r\n", "\n");
        let mut lines = text.lines();

        let header = lines.next().ok_or_else(|| parse_err("empty message"))?;
        let authority = header
            .strip_suffix(HEADER_SUFFIX)
            .ok_or_else(|| parse_err("missing preamble"))?;
        let (scheme, domain) = match authority.split_once("://") {
            Some((scheme, domain)) => (Some(scheme.to_string()), domain.to_string()),
            None => (None, authority.to_string()),
        };
        if domain.is_empty() || domain.contains(char::is_whitespace) {
            return Err(parse_err("invalid domain"));
        }

        let address_line = lines.next().ok_or_else(|| parse_err("missing address"))?;
        let address = Address::parse(address_line).map_err(|e| parse_err(e.to_string()))?;

        let mut statement = None;
        let mut uri = None;
        let mut version = None;
        let mut chain_id = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expiration_time = None;
        let mut not_before = None;
        let mut request_id = None;
        let mut resources = Vec::new();
        let mut in_resources = false;

        for line in lines {
            if line.is_empty() {
                if uri.is_some() {
                    return Err(parse_err("unexpected blank line"));
                }
                continue;
            }
            if in_resources {
                let resource = line
                    .strip_prefix("- ")
                    .ok_or_else(|| parse_err("resources must be listed as '- <uri>'"))?;
                resources.push(resource.to_string());
                continue;
            }
            if let Some(v) = line.strip_prefix("URI: ") {
                uri = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("Version: ") {
                version = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("Chain ID: ") {
                let id = v
                    .parse::<u64>()
                    .map_err(|_| parse_err(format!("invalid chain id '{}'", v)))?;
                chain_id = Some(id);
            } else if let Some(v) = line.strip_prefix("Nonce: ") {
                nonce = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("Issued At: ") {
                issued_at = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("Expiration Time: ") {
                expiration_time = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("Not Before: ") {
                not_before = Some(v.to_string());
            } else if let Some(v) = line.strip_prefix("Request ID: ") {
                request_id = Some(v.to_string());
            } else if line == "Resources:" {
                in_resources = true;
            } else if uri.is_none() && statement.is_none() {
                statement = Some(line.to_string());
            } else {
                return Err(parse_err(format!("unexpected line '{}'", line)));
            }
        }

        let message = Self {
            scheme,
            domain,
            address,
            statement,
            uri: uri.ok_or_else(|| parse_err("missing URI"))?,
            version: version.ok_or_else(|| parse_err("missing Version"))?,
            chain_id: chain_id.ok_or_else(|| parse_err("missing Chain ID"))?,
            nonce: nonce.ok_or_else(|| parse_err("missing Nonce"))?,
            issued_at: issued_at.ok_or_else(|| parse_err("missing Issued At"))?,
            expiration_time,
            not_before,
            request_id,
            resources,
        };

        if message.version != "1" {
            return Err(parse_err(format!("unsupported version '{}'", message.version)));
        }
        if message.nonce.len() < MIN_NONCE_LEN
            || !message.nonce.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(parse_err("nonce must be at least 8 alphanumeric characters"));
        }
        parse_timestamp(&message.issued_at)?;
        if let Some(t) = &message.expiration_time {
            parse_timestamp(t)?;
        }
        if let Some(t) = &message.not_before {
            parse_timestamp(t)?;
        }

        Ok(message)
    }

    /// Render the message in the exact form a wallet signs.
    pub fn to_message(&self) -> String {
        let mut out = String::new();
        if let Some(scheme) = &self.scheme {
            out.push_str(&format!("{}://", scheme));
        }
        out.push_str(&self.domain);
        out.push_str(HEADER_SUFFIX);
        out.push('\n');
        out.push_str(&self.address.to_checksum());
        out.push_str("\n\n");
        if let Some(statement) = &self.statement {
            out.push_str(statement);
            out.push_str("\n\n");
        }
        out.push_str(&format!("URI: {}\n", self.uri));
        out.push_str(&format!("Version: {}\n", self.version));
        out.push_str(&format!("Chain ID: {}\n", self.chain_id));
        out.push_str(&format!("Nonce: {}\n", self.nonce));
        out.push_str(&format!("Issued At: {}", self.issued_at));
        if let Some(t) = &self.expiration_time {
            out.push_str(&format!("\nExpiration Time: {}", t));
        }
        if let Some(t) = &self.not_before {
            out.push_str(&format!("\nNot Before: {}", t));
        }
        if let Some(id) = &self.request_id {
            out.push_str(&format!("\nRequest ID: {}", id));
        }
        if !self.resources.is_empty() {
            out.push_str("\nResources:");
            for r in &self.resources {
                out.push_str(&format!("\n- {}", r));
            }
        }
        out
    }

    /// `Issued At` as unix seconds.
    pub fn issued_at_secs(&self) -> Result<i64, SiweError> {
        parse_timestamp(&self.issued_at)
    }

    /// Step 1: the message must be addressed to one of `domains`.
    pub fn check_domain(&self, domains: &[String]) -> Result<(), SiweError> {
        if domains.iter().any(|d| d.eq_ignore_ascii_case(&self.domain)) {
            Ok(())
        } else {
            Err(SiweError::DomainMismatch {
                got: self.domain.clone(),
            })
        }
    }

    /// Step 2: the message nonce must be one we issued.
    pub fn check_nonce(&self, nonces: &[String]) -> Result<(), SiweError> {
        if nonces.iter().any(|n| !n.is_empty() && *n == self.nonce) {
            Ok(())
        } else {
            Err(SiweError::NonceMismatch)
        }
    }

    /// Step 3: time window checks.
    pub fn check_time(&self, now: u64, max_age_secs: u64) -> Result<(), SiweError> {
        let now = now as i64;
        let issued = self.issued_at_secs()?;
        if issued > now.saturating_add(CLOCK_SKEW_SECS as i64) {
            return Err(SiweError::NotYetValid);
        }
        if now.saturating_sub(issued) > max_age_secs as i64 {
            return Err(SiweError::Expired);
        }
        if let Some(t) = &self.expiration_time {
            if parse_timestamp(t)? <= now {
                return Err(SiweError::Expired);
            }
        }
        if let Some(t) = &self.not_before {
            if parse_timestamp(t)? > now {
                return Err(SiweError::NotYetValid);
            }
        }
        Ok(())
    }

    /// First unix second at which [`check_time`](Self::check_time) rejects
    /// this message for good. A consumed nonce must stay recorded until then.
    pub fn usable_until(&self, max_age_secs: u64) -> Result<u64, SiweError> {
        let issued = self.issued_at_secs()?.max(0) as u64;
        let mut until = issued
            .saturating_add(max_age_secs)
            .saturating_add(CLOCK_SKEW_SECS)
            .saturating_add(1);
        if let Some(t) = &self.expiration_time {
            until = until.max(parse_timestamp(t)?.max(0) as u64);
        }
        Ok(until)
    }

    /// Step 4: the signature must recover to the message address.
    pub fn check_signature(&self, signed_text: &str, signature: &str) -> Result<(), SiweError> {
        let recovered = recover_personal_signer(signed_text, signature)?;
        if recovered == self.address {
            Ok(())
        } else {
            Err(SiweError::AddressMismatch(self.address))
        }
    }

    /// Run the full pipeline. `signed_text` is the exact text the wallet
    /// signed, which is also what `self` was parsed from.
    pub fn verify(
        &self,
        signed_text: &str,
        signature: &str,
        opts: &VerifyOptions,
    ) -> Result<Address, SiweError> {
        self.check_domain(&opts.domains)?;
        self.check_nonce(&opts.nonces)?;
        self.check_time(opts.now, opts.max_age_secs)?;
        self.check_signature(signed_text, signature)?;
        Ok(self.address)
    }
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// Parse an RFC 3339 timestamp into unix seconds.
pub fn parse_timestamp(s: &str) -> Result<i64, SiweError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp())
        .map_err(|e| parse_err(format!("invalid timestamp '{}': {}", s, e)))
}

/// Format unix seconds as an RFC 3339 UTC timestamp (`...Z`).
pub fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

// =============================================================================
// SIGNATURES
// =============================================================================

/// EIP-191 `personal_sign` digest of `message`.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message.as_bytes());
    keccak256(data)
}

/// Recover the signer of a 65-byte `r || s || v` hex signature over
/// `message` hashed with EIP-191.
pub fn recover_personal_signer(message: &str, signature: &str) -> Result<Address, SiweError> {
    let raw = hex::decode(strip_0x(signature.trim()))
        .map_err(|e| SiweError::BadSignature(format!("not hex: {}", e)))?;
    if raw.len() != 65 {
        return Err(SiweError::BadSignature(format!(
            "expected 65 bytes, got {}",
            raw.len()
        )));
    }

    let v = match raw[64] {
        0 | 1 => raw[64],
        27 | 28 => raw[64] - 27,
        other => {
            return Err(SiweError::BadSignature(format!("invalid recovery byte {}", other)));
        }
    };
    let mut recovery_id = RecoveryId::try_from(v)
        .map_err(|e| SiweError::BadSignature(format!("invalid recovery id: {}", e)))?;
    let mut sig = Signature::from_slice(&raw[..64])
        .map_err(|e| SiweError::BadSignature(format!("invalid signature: {}", e)))?;

    // High-s signatures recover the same key with the y parity flipped.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let hash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&hash, &sig, recovery_id)
        .map_err(|e| SiweError::BadSignature(format!("recovery failed: {}", e)))?;
    verifying_key_address(&key).map_err(|e| SiweError::BadSignature(e.to_string()))
}

/// Address of a secp256k1 verifying key.
pub fn verifying_key_address(key: &VerifyingKey) -> crate::Result<Address> {
    let point = key.to_encoded_point(false);
    Address::from_public_key(&point.as_bytes()[1..])
}

/// Signing helpers for test suites.
#[cfg(any(test, feature = "test-utils"))]
pub mod signing {
    use super::{personal_message_hash, verifying_key_address};
    use crate::address::Address;
    use k256::ecdsa::SigningKey;

    /// Deterministic signing key from a small seed.
    pub fn test_key(seed: u8) -> SigningKey {
        let mut bytes = [0x11u8; 32];
        bytes[31] = seed.max(1);
        SigningKey::from_slice(&bytes).expect("fixed scalar is a valid key")
    }

    /// Address controlled by `key`.
    pub fn key_address(key: &SigningKey) -> Address {
        verifying_key_address(key.verifying_key()).expect("64-byte public key")
    }

    /// `personal_sign` over `message`, returned as `0x` hex with v = 27/28.
    pub fn personal_sign(key: &SigningKey, message: &str) -> String {
        let hash = personal_message_hash(message);
        let (sig, recid) = key
            .sign_prehash_recoverable(&hash)
            .expect("signing a 32-byte prehash");
        let mut out = sig.to_bytes().to_vec();
        out.push(27 + recid.to_byte());
        format!("0x{}", hex::encode(out))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::signing::{key_address, personal_sign, test_key};
    use super::*;

    const NOW: u64 = 1_760_000_000;

    fn sample(address: Address) -> SiweMessage {
        let mut msg = SiweMessage::new(
            "app.example.com",
            address,
            "https://app.example.com",
            8453,
            "abcDEF12345",
            format_timestamp(NOW as i64 - 60),
        );
        msg.statement = Some("Sign in to Creator Vault".into());
        msg
    }

    fn opts() -> VerifyOptions {
        VerifyOptions::new(
            vec!["app.example.com".into()],
            vec!["abcDEF12345".into()],
            NOW,
        )
    }

    #[test]
    fn parse_round_trips_rendered_message() {
        let key = test_key(1);
        let mut msg = sample(key_address(&key));
        msg.expiration_time = Some(format_timestamp(NOW as i64 + 600));
        msg.request_id = Some("req-1".into());
        msg.resources = vec!["ipfs://bafy".into(), "https://example.com/a".into()];

        let parsed = SiweMessage::parse(&msg.to_message()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn parse_without_statement() {
        let key = test_key(2);
        let msg = SiweMessage::new(
            "localhost:3000",
            key_address(&key),
            "http://localhost:3000",
            1,
            "nonce1234",
            format_timestamp(NOW as i64),
        );
        let parsed = SiweMessage::parse(&msg.to_message()).unwrap();
        assert_eq!(parsed.statement, None);
        assert_eq!(parsed.domain, "localhost:3000");
    }

    #[test]
    fn parse_with_scheme() {
        let key = test_key(2);
        let mut msg = sample(key_address(&key));
        msg.scheme = Some("https".into());
        let parsed = SiweMessage::parse(&msg.to_message()).unwrap();
        assert_eq!(parsed.scheme.as_deref(), Some("https"));
        assert_eq!(parsed.domain, "app.example.com");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(SiweMessage::parse(""), Err(SiweError::Parse(_))));
        assert!(matches!(
            SiweMessage::parse("hello\nworld"),
            Err(SiweError::Parse(_))
        ));
    }

    #[test]
    fn parse_rejects_short_nonce() {
        let key = test_key(1);
        let mut msg = sample(key_address(&key));
        msg.nonce = "abc".into();
        assert!(matches!(
            SiweMessage::parse(&msg.to_message()),
            Err(SiweError::Parse(_))
        ));
    }

    #[test]
    fn verify_accepts_valid_signature() {
        let key = test_key(3);
        let msg = sample(key_address(&key));
        let text = msg.to_message();
        let sig = personal_sign(&key, &text);

        let parsed = SiweMessage::parse(&text).unwrap();
        assert_eq!(parsed.verify(&text, &sig, &opts()).unwrap(), key_address(&key));
    }

    #[test]
    fn verify_rejects_domain_mismatch() {
        let key = test_key(3);
        let mut msg = sample(key_address(&key));
        msg.domain = "evil.example".into();
        let text = msg.to_message();
        let sig = personal_sign(&key, &text);

        let err = msg.verify(&text, &sig, &opts()).unwrap_err();
        assert!(matches!(err, SiweError::DomainMismatch { .. }));
        assert!(!err.is_signature_failure());
    }

    #[test]
    fn verify_rejects_nonce_mismatch() {
        let key = test_key(3);
        let mut msg = sample(key_address(&key));
        msg.nonce = "otherNonce99".into();
        let text = msg.to_message();
        let sig = personal_sign(&key, &text);

        assert_eq!(msg.verify(&text, &sig, &opts()), Err(SiweError::NonceMismatch));
    }

    #[test]
    fn verify_rejects_old_message() {
        let key = test_key(3);
        let mut msg = sample(key_address(&key));
        msg.issued_at = format_timestamp(NOW as i64 - (MAX_MESSAGE_AGE_SECS as i64 + 1));
        let text = msg.to_message();
        let sig = personal_sign(&key, &text);

        assert_eq!(msg.verify(&text, &sig, &opts()), Err(SiweError::Expired));
    }

    #[test]
    fn usable_until_outlasts_the_age_window() {
        let key = test_key(3);
        let msg = sample(key_address(&key));
        let issued = NOW - 60;
        let until = msg.usable_until(MAX_MESSAGE_AGE_SECS).unwrap();

        assert!(msg.check_time(issued + MAX_MESSAGE_AGE_SECS, MAX_MESSAGE_AGE_SECS).is_ok());
        assert!(until > issued + MAX_MESSAGE_AGE_SECS);
        assert!(msg.check_time(until, MAX_MESSAGE_AGE_SECS).is_err());
    }

    #[test]
    fn usable_until_covers_late_expiration_time() {
        let key = test_key(3);
        let mut msg = sample(key_address(&key));
        msg.expiration_time = Some(format_timestamp(NOW as i64 + 86_400));
        let until = msg.usable_until(MAX_MESSAGE_AGE_SECS).unwrap();
        assert_eq!(until, NOW + 86_400);
    }

    #[test]
    fn verify_rejects_past_expiration_time() {
        let key = test_key(3);
        let mut msg = sample(key_address(&key));
        msg.expiration_time = Some(format_timestamp(NOW as i64 - 1));
        let text = msg.to_message();
        let sig = personal_sign(&key, &text);

        assert_eq!(msg.verify(&text, &sig, &opts()), Err(SiweError::Expired));
    }

    #[test]
    fn verify_rejects_future_not_before() {
        let key = test_key(3);
        let mut msg = sample(key_address(&key));
        msg.not_before = Some(format_timestamp(NOW as i64 + 60));
        let text = msg.to_message();
        let sig = personal_sign(&key, &text);

        assert_eq!(msg.verify(&text, &sig, &opts()), Err(SiweError::NotYetValid));
    }

    #[test]
    fn verify_rejects_signature_from_other_key() {
        let key = test_key(3);
        let other = test_key(4);
        let msg = sample(key_address(&key));
        let text = msg.to_message();
        let sig = personal_sign(&other, &text);

        let err = msg.verify(&text, &sig, &opts()).unwrap_err();
        assert!(matches!(err, SiweError::AddressMismatch(_)));
        assert!(err.is_signature_failure());
    }

    #[test]
    fn verify_rejects_tampered_text() {
        let key = test_key(5);
        let msg = sample(key_address(&key));
        let text = msg.to_message();
        let sig = personal_sign(&key, &text);

        let tampered = text.replace("Sign in", "Sign over");
        assert!(msg.verify(&tampered, &sig, &opts()).is_err());
    }

    #[test]
    fn recover_rejects_malformed_signatures() {
        assert!(matches!(
            recover_personal_signer("hi", "0x1234"),
            Err(SiweError::BadSignature(_))
        ));
        assert!(matches!(
            recover_personal_signer("hi", "zz"),
            Err(SiweError::BadSignature(_))
        ));
        let bad_v = format!("0x{}{}", "11".repeat(64), "05");
        assert!(matches!(
            recover_personal_signer("hi", &bad_v),
            Err(SiweError::BadSignature(_))
        ));
    }

    #[test]
    fn recover_accepts_zero_based_v() {
        let key = test_key(6);
        let sig = personal_sign(&key, "hello");
        let mut raw = hex::decode(&sig[2..]).unwrap();
        raw[64] -= 27;
        let zero_based = format!("0x{}", hex::encode(raw));
        assert_eq!(
            recover_personal_signer("hello", &zero_based).unwrap(),
            key_address(&key)
        );
    }

    #[test]
    fn timestamp_round_trip() {
        let s = format_timestamp(NOW as i64);
        assert!(s.ends_with('Z'));
        assert_eq!(parse_timestamp(&s).unwrap(), NOW as i64);
    }
}

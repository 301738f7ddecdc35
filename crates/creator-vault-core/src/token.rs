//! # Token Module
//!
//! HMAC-SHA256 signed tokens for SIWE nonces and sessions.
//!
//! Format: `base64url(postcard(claims)) "." base64url(hmac)`.
//! A token only verifies for the [`TokenKind`] it was minted as, so a nonce
//! token can never be presented as a session.

use crate::address::Address;
use crate::error::{Result, VaultError};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of a nonce cookie and its fallback token.
pub const NONCE_TTL_SECS: u64 = 10 * 60;

/// Lifetime of a session.
pub const SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Secrets shorter than this are refused.
pub const MIN_SECRET_LEN: usize = 32;

/// What a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Nonce,
    Session,
}

/// Signed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub kind: TokenKind,
    /// The nonce for nonce tokens, the lowercase address for sessions.
    pub subject: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// A verified session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub address: Address,
    pub expires_at: u64,
}

/// Mints and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(VaultError::validation(format!(
                "token secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self {
            key: secret.to_vec(),
        })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| VaultError::InvalidToken(format!("bad key: {}", e)))
    }

    /// Sign arbitrary claims.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let payload = postcard::to_allocvec(claims)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let tag = mac.finalize().into_bytes();
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Verify MAC, kind and expiry; return the claims.
    pub fn verify(&self, token: &str, kind: TokenKind, now: u64) -> Result<Claims> {
        let (payload_b64, tag_b64) = token
            .trim()
            .split_once('.')
            .ok_or_else(|| VaultError::InvalidToken("missing separator".into()))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| VaultError::InvalidToken("payload is not base64".into()))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| VaultError::InvalidToken("tag is not base64".into()))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&tag)
            .map_err(|_| VaultError::InvalidToken("signature mismatch".into()))?;

        let claims: Claims = postcard::from_bytes(&payload)
            .map_err(|_| VaultError::InvalidToken("undecodable claims".into()))?;
        if claims.kind != kind {
            return Err(VaultError::InvalidToken("wrong token kind".into()));
        }
        if claims.expires_at <= now {
            return Err(VaultError::InvalidToken("expired".into()));
        }
        Ok(claims)
    }

    /// Fallback token carrying `nonce` for clients that drop cookies.
    pub fn issue_nonce(&self, nonce: &str, now: u64) -> Result<(String, u64)> {
        let expires_at = now.saturating_add(NONCE_TTL_SECS);
        let token = self.sign(&Claims {
            kind: TokenKind::Nonce,
            subject: nonce.to_string(),
            issued_at: now,
            expires_at,
        })?;
        Ok((token, expires_at))
    }

    /// The nonce inside a valid fallback token.
    pub fn verify_nonce(&self, token: &str, now: u64) -> Result<(String, u64)> {
        let claims = self.verify(token, TokenKind::Nonce, now)?;
        Ok((claims.subject, claims.expires_at))
    }

    /// Session token for `address`.
    pub fn issue_session(&self, address: &Address, now: u64) -> Result<(String, u64)> {
        let expires_at = now.saturating_add(SESSION_TTL_SECS);
        let token = self.sign(&Claims {
            kind: TokenKind::Session,
            subject: address.to_lower_hex(),
            issued_at: now,
            expires_at,
        })?;
        Ok((token, expires_at))
    }

    /// Session carried by a valid session token.
    pub fn verify_session(&self, token: &str, now: u64) -> Result<Session> {
        let claims = self.verify(token, TokenKind::Session, now)?;
        let address = Address::parse(&claims.subject)
            .map_err(|_| VaultError::InvalidToken("bad session subject".into()))?;
        Ok(Session {
            address,
            expires_at: claims.expires_at,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn signer(byte: u8) -> TokenSigner {
        TokenSigner::new(&[byte; 32]).unwrap()
    }

    #[test]
    fn short_secret_is_refused() {
        assert!(TokenSigner::new(b"short").is_err());
    }

    #[test]
    fn nonce_token_round_trip() {
        let s = signer(1);
        let (token, exp) = s.issue_nonce("abcdefgh1234", NOW).unwrap();
        assert_eq!(exp, NOW + NONCE_TTL_SECS);
        let (nonce, _) = s.verify_nonce(&token, NOW + 5).unwrap();
        assert_eq!(nonce, "abcdefgh1234");
    }

    #[test]
    fn expired_token_is_rejected() {
        let s = signer(1);
        let (token, exp) = s.issue_nonce("abcdefgh1234", NOW).unwrap();
        assert!(s.verify_nonce(&token, exp).is_err());
    }

    #[test]
    fn foreign_key_is_rejected() {
        let (token, _) = signer(1).issue_nonce("abcdefgh1234", NOW).unwrap();
        let err = signer(2).verify_nonce(&token, NOW).unwrap_err();
        assert!(matches!(err, VaultError::InvalidToken(_)));
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let s = signer(3);
        let (nonce_token, _) = s.issue_nonce("abcdefgh1234", NOW).unwrap();
        assert!(s.verify_session(&nonce_token, NOW).is_err());

        let addr = Address([7u8; 20]);
        let (session_token, _) = s.issue_session(&addr, NOW).unwrap();
        assert!(s.verify_nonce(&session_token, NOW).is_err());
    }

    #[test]
    fn session_round_trip() {
        let s = signer(4);
        let addr = Address([0xab; 20]);
        let (token, exp) = s.issue_session(&addr, NOW).unwrap();
        let session = s.verify_session(&token, NOW + 60).unwrap();
        assert_eq!(session.address, addr);
        assert_eq!(session.expires_at, exp);
        assert_eq!(exp - NOW, SESSION_TTL_SECS);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let s = signer(5);
        let (token, _) = s.issue_session(&Address([1u8; 20]), NOW).unwrap();
        let (_, tag) = token.split_once('.').unwrap();
        let forged_claims = Claims {
            kind: TokenKind::Session,
            subject: Address([2u8; 20]).to_lower_hex(),
            issued_at: NOW,
            expires_at: NOW + 10,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(postcard::to_allocvec(&forged_claims).unwrap());
        let forged = format!("{}.{}", forged_payload, tag);
        assert!(s.verify_session(&forged, NOW).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let s = signer(6);
        assert!(s.verify_session("", NOW).is_err());
        assert!(s.verify_session("no-dot", NOW).is_err());
        assert!(s.verify_session("!!.??", NOW).is_err());
    }
}

//! # Configuration
//!
//! Server settings, read from flags with environment fallbacks.
//! List-valued variables are comma-separated; entries are trimmed and empty
//! entries dropped.

use clap::Args;
use creator_vault_core::token::MIN_SECRET_LEN;
use creator_vault_core::{Address, TokenSigner, VaultError};
use rand::RngCore;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Default database path.
pub const DEFAULT_DB: &str = "creator-vault.redb";

/// Flags for `serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "CREATOR_VAULT_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// HMAC secret for nonce and session tokens (at least 32 bytes).
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Addresses allowed to use the admin endpoints.
    #[arg(long, env = "ADMIN_ADDRESSES", default_value = "")]
    pub admin_addresses: String,

    /// Domains SIWE messages may name besides the request Host.
    #[arg(long, env = "ALLOWED_DOMAINS", default_value = "")]
    pub allowed_domains: String,

    /// JSON-RPC endpoints, tried in order.
    #[arg(long, env = "RPC_URLS", default_value = "")]
    pub rpc_urls: String,

    /// Origins allowed by CORS. Empty means same-origin only.
    #[arg(long, env = "CORS_ORIGINS", default_value = "")]
    pub cors_origins: String,

    /// Key accepted on `X-Internal-Api-Key` for point awards.
    #[arg(long, env = "INTERNAL_API_KEY", hide_env_values = true)]
    pub internal_api_key: Option<String>,

    /// Mark cookies `Secure; SameSite=None`.
    #[arg(long, env = "COOKIE_SECURE", default_value_t = true, action = clap::ArgAction::Set)]
    pub cookie_secure: bool,

    /// Requests per minute per client on auth and signup routes.
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value_t = 30)]
    pub rate_limit_per_minute: u32,
}

/// Validated server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    pub signer: TokenSigner,
    pub admin_addresses: Vec<Address>,
    pub allowed_domains: Vec<String>,
    pub rpc_urls: Vec<String>,
    pub cors_origins: Vec<String>,
    pub internal_api_key: Option<String>,
    pub cookie_secure: bool,
    pub rate_limit_per_minute: NonZeroU32,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("admin_addresses", &self.admin_addresses)
            .field("allowed_domains", &self.allowed_domains)
            .field("rpc_urls", &self.rpc_urls.len())
            .field("cors_origins", &self.cors_origins)
            .field("internal_api_key", &self.internal_api_key.is_some())
            .field("cookie_secure", &self.cookie_secure)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Configuration with a fixed secret and everything else empty.
    pub fn new(secret: &[u8]) -> Result<Self, VaultError> {
        Ok(Self {
            signer: TokenSigner::new(secret)?,
            admin_addresses: Vec::new(),
            allowed_domains: Vec::new(),
            rpc_urls: Vec::new(),
            cors_origins: Vec::new(),
            internal_api_key: None,
            cookie_secure: true,
            rate_limit_per_minute: NonZeroU32::MIN.saturating_add(29),
        })
    }

    pub fn is_admin(&self, address: &Address) -> bool {
        self.admin_addresses.contains(address)
    }
}

impl ServeArgs {
    pub fn to_config(&self) -> Result<ServerConfig, VaultError> {
        let secret = match self.session_secret.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.as_bytes().to_vec(),
            _ => {
                tracing::warn!(
                    "SESSION_SECRET is not set; using an ephemeral secret, sessions will not survive a restart"
                );
                ephemeral_secret()
            }
        };

        let admin_addresses = split_list(&self.admin_addresses)
            .iter()
            .map(|a| Address::parse(a))
            .collect::<Result<Vec<_>, _>>()?;

        let rate_limit_per_minute = NonZeroU32::new(self.rate_limit_per_minute)
            .ok_or_else(|| VaultError::validation("RATE_LIMIT_PER_MINUTE must be positive"))?;

        Ok(ServerConfig {
            signer: TokenSigner::new(&secret)?,
            admin_addresses,
            allowed_domains: split_list(&self.allowed_domains),
            rpc_urls: split_list(&self.rpc_urls),
            cors_origins: split_list(&self.cors_origins),
            internal_api_key: self
                .internal_api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            cookie_secure: self.cookie_secure,
            rate_limit_per_minute,
        })
    }
}

/// Where the database lives.
pub fn db_path(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PathBuf::from(DEFAULT_DB))
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn ephemeral_secret() -> Vec<u8> {
    let mut bytes = [0u8; MIN_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes).into_bytes()
}

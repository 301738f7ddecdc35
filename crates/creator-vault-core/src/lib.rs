//! # Creator Vault Core
//!
//! Synchronous domain logic for the creator vault backend.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────────┐
//! │ address      │   │ siwe         │   │ store (redb)                 │
//! │ EIP-55       │◄──│ EIP-4361     │   │ allowlist, access requests,  │
//! │ keccak256    │   │ ecrecover    │   │ creator wallets, waitlist,   │
//! └──────────────┘   └──────────────┘   │ points ledger, nonces        │
//!        ▲           ┌──────────────┐   └──────────────────────────────┘
//!        └───────────│ token        │   ┌──────────────┐
//!                    │ HMAC-SHA256  │   │ create2      │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! Nothing in this crate reads the clock or draws randomness: callers pass
//! `now` as unix seconds and supply nonces, codes and secrets.

pub mod address;
pub mod create2;
pub mod error;
pub mod siwe;
pub mod store;
pub mod token;

pub use address::Address;
pub use create2::{Create2Target, SearchOutcome, VanityMatch, VanityPattern};
pub use error::{Result, VaultError};
pub use siwe::{SiweError, SiweMessage, VerifyOptions};
pub use store::{
    AccessRequest, AllowlistEntry, AwardOutcome, CreatorWallet, LeaderboardEntry, NewSignup,
    PointSource, PointsEntry, RequestStatus, Signup, SignupOutcome, Store, StoreStats,
};
pub use token::{Session, TokenKind, TokenSigner};

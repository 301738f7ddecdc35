//! # Creator Vault Library
//!
//! This library exposes the server and CLI modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod config;
pub mod rpc;

// Re-export creator_vault_core for convenience
pub use creator_vault_core;

//! # Infin8 admin bootstrap
//!
//! Provisions the single administrative account exactly once.
//!
//! This library provides:
//! - Credential resolution from defaults, with per-field overrides from a secret store
//! - Idempotent account creation that tolerates differences in the account schema
//! - A Vault KV v2 client and a SQLite account store
//!
//! ## Flow
//!
//! ```text
//!   Config ──▶ CredentialResolver ──▶ Provisioner ──▶ EnsureAdminReport
//!                    │                     │
//!                    ▼                     ▼
//!               SecretStore           AccountStore
//!             (optional, Vault)        (SQLite)
//! ```
//!
//! ## Modules
//! - `config`: Environment configuration and named defaults
//! - `credentials`: Credential triple and resolver
//! - `secrets`: Secret store trait and backends
//! - `accounts`: Account store trait and backends
//! - `provision`: Two-tier account creation
//! - `bootstrap`: `ensure_admin` entry point

pub mod accounts;
pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod provision;
pub mod secrets;

pub use bootstrap::{ensure_admin, ensure_admin_with, EnsureAdminReport};
pub use config::Config;
pub use credentials::{CredentialResolver, Credentials};
pub use provision::{ProvisionOutcome, Provisioner};

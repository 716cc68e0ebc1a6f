//! Account storage module with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database with PBKDF2 password hashes
//!
//! Deployments differ in which optional profile columns (such as
//! `phone_number`) their account schema carries. A store rejects a
//! [`NewAccount`] naming a profile field it does not know with
//! [`AccountStoreError::UnknownField`], which lets callers retry with the
//! minimal field set.

mod error;
mod memory;
pub mod password;
mod sqlite;

pub use error::AccountStoreError;
pub use memory::InMemoryAccountStore;
pub use sqlite::SqliteAccountStore;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;

use crate::credentials::Credentials;

/// A stored account.
#[derive(Debug, Clone)]
pub struct Account {
    pub username: String,
    pub email: String,
    /// PBKDF2 password hash (format: `pbkdf2:iterations:hex_salt:hex_hash`)
    pub password_hash: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    /// Optional profile columns that were populated
    pub profile: BTreeMap<String, String>,
    pub created_at: String,
}

/// Field set submitted to create an admin account.
#[derive(Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Extra profile fields; empty for the minimal field set
    pub profile: Vec<(String, String)>,
}

impl NewAccount {
    /// The minimal field set every account schema accepts.
    pub fn minimal(credentials: &Credentials) -> Self {
        Self {
            username: credentials.username.clone(),
            email: credentials.email.clone(),
            password: credentials.password.clone(),
            profile: Vec::new(),
        }
    }

    /// Add profile fields on top of the minimal set.
    pub fn with_profile(mut self, fields: &[(String, String)]) -> Self {
        self.profile.extend(fields.iter().cloned());
        self
    }

    pub fn is_minimal(&self) -> bool {
        self.profile.is_empty()
    }

    /// Check the fields every store requires.
    pub fn validate(&self) -> Result<(), AccountStoreError> {
        if self.username.trim().is_empty() {
            return Err(AccountStoreError::Validation(
                "username must not be empty".to_string(),
            ));
        }
        if self.password.is_empty() {
            return Err(AccountStoreError::Validation(
                "password must not be empty".to_string(),
            ));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(AccountStoreError::Validation(format!(
                    "invalid email address '{}'",
                    self.email
                )))
            }
        }
        for (name, _) in &self.profile {
            if name.trim().is_empty() {
                return Err(AccountStoreError::Validation(
                    "profile field name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("profile", &self.profile)
            .finish()
    }
}

/// Get current timestamp as RFC3339 string.
pub fn now_string() -> String {
    Utc::now().to_rfc3339()
}

/// Account store trait - implemented by all storage backends.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Whether an account with this username exists.
    async fn exists(&self, username: &str) -> Result<bool, AccountStoreError>;

    /// Get a single account by username.
    async fn get_account(&self, username: &str) -> Result<Option<Account>, AccountStoreError>;

    /// Create a superuser account from the given field set.
    ///
    /// Fails with `UnknownField` if a profile field is not part of the schema
    /// and with `AlreadyExists` if the username is taken.
    async fn create_admin(&self, account: &NewAccount) -> Result<(), AccountStoreError>;
}

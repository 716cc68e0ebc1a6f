//! Configuration management for the admin bootstrap.
//!
//! Configuration can be set via environment variables:
//! - `SECRET_STORE_ADDR` - Optional. Secret store address. Unset disables secret resolution.
//!   `VAULT_ADDR` is accepted as a fallback.
//! - `SECRET_STORE_TOKEN` - Optional. Bootstrap token. Defaults to `root` (dev-mode token).
//!   `VAULT_DEV_ROOT_TOKEN_ID` is accepted as a fallback.
//! - `SECRET_STORE_MOUNT` - Optional. KV v2 mount point. Defaults to `secret`.
//! - `SECRET_STORE_PATH` - Optional. Logical secret path. Defaults to `infin8`.
//! - `ADMIN_DEFAULT_USERNAME` - Optional. Defaults to `admin`.
//! - `ADMIN_DEFAULT_PASSWORD` - Optional. Defaults to `admin123`.
//! - `ADMIN_DEFAULT_EMAIL` - Optional. Defaults to `admin@example.com`.
//! - `ADMIN_PROFILE_FIELDS` - Optional. Extra fields for the first creation attempt,
//!   as comma-separated `name=value` pairs. Defaults to `phone_number=1234567890`.
//!   An empty value disables the rich attempt.
//! - `ACCOUNTS_DB_PATH` - Optional. SQLite account database. Defaults to `./data/accounts.db`.
//! - `ACCOUNTS_PROFILE_COLUMNS` - Optional. Comma-separated extra columns for the accounts table.
//! - `BOOTSTRAP_TIMEOUT_SECS` - Optional. Timeout for each remote call. Defaults to `5`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

/// Token recognized by a dev-mode secret store when none is configured.
pub const DEFAULT_SECRET_STORE_TOKEN: &str = "root";
pub const DEFAULT_SECRET_MOUNT: &str = "secret";
pub const DEFAULT_SECRET_PATH: &str = "infin8";

/// Placeholder phone number some account schemas require.
pub const DEFAULT_PHONE_NUMBER: &str = "1234567890";

pub const DEFAULT_ACCOUNTS_DB_PATH: &str = "./data/accounts.db";
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Secret store connection settings.
#[derive(Clone)]
pub struct SecretStoreConfig {
    /// Secret store address (None disables secret resolution)
    pub address: Option<String>,

    /// Bootstrap token
    pub token: String,

    /// KV v2 mount point
    pub mount: String,

    /// Logical path of the admin secret
    pub path: String,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            address: None,
            token: DEFAULT_SECRET_STORE_TOKEN.to_string(),
            mount: DEFAULT_SECRET_MOUNT.to_string(),
            path: DEFAULT_SECRET_PATH.to_string(),
        }
    }
}

impl SecretStoreConfig {
    /// Check if secret resolution is enabled (address configured)
    pub fn is_enabled(&self) -> bool {
        self.address.is_some()
    }
}

impl std::fmt::Debug for SecretStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStoreConfig")
            .field("address", &self.address)
            .field("token", &"<redacted>")
            .field("mount", &self.mount)
            .field("path", &self.path)
            .finish()
    }
}

/// Credentials used when the secret store supplies nothing.
#[derive(Clone)]
pub struct AdminDefaults {
    pub username: String,
    pub password: String,
    pub email: String,

    /// Extra fields sent on the rich creation attempt
    pub profile_fields: Vec<(String, String)>,
}

impl Default for AdminDefaults {
    fn default() -> Self {
        Self {
            username: DEFAULT_ADMIN_USERNAME.to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
            email: DEFAULT_ADMIN_EMAIL.to_string(),
            profile_fields: vec![(
                "phone_number".to_string(),
                DEFAULT_PHONE_NUMBER.to_string(),
            )],
        }
    }
}

impl std::fmt::Debug for AdminDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminDefaults")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .field("profile_fields", &self.profile_fields)
            .finish()
    }
}

/// Bootstrap configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secret store settings
    pub secret_store: SecretStoreConfig,

    /// Default admin credentials and profile fields
    pub admin: AdminDefaults,

    /// Path to the SQLite account database
    pub accounts_db_path: PathBuf,

    /// Optional columns the accounts table should carry
    pub accounts_profile_columns: Vec<String>,

    /// Timeout applied to each secret store and account store call
    pub call_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            secret_store: SecretStoreConfig::default(),
            admin: AdminDefaults::default(),
            accounts_db_path: PathBuf::from(DEFAULT_ACCOUNTS_DB_PATH),
            accounts_profile_columns: Vec::new(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric or list variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup (useful for testing).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret_store = SecretStoreConfig {
            address: non_empty("SECRET_STORE_ADDR").or_else(|| non_empty("VAULT_ADDR")),
            token: non_empty("SECRET_STORE_TOKEN")
                .or_else(|| non_empty("VAULT_DEV_ROOT_TOKEN_ID"))
                .unwrap_or_else(|| DEFAULT_SECRET_STORE_TOKEN.to_string()),
            mount: non_empty("SECRET_STORE_MOUNT")
                .unwrap_or_else(|| DEFAULT_SECRET_MOUNT.to_string()),
            path: non_empty("SECRET_STORE_PATH").unwrap_or_else(|| DEFAULT_SECRET_PATH.to_string()),
        };

        // Unset keeps the placeholder phone field; an explicit empty value disables it.
        let profile_fields = match lookup("ADMIN_PROFILE_FIELDS") {
            Some(raw) => parse_profile_fields(&raw)?,
            None => AdminDefaults::default().profile_fields,
        };

        let admin = AdminDefaults {
            username: non_empty("ADMIN_DEFAULT_USERNAME")
                .unwrap_or_else(|| DEFAULT_ADMIN_USERNAME.to_string()),
            password: non_empty("ADMIN_DEFAULT_PASSWORD")
                .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
            email: non_empty("ADMIN_DEFAULT_EMAIL")
                .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
            profile_fields,
        };

        let accounts_db_path = non_empty("ACCOUNTS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ACCOUNTS_DB_PATH));

        let accounts_profile_columns = non_empty("ACCOUNTS_PROFILE_COLUMNS")
            .map(|raw| {
                raw.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let call_timeout_secs: u64 = non_empty("BOOTSTRAP_TIMEOUT_SECS")
            .unwrap_or_else(|| DEFAULT_CALL_TIMEOUT_SECS.to_string())
            .trim()
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("BOOTSTRAP_TIMEOUT_SECS".to_string(), format!("{}", e))
            })?;

        if call_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "BOOTSTRAP_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            secret_store,
            admin,
            accounts_db_path,
            accounts_profile_columns,
            call_timeout: Duration::from_secs(call_timeout_secs),
        })
    }

    /// Create a config pointing at the given secret store address (useful for testing).
    pub fn with_secret_store(address: Option<String>) -> Self {
        Self {
            secret_store: SecretStoreConfig {
                address,
                ..SecretStoreConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Parse `name=value` pairs separated by commas.
fn parse_profile_fields(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut fields = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, value) = entry.split_once('=').ok_or_else(|| {
            ConfigError::InvalidValue(
                "ADMIN_PROFILE_FIELDS".to_string(),
                format!("expected name=value, got '{}'", entry),
            )
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "ADMIN_PROFILE_FIELDS".to_string(),
                format!("empty field name in '{}'", entry),
            ));
        }
        fields.push((name.to_string(), value.trim().to_string()));
    }
    Ok(fields)
}

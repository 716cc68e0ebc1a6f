//! Admin credential resolution.
//!
//! Credentials start from configured defaults. When a secret store is
//! available, each of `ADMIN_USER`, `ADMIN_PASSWORD` and `ADMIN_EMAIL` found in
//! the admin secret replaces the matching field. Any secret store failure is
//! logged and absorbed: resolution always yields a complete set of credentials.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::{
    AdminDefaults, Config, DEFAULT_ADMIN_EMAIL, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME,
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_SECRET_PATH,
};
use crate::secrets::{call_with_timeout, SecretStore, SecretStoreError};

/// Secret key overriding the admin username.
pub const SECRET_KEY_USERNAME: &str = "ADMIN_USER";
/// Secret key overriding the admin password.
pub const SECRET_KEY_PASSWORD: &str = "ADMIN_PASSWORD";
/// Secret key overriding the admin email.
pub const SECRET_KEY_EMAIL: &str = "ADMIN_EMAIL";

/// The admin username, password and email used for provisioning.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: email.into(),
        }
    }

    pub fn from_defaults(defaults: &AdminDefaults) -> Self {
        Self::new(
            defaults.username.clone(),
            defaults.password.clone(),
            defaults.email.clone(),
        )
    }

    /// Apply secret values field by field, returning the keys that took effect.
    ///
    /// Missing keys and blank values leave the current field untouched.
    pub fn apply_overrides(&mut self, secret: &HashMap<String, String>) -> Vec<&'static str> {
        let mut applied = Vec::new();
        let fields: [(&'static str, &mut String); 3] = [
            (SECRET_KEY_USERNAME, &mut self.username),
            (SECRET_KEY_PASSWORD, &mut self.password),
            (SECRET_KEY_EMAIL, &mut self.email),
        ];
        for (key, field) in fields {
            match secret.get(key) {
                Some(value) if !value.trim().is_empty() => {
                    *field = value.clone();
                    applied.push(key);
                }
                Some(_) => tracing::warn!("Ignoring blank {} from secret store", key),
                None => {}
            }
        }
        applied
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(
            DEFAULT_ADMIN_USERNAME,
            DEFAULT_ADMIN_PASSWORD,
            DEFAULT_ADMIN_EMAIL,
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Secret store step that failed during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStage {
    Authenticate,
    Read,
}

impl std::fmt::Display for SecretStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretStage::Authenticate => write!(f, "authenticate"),
            SecretStage::Read => write!(f, "read"),
        }
    }
}

/// Where the resolved credentials came from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// No secret store configured
    Defaults,
    /// Secret read succeeded; lists the keys that overrode a default
    SecretStore { overridden: Vec<&'static str> },
    /// Secret store failed; defaults were kept
    Fallback {
        stage: SecretStage,
        error: SecretStoreError,
    },
}

impl CredentialSource {
    /// Whether the secret store was expected but could not be used.
    pub fn is_degraded(&self) -> bool {
        matches!(self, CredentialSource::Fallback { .. })
    }
}

/// Resolved credentials with their source.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub credentials: Credentials,
    pub source: CredentialSource,
}

/// Resolves admin credentials from defaults and an optional secret store.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    defaults: Credentials,
    secret_path: String,
    timeout: Duration,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(Credentials::default(), DEFAULT_SECRET_PATH)
    }
}

impl CredentialResolver {
    pub fn new(defaults: Credentials, secret_path: impl Into<String>) -> Self {
        Self {
            defaults,
            secret_path: secret_path.into(),
            timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Credentials::from_defaults(&config.admin),
            config.secret_store.path.clone(),
        )
        .with_timeout(config.call_timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn defaults(&self) -> &Credentials {
        &self.defaults
    }

    /// Resolve credentials, discarding how they were obtained.
    pub async fn resolve(&self, store: Option<&dyn SecretStore>) -> Credentials {
        self.resolve_detailed(store).await.credentials
    }

    /// Resolve credentials and report their source.
    pub async fn resolve_detailed(&self, store: Option<&dyn SecretStore>) -> Resolution {
        let Some(store) = store else {
            tracing::debug!("No secret store configured, using default admin credentials");
            return Resolution {
                credentials: self.defaults.clone(),
                source: CredentialSource::Defaults,
            };
        };

        if let Err(error) = call_with_timeout(self.timeout, store.authenticate()).await {
            return self.fallback(&store.describe(), SecretStage::Authenticate, error);
        }

        tracing::info!(
            "Connected to secret store at {}, fetching admin credentials",
            store.describe()
        );

        let read = call_with_timeout(self.timeout, store.read_secret(&self.secret_path)).await;
        let secret = match read {
            Ok(secret) => secret,
            Err(error) => return self.fallback(&store.describe(), SecretStage::Read, error),
        };

        let mut credentials = self.defaults.clone();
        let overridden = credentials.apply_overrides(&secret);
        if overridden.is_empty() {
            tracing::info!(
                "Secret {} has no admin credential keys, keeping defaults",
                self.secret_path
            );
        } else {
            tracing::info!(
                "Admin credentials loaded from secret store ({})",
                overridden.join(", ")
            );
        }

        Resolution {
            credentials,
            source: CredentialSource::SecretStore { overridden },
        }
    }

    /// Build a degraded resolution for an unusable secret store.
    ///
    /// Overrides are only applied after a successful read, so every failure keeps the defaults.
    pub fn fallback(
        &self,
        location: &str,
        stage: SecretStage,
        error: SecretStoreError,
    ) -> Resolution {
        tracing::warn!(
            "Secret store {} failed to {}: {}. Using defaults.",
            location,
            stage,
            error
        );
        Resolution {
            credentials: self.defaults.clone(),
            source: CredentialSource::Fallback { stage, error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::InMemorySecretStore;

    fn resolver() -> CredentialResolver {
        CredentialResolver::default()
    }

    #[tokio::test]
    async fn test_no_store_returns_defaults() {
        let resolution = resolver().resolve_detailed(None).await;
        assert_eq!(
            resolution.credentials,
            Credentials::new("admin", "admin123", "admin@example.com")
        );
        assert!(matches!(resolution.source, CredentialSource::Defaults));
    }

    #[tokio::test]
    async fn test_password_only_secret() {
        let store =
            InMemorySecretStore::new().with_secret("infin8", [("ADMIN_PASSWORD", "s3cr3t")]);
        let resolution = resolver().resolve_detailed(Some(&store)).await;
        assert_eq!(
            resolution.credentials,
            Credentials::new("admin", "s3cr3t", "admin@example.com")
        );
        match resolution.source {
            CredentialSource::SecretStore { overridden } => {
                assert_eq!(overridden, vec!["ADMIN_PASSWORD"])
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_each_key_overrides_independently() {
        let all = [
            ("ADMIN_USER", "ops"),
            ("ADMIN_PASSWORD", "hunter2"),
            ("ADMIN_EMAIL", "ops@infin8.dev"),
        ];
        for mask in 0u8..8 {
            let pairs: Vec<(&str, &str)> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << *i) != 0)
                .map(|(_, pair)| *pair)
                .collect();
            let store = InMemorySecretStore::new().with_secret("infin8", pairs);
            let creds = resolver().resolve(Some(&store)).await;

            let expect = |bit: u8, secret: &str, default: &str| {
                if mask & (1 << bit) != 0 {
                    secret.to_string()
                } else {
                    default.to_string()
                }
            };
            assert_eq!(creds.username, expect(0, "ops", "admin"), "mask {}", mask);
            assert_eq!(creds.password, expect(1, "hunter2", "admin123"), "mask {}", mask);
            assert_eq!(
                creds.email,
                expect(2, "ops@infin8.dev", "admin@example.com"),
                "mask {}",
                mask
            );
        }
    }

    #[tokio::test]
    async fn test_blank_values_keep_defaults() {
        let store = InMemorySecretStore::new().with_secret(
            "infin8",
            [("ADMIN_USER", "  "), ("ADMIN_EMAIL", "root@infin8.dev")],
        );
        let creds = resolver().resolve(Some(&store)).await;
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.email, "root@infin8.dev");
    }

    #[tokio::test]
    async fn test_auth_failure_falls_back_without_reading() {
        let store = InMemorySecretStore::new()
            .with_secret("infin8", [("ADMIN_PASSWORD", "s3cr3t")])
            .failing_auth(SecretStoreError::Unauthorized("permission denied".into()));
        let resolution = resolver().resolve_detailed(Some(&store)).await;

        assert_eq!(resolution.credentials, Credentials::default());
        assert!(resolution.source.is_degraded());
        assert!(matches!(
            resolution.source,
            CredentialSource::Fallback {
                stage: SecretStage::Authenticate,
                ..
            }
        ));
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_falls_back() {
        let store = InMemorySecretStore::new()
            .failing_reads(SecretStoreError::Parse("unexpected body".into()));
        let resolution = resolver().resolve_detailed(Some(&store)).await;
        assert_eq!(resolution.credentials, Credentials::default());
        assert!(matches!(
            resolution.source,
            CredentialSource::Fallback {
                stage: SecretStage::Read,
                error: SecretStoreError::Parse(_),
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_secret_path_falls_back() {
        let store = InMemorySecretStore::new().with_secret("other", [("ADMIN_USER", "ops")]);
        let resolution = resolver().resolve_detailed(Some(&store)).await;
        assert_eq!(resolution.credentials, Credentials::default());
        assert!(matches!(
            resolution.source,
            CredentialSource::Fallback {
                error: SecretStoreError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = InMemorySecretStore::new()
            .with_secret("infin8", [("ADMIN_USER", "ops")])
            .with_latency(Duration::from_secs(5));
        let resolution = resolver()
            .with_timeout(Duration::from_millis(50))
            .resolve_detailed(Some(&store))
            .await;
        assert_eq!(resolution.credentials, Credentials::default());
        assert!(matches!(
            resolution.source,
            CredentialSource::Fallback {
                stage: SecretStage::Authenticate,
                error: SecretStoreError::Timeout(_),
            }
        ));
    }

    #[tokio::test]
    async fn test_custom_defaults_and_path() {
        let defaults = Credentials::new("root", "changeme", "root@infin8.dev");
        let store =
            InMemorySecretStore::new().with_secret("bootstrap/admin", [("ADMIN_USER", "ops")]);
        let creds = CredentialResolver::new(defaults, "bootstrap/admin")
            .resolve(Some(&store))
            .await;
        assert_eq!(creds, Credentials::new("ops", "changeme", "root@infin8.dev"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", Credentials::new("admin", "s3cr3t", "a@b.c"));
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("s3cr3t"));
    }
}

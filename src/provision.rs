//! Idempotent admin account provisioning.
//!
//! ```text
//! CHECK_EXISTENCE ──exists──▶ done
//!        │
//!     missing
//!        ▼
//!   CREATE_RICH ──ok──▶ done
//!        │
//!      fail
//!        ▼
//!  CREATE_MINIMAL ──ok──▶ done
//!        │
//!      fail
//!        ▼
//!   CreationFailed
//! ```
//!
//! The rich attempt sends the configured profile fields on top of the
//! minimal field set, for account schemas that require them. Any rich
//! failure falls through to the minimal attempt; only when both fail is the
//! operation reported as failed.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::accounts::{AccountStore, AccountStoreError, NewAccount};
use crate::config::{Config, DEFAULT_CALL_TIMEOUT_SECS};
use crate::credentials::Credentials;

/// Which field set a successful creation used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationTier {
    /// Minimal fields plus profile fields
    Rich,
    /// Username, email and password only
    Minimal,
}

impl std::fmt::Display for CreationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreationTier::Rich => write!(f, "rich"),
            CreationTier::Minimal => write!(f, "minimal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyExists,
    Created { tier: CreationTier },
}

#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    #[error("Failed to check for existing account '{username}': {source}")]
    ExistenceCheck {
        username: String,
        source: AccountStoreError,
    },

    #[error("Failed to create account '{username}': {}", describe_attempts(.rich, .minimal))]
    CreationFailed {
        username: String,
        /// Error from the rich attempt, if one was made
        rich: Option<AccountStoreError>,
        minimal: AccountStoreError,
    },
}

fn describe_attempts(rich: &Option<AccountStoreError>, minimal: &AccountStoreError) -> String {
    match rich {
        Some(rich) => format!("{} | {}", rich, minimal),
        None => minimal.to_string(),
    }
}

/// Creates the admin account unless it already exists.
pub struct Provisioner<'a> {
    store: &'a dyn AccountStore,
    profile_fields: Vec<(String, String)>,
    timeout: Duration,
}

impl<'a> Provisioner<'a> {
    /// A provisioner that only makes the minimal attempt.
    pub fn new(store: &'a dyn AccountStore) -> Self {
        Self {
            store,
            profile_fields: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    pub fn from_config(store: &'a dyn AccountStore, config: &Config) -> Self {
        Self::new(store)
            .with_profile_fields(config.admin.profile_fields.clone())
            .with_timeout(config.call_timeout)
    }

    /// Profile fields for the rich attempt. Empty skips straight to the minimal attempt.
    pub fn with_profile_fields(mut self, fields: Vec<(String, String)>) -> Self {
        self.profile_fields = fields;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call<T, F>(&self, call: F) -> Result<T, AccountStoreError>
    where
        F: Future<Output = Result<T, AccountStoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AccountStoreError::Timeout(self.timeout)),
        }
    }

    fn already_exists(username: &str) -> ProvisionOutcome {
        info!("Superuser '{}' already exists", username);
        ProvisionOutcome::AlreadyExists
    }

    /// Make sure an admin account for `credentials.username` exists.
    pub async fn ensure_account(
        &self,
        credentials: &Credentials,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let username = credentials.username.as_str();

        let exists = self
            .call(self.store.exists(username))
            .await
            .map_err(|source| {
                error!("Could not check for superuser '{}': {}", username, source);
                ProvisionError::ExistenceCheck {
                    username: username.to_string(),
                    source,
                }
            })?;
        if exists {
            return Ok(Self::already_exists(username));
        }

        info!("Creating superuser '{}'...", username);
        let minimal = NewAccount::minimal(credentials);

        let rich_error = if self.profile_fields.is_empty() {
            None
        } else {
            let rich = minimal.clone().with_profile(&self.profile_fields);
            match self.call(self.store.create_admin(&rich)).await {
                Ok(()) => {
                    info!("Superuser '{}' created successfully", username);
                    return Ok(ProvisionOutcome::Created {
                        tier: CreationTier::Rich,
                    });
                }
                // Another process created it between the check and the insert.
                Err(AccountStoreError::AlreadyExists(_)) => {
                    return Ok(Self::already_exists(username))
                }
                Err(e) => {
                    warn!(
                        "Creating superuser '{}' with profile fields failed: {}. Retrying with minimal fields",
                        username, e
                    );
                    Some(e)
                }
            }
        };

        match self.call(self.store.create_admin(&minimal)).await {
            Ok(()) => {
                if rich_error.is_some() {
                    info!("Superuser '{}' created successfully (fallback)", username);
                } else {
                    info!("Superuser '{}' created successfully", username);
                }
                Ok(ProvisionOutcome::Created {
                    tier: CreationTier::Minimal,
                })
            }
            Err(AccountStoreError::AlreadyExists(_)) => Ok(Self::already_exists(username)),
            Err(minimal_error) => {
                let err = ProvisionError::CreationFailed {
                    username: username.to_string(),
                    rich: rich_error,
                    minimal: minimal_error,
                };
                error!("{}", err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::password::verify_password;
    use crate::accounts::{InMemoryAccountStore, SqliteAccountStore};

    fn phone() -> Vec<(String, String)> {
        vec![("phone_number".to_string(), "1234567890".to_string())]
    }

    #[tokio::test]
    async fn test_rich_creation_with_default_credentials() {
        let store = InMemoryAccountStore::new().with_profile_fields(&["phone_number"]);
        let outcome = Provisioner::new(&store)
            .with_profile_fields(phone())
            .ensure_account(&Credentials::default())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProvisionOutcome::Created {
                tier: CreationTier::Rich
            }
        );
        let account = store.get_account("admin").await.unwrap().unwrap();
        assert_eq!(account.email, "admin@example.com");
        assert!(verify_password("admin123", &account.password_hash));
        assert_eq!(
            account.profile.get("phone_number").map(String::as_str),
            Some("1234567890")
        );
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let store = InMemoryAccountStore::new().with_profile_fields(&["phone_number"]);
        let provisioner = Provisioner::new(&store).with_profile_fields(phone());
        let creds = Credentials::default();

        provisioner.ensure_account(&creds).await.unwrap();
        let second = provisioner.ensure_account(&creds).await.unwrap();

        assert_eq!(second, ProvisionOutcome::AlreadyExists);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.attempts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_minimal_fields() {
        let store = InMemoryAccountStore::new();
        let creds = Credentials::new("ops", "s3cr3t", "ops@infin8.dev");
        let outcome = Provisioner::new(&store)
            .with_profile_fields(phone())
            .ensure_account(&creds)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProvisionOutcome::Created {
                tier: CreationTier::Minimal
            }
        );
        let attempts = store.attempts().await;
        assert_eq!(attempts.len(), 2);
        assert!(!attempts[0].is_minimal());
        assert!(attempts[1].is_minimal());

        let account = store.get_account("ops").await.unwrap().unwrap();
        assert_eq!(account.email, "ops@infin8.dev");
        assert!(verify_password("s3cr3t", &account.password_hash));
        assert!(account.profile.is_empty());
    }

    #[tokio::test]
    async fn test_both_tiers_failing_is_reported() {
        let store = InMemoryAccountStore::new()
            .failing_creates(AccountStoreError::Database("disk I/O error".into()));
        let err = Provisioner::new(&store)
            .with_profile_fields(phone())
            .ensure_account(&Credentials::default())
            .await
            .unwrap_err();

        match &err {
            ProvisionError::CreationFailed {
                username,
                rich,
                minimal,
            } => {
                assert_eq!(username, "admin");
                assert!(matches!(rich, Some(AccountStoreError::Database(_))));
                assert!(matches!(minimal, AccountStoreError::Database(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.to_string().contains(" | "));
        assert!(store.is_empty().await);
        assert_eq!(store.attempts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_no_profile_fields_means_single_attempt() {
        let store = InMemoryAccountStore::new()
            .failing_creates(AccountStoreError::Validation("rejected".into()));
        let err = Provisioner::new(&store)
            .ensure_account(&Credentials::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::CreationFailed { rich: None, .. }
        ));
        assert_eq!(store.attempts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_existence_check_failure() {
        let store = InMemoryAccountStore::new()
            .failing_exists(AccountStoreError::Database("locked".into()));
        let err = Provisioner::new(&store)
            .ensure_account(&Credentials::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ExistenceCheck { .. }));
        assert!(store.attempts().await.is_empty());
    }

    #[tokio::test]
    async fn test_lost_race_counts_as_existing() {
        let store = InMemoryAccountStore::new()
            .failing_creates(AccountStoreError::AlreadyExists("admin".into()));
        let outcome = Provisioner::new(&store)
            .with_profile_fields(phone())
            .ensure_account(&Credentials::default())
            .await
            .unwrap();

        assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
        assert_eq!(store.attempts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = InMemoryAccountStore::new().with_latency(Duration::from_secs(5));
        let err = Provisioner::new(&store)
            .with_timeout(Duration::from_millis(50))
            .ensure_account(&Credentials::default())
            .await
            .unwrap_err();

        match err {
            ProvisionError::ExistenceCheck { source, .. } => {
                assert!(matches!(source, AccountStoreError::Timeout(_)))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sqlite_schema_without_phone_column() {
        let store = SqliteAccountStore::open_in_memory(&[]).unwrap();
        let provisioner = Provisioner::new(&store).with_profile_fields(phone());

        let outcome = provisioner
            .ensure_account(&Credentials::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ProvisionOutcome::Created {
                tier: CreationTier::Minimal
            }
        );

        let again = provisioner
            .ensure_account(&Credentials::default())
            .await
            .unwrap();
        assert_eq!(again, ProvisionOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_sqlite_schema_with_phone_column() {
        let store = SqliteAccountStore::open_in_memory(&["phone_number".to_string()]).unwrap();
        let outcome = Provisioner::new(&store)
            .with_profile_fields(phone())
            .ensure_account(&Credentials::default())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ProvisionOutcome::Created {
                tier: CreationTier::Rich
            }
        );
    }

    #[tokio::test]
    async fn test_sqlite_invalid_email_fails_both_tiers() {
        let store = SqliteAccountStore::open_in_memory(&[]).unwrap();
        let err = Provisioner::new(&store)
            .with_profile_fields(phone())
            .ensure_account(&Credentials::new("admin", "admin123", "invalid"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::CreationFailed {
                rich: Some(AccountStoreError::Validation(_)),
                minimal: AccountStoreError::Validation(_),
                ..
            }
        ));
        assert!(!store.exists("admin").await.unwrap());
    }
}

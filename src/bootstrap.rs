//! Admin bootstrap: resolve credentials, then provision the account.
//!
//! Runs on every process start. Secret store problems degrade to default
//! credentials, and provisioning failures are reported in the returned
//! [`EnsureAdminReport`] instead of aborting the host.

use tracing::{info, warn};

use crate::accounts::AccountStore;
use crate::config::Config;
use crate::credentials::{CredentialResolver, CredentialSource, Resolution, SecretStage};
use crate::provision::{ProvisionError, ProvisionOutcome, Provisioner};
use crate::secrets::{SecretStore, VaultClient};

/// Result of one `ensure_admin` run.
#[derive(Debug)]
pub struct EnsureAdminReport {
    /// Username that was checked or created
    pub username: String,
    pub source: CredentialSource,
    pub outcome: Result<ProvisionOutcome, ProvisionError>,
}

impl EnsureAdminReport {
    /// Whether an admin account exists after the run.
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Ensure the admin account exists, reading overrides from the configured secret store.
///
/// A fresh secret store client is built for this call and dropped when it returns.
pub async fn ensure_admin(config: &Config, accounts: &dyn AccountStore) -> EnsureAdminReport {
    let resolver = CredentialResolver::from_config(config);

    let resolution = match config.secret_store.address.as_deref() {
        None => resolver.resolve_detailed(None).await,
        Some(address) => match VaultClient::new(address, config.secret_store.token.clone()) {
            Ok(client) => {
                let client = client.with_mount(config.secret_store.mount.clone());
                resolver.resolve_detailed(Some(&client)).await
            }
            Err(error) => resolver.fallback(address, SecretStage::Authenticate, error),
        },
    };

    provision(config, accounts, resolution).await
}

/// Same as [`ensure_admin`] with an explicit secret store in place of the configured address.
pub async fn ensure_admin_with(
    config: &Config,
    secrets: Option<&dyn SecretStore>,
    accounts: &dyn AccountStore,
) -> EnsureAdminReport {
    let resolution = CredentialResolver::from_config(config)
        .resolve_detailed(secrets)
        .await;
    provision(config, accounts, resolution).await
}

async fn provision(
    config: &Config,
    accounts: &dyn AccountStore,
    resolution: Resolution,
) -> EnsureAdminReport {
    let Resolution {
        credentials,
        source,
    } = resolution;

    if matches!(source, CredentialSource::Defaults | CredentialSource::Fallback { .. }) {
        info!(
            "Using default credentials for superuser '{}'",
            credentials.username
        );
    }

    let outcome = Provisioner::from_config(accounts, config)
        .ensure_account(&credentials)
        .await;

    if let Err(e) = &outcome {
        warn!("Admin bootstrap finished without an admin account: {}", e);
    }

    EnsureAdminReport {
        username: credentials.username,
        source,
        outcome,
    }
}

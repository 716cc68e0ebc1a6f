//! Secret store access for admin credential overrides.
//!
//! The bootstrap only needs two operations from a secret backend: prove the
//! token is valid, then read one versioned key-value secret. Both are exposed
//! through the [`SecretStore`] trait so the resolver can run against a real
//! Vault KV v2 endpoint or an in-memory map.
//!
//! ## Usage
//!
//! ```ignore
//! let store = VaultClient::new("http://127.0.0.1:8200", "root")?;
//! store.authenticate().await?;
//! let secret = store.read_secret("infin8").await?;
//! ```

mod error;
mod memory;
#[cfg(test)]
pub(crate) mod testing;
mod vault;

pub use error::SecretStoreError;
pub use memory::InMemorySecretStore;
pub use vault::VaultClient;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Secret store trait - implemented by all secret backends.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Human-readable location of the backend, for log lines.
    fn describe(&self) -> String;

    /// Verify the configured token. `Ok(())` means authenticated.
    async fn authenticate(&self) -> Result<(), SecretStoreError>;

    /// Read the latest version of the secret at `path` as string pairs.
    async fn read_secret(&self, path: &str) -> Result<HashMap<String, String>, SecretStoreError>;
}

/// Run a secret store call under a deadline, mapping expiry to [`SecretStoreError::Timeout`].
pub(crate) async fn call_with_timeout<T, F>(limit: Duration, call: F) -> Result<T, SecretStoreError>
where
    F: Future<Output = Result<T, SecretStoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SecretStoreError::Timeout(limit)),
    }
}

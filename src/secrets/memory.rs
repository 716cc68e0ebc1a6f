//! In-memory secret store (non-persistent).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{SecretStore, SecretStoreError};

#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: HashMap<String, HashMap<String, String>>,
    auth_error: Option<SecretStoreError>,
    read_error: Option<SecretStoreError>,
    latency: Option<Duration>,
    reads: AtomicUsize,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a secret at `path`.
    pub fn with_secret<K, V>(mut self, path: &str, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.secrets.insert(
            path.to_string(),
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Fail every authentication attempt with `error`.
    pub fn failing_auth(mut self, error: SecretStoreError) -> Self {
        self.auth_error = Some(error);
        self
    }

    /// Fail every read with `error`.
    pub fn failing_reads(mut self, error: SecretStoreError) -> Self {
        self.read_error = Some(error);
        self
    }

    /// Delay every call, to exercise caller timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `read_secret` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    fn describe(&self) -> String {
        "in-memory".to_string()
    }

    async fn authenticate(&self) -> Result<(), SecretStoreError> {
        self.simulate_latency().await;
        match &self.auth_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn read_secret(&self, path: &str) -> Result<HashMap<String, String>, SecretStoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if let Some(error) = &self.read_error {
            return Err(error.clone());
        }
        self.secrets
            .get(path)
            .cloned()
            .ok_or_else(|| SecretStoreError::NotFound(path.to_string()))
    }
}

//! Vault KV v2 client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use super::{SecretStore, SecretStoreError};
use crate::config::DEFAULT_SECRET_MOUNT;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Client for a Vault-compatible KV v2 secrets engine.
pub struct VaultClient {
    client: Client,
    address: String,
    token: String,
    mount: String,
}

impl VaultClient {
    /// Create a client for the given address and token.
    ///
    /// # Errors
    ///
    /// Returns `SecretStoreError::InvalidAddress` unless the address is an http(s) URL.
    pub fn new(address: &str, token: impl Into<String>) -> Result<Self, SecretStoreError> {
        let parsed = Url::parse(address.trim())
            .map_err(|e| SecretStoreError::InvalidAddress(address.to_string(), e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SecretStoreError::InvalidAddress(
                address.to_string(),
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        Ok(Self {
            client: Client::new(),
            address: parsed.as_str().trim_end_matches('/').to_string(),
            token: token.into(),
            mount: DEFAULT_SECRET_MOUNT.to_string(),
        })
    }

    /// Use a KV v2 engine mounted somewhere other than `secret/`.
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into().trim_matches('/').to_string();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str) -> Result<(StatusCode, String), SecretStoreError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SecretStoreError::Connection(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    SecretStoreError::Connection(format!("Connection failed: {}", e))
                } else {
                    SecretStoreError::Connection(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            SecretStoreError::Connection(format!("Failed to read response body: {}", e))
        })?;
        Ok((status, body))
    }
}

/// Map a non-success response to an error, using Vault's `errors` array when present.
fn error_from_response(status: StatusCode, body: &str, what: &str) -> SecretStoreError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .filter(|b| !b.errors.is_empty())
        .map(|b| b.errors.join("; "))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("no response body")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SecretStoreError::Unauthorized(message),
        StatusCode::NOT_FOUND => SecretStoreError::NotFound(what.to_string()),
        _ => SecretStoreError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct KvReadResponse {
    data: Option<KvReadData>,
}

#[derive(Debug, Deserialize)]
struct KvReadData {
    /// Null when the latest version was deleted or destroyed
    data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    metadata: Option<KvMetadata>,
}

#[derive(Debug, Deserialize)]
struct KvMetadata {
    #[serde(default)]
    version: Option<u64>,
}

/// Keep string values; other JSON types are not usable as credentials.
fn string_pairs(data: serde_json::Map<String, serde_json::Value>) -> HashMap<String, String> {
    data.into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some((key, s)),
            other => {
                tracing::debug!("Ignoring non-string secret value for key {} ({})", key, other);
                None
            }
        })
        .collect()
}

#[async_trait]
impl SecretStore for VaultClient {
    fn describe(&self) -> String {
        self.address.clone()
    }

    async fn authenticate(&self) -> Result<(), SecretStoreError> {
        let (status, body) = self.get("auth/token/lookup-self").await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(error_from_response(status, &body, "token"))
        }
    }

    async fn read_secret(&self, path: &str) -> Result<HashMap<String, String>, SecretStoreError> {
        let path = path.trim_matches('/');
        let (status, body) = self
            .get(&format!("{}/data/{}", self.mount, path))
            .await?;

        if !status.is_success() {
            return Err(error_from_response(status, &body, path));
        }

        let parsed: KvReadResponse = serde_json::from_str(&body)
            .map_err(|e| SecretStoreError::Parse(format!("{} (path {})", e, path)))?;

        let data = parsed.data.ok_or_else(|| {
            SecretStoreError::Parse(format!("missing data envelope (path {})", path))
        })?;

        let version = data.metadata.as_ref().and_then(|m| m.version);
        let values = data
            .data
            .ok_or_else(|| SecretStoreError::NotFound(format!("{} (no live version)", path)))?;

        tracing::debug!(
            "Read secret {} version {:?} with {} keys",
            path,
            version,
            values.len()
        );

        Ok(string_pairs(values))
    }
}

//! Secret store error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SecretStoreError {
    #[error("Invalid secret store address '{0}': {1}")]
    InvalidAddress(String, String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Secret store returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed secret store response: {0}")]
    Parse(String),

    #[error("Secret store call timed out after {0:?}")]
    Timeout(Duration),
}

impl SecretStoreError {
    /// Whether the store rejected the credentials rather than failing to answer.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SecretStoreError::Unauthorized(_))
    }

    /// Whether the store could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            SecretStoreError::InvalidAddress(_, _)
                | SecretStoreError::Connection(_)
                | SecretStoreError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SecretStoreError::Unauthorized("denied".into()).is_auth_failure());
        assert!(!SecretStoreError::NotFound("infin8".into()).is_auth_failure());
        assert!(SecretStoreError::Timeout(Duration::from_secs(5)).is_unreachable());
        assert!(SecretStoreError::Connection("refused".into()).is_unreachable());
        assert!(!SecretStoreError::Parse("bad json".into()).is_unreachable());
    }
}

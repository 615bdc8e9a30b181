pub mod vault;

pub use vault::VaultSecretStore;

use async_trait::async_trait;

use crate::server::registry::models::{Credentials, SecretToken};

/// Failures reported by a secret store backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret not found at '{0}'")]
    NotFound(String),

    #[error("invalid secret store token")]
    InvalidToken,

    #[error("secret store unreachable: {0}")]
    Connection(String),

    #[error("secret at '{path}' is malformed: {reason}")]
    MalformedSecret { path: String, reason: String },
}

/// Read-only access to registry secrets stored by path
///
/// The token is passed on every call so a single shared client can serve
/// concurrent requests carrying different tokens.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the `{username, password, email?}` record stored at `path`
    async fn fetch(&self, token: &SecretToken, path: &str)
        -> Result<Credentials, SecretStoreError>;
}

use std::sync::Arc;

use super::cache::CredentialCache;
use super::models::{Credentials, SecretToken};
use crate::server::secret_store::{SecretStore, SecretStoreError};

/// Resolves real registry credentials for a (token, secret path) pair,
/// consulting the cache before the secret store.
pub struct CredentialResolver {
    cache: CredentialCache,
    store: Arc<dyn SecretStore>,
}

impl CredentialResolver {
    pub fn new(cache: CredentialCache, store: Arc<dyn SecretStore>) -> Self {
        Self { cache, store }
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Return cached credentials or fetch, validate and cache them.
    ///
    /// Concurrent misses for the same pair share one secret-store fetch.
    pub async fn resolve(
        &self,
        token: &SecretToken,
        path: &str,
    ) -> Result<Credentials, SecretStoreError> {
        let store = self.store.clone();

        self.cache
            .get_or_fetch(token, path, async move {
                tracing::info!("Retrieving credentials from secret store for path: {}", path);

                let credentials = store.fetch(token, path).await?;
                if !credentials.is_complete() {
                    return Err(SecretStoreError::MalformedSecret {
                        path: path.to_string(),
                        reason: "username and password must be non-empty".to_string(),
                    });
                }

                tracing::info!("Cached credentials for path: {}", path);
                Ok(credentials)
            })
            .await
            .map_err(|e| (*e).clone())
    }
}

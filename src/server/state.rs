use crate::server::auth::ChallengeIssuer;
use crate::server::proxy::RequestForwarder;
use crate::server::registry::{CredentialCache, CredentialResolver};
use crate::server::secret_store::{SecretStore, VaultSecretStore};
use crate::server::settings::{AuthSettings, Settings};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Full state for the HTTP server
///
/// The credential cache inside the resolver is the only mutable state shared
/// between requests.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<CredentialResolver>,
    pub forwarder: Arc<RequestForwarder>,
    pub challenge: Arc<ChallengeIssuer>,
    pub auth_settings: Arc<AuthSettings>,
}

impl AppState {
    /// Create state backed by the configured Vault secret store
    pub fn new(settings: &Settings) -> Result<Self> {
        let store = VaultSecretStore::new(&settings.secret_store)
            .context("Failed to create secret store client")?;
        tracing::info!("Secret store address: {}", settings.secret_store.address);

        Self::with_secret_store(settings, Arc::new(store))
    }

    /// Create state around any secret store implementation
    pub fn with_secret_store(settings: &Settings, store: Arc<dyn SecretStore>) -> Result<Self> {
        let cache = CredentialCache::new(Duration::from_secs(settings.cache.ttl_secs));
        let forwarder = RequestForwarder::new(&settings.upstream)
            .context("Failed to create upstream HTTP client")?;

        Ok(Self {
            resolver: Arc::new(CredentialResolver::new(cache, store)),
            forwarder: Arc::new(forwarder),
            challenge: Arc::new(ChallengeIssuer::new(
                settings.auth.realm.clone(),
                settings.auth.service.clone(),
            )),
            auth_settings: Arc::new(settings.auth.clone()),
        })
    }
}

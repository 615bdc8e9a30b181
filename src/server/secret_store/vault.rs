use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::{SecretStore, SecretStoreError};
use crate::server::registry::models::{Credentials, SecretToken};
use crate::server::settings::SecretStoreSettings;

/// Registry secret as stored in the KV v2 engine
#[derive(Debug, Deserialize)]
struct RegistrySecret {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Check a client-supplied secret path before it reaches a Vault URL.
///
/// Segments must be non-empty, not `.` or `..`, and free of characters that
/// would change the request target.
fn validate_secret_path(path: &str) -> Result<&str, SecretStoreError> {
    let trimmed = path.trim_matches('/');
    let valid = !trimmed.is_empty()
        && trimmed.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && !segment
                    .chars()
                    .any(|c| matches!(c, '?' | '#' | '%') || c.is_control())
        });

    if valid {
        Ok(trimmed)
    } else {
        tracing::warn!("Rejected secret path that is not a plain KV path");
        Err(SecretStoreError::NotFound(path.to_string()))
    }
}

/// Map a `vaultrs` error onto the secret store taxonomy
fn map_client_error(path: &str, err: ClientError) -> SecretStoreError {
    match err {
        ClientError::APIError { code: 404, .. } => SecretStoreError::NotFound(path.to_string()),
        ClientError::APIError {
            code: 401 | 403, ..
        } => SecretStoreError::InvalidToken,
        ClientError::APIError { code, errors } => SecretStoreError::Connection(format!(
            "secret store returned {}: {}",
            code,
            errors.join("; ")
        )),
        ClientError::RestClientError { source } => SecretStoreError::Connection(source.to_string()),
        other => SecretStoreError::MalformedSecret {
            path: path.to_string(),
            reason: other.to_string(),
        },
    }
}

/// HashiCorp Vault KV v2 backend.
///
/// Holds no token: every [`fetch`](SecretStore::fetch) builds a short-lived
/// client around the token of the request being served.
pub struct VaultSecretStore {
    address: String,
    mount: String,
    timeout: Duration,
}

impl VaultSecretStore {
    pub fn new(settings: &SecretStoreSettings) -> anyhow::Result<Self> {
        reqwest::Url::parse(&settings.address).map_err(|e| {
            anyhow::anyhow!(
                "Invalid secret store address '{}': {}",
                settings.address,
                e
            )
        })?;

        Ok(Self {
            address: settings.address.trim_end_matches('/').to_string(),
            mount: settings.mount.trim_matches('/').to_string(),
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }

    /// Build a Vault client bound to one request's token
    fn client_for(&self, token: &SecretToken) -> Result<VaultClient, SecretStoreError> {
        let settings = VaultClientSettingsBuilder::default()
            .address(&self.address)
            .token(token.as_str())
            .timeout(Some(self.timeout))
            .build()
            .map_err(|e| {
                SecretStoreError::Connection(format!("invalid Vault client settings: {}", e))
            })?;

        VaultClient::new(settings).map_err(|e| {
            SecretStoreError::Connection(format!("failed to create Vault client: {}", e))
        })
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn fetch(
        &self,
        token: &SecretToken,
        path: &str,
    ) -> Result<Credentials, SecretStoreError> {
        let secret_path = validate_secret_path(path)?;
        let client = self.client_for(token)?;
        tracing::debug!("Reading registry secret {}/{}", self.mount, secret_path);

        let secret = kv2::read::<RegistrySecret>(&client, &self.mount, secret_path)
            .await
            .map_err(|e| map_client_error(path, e))?;

        let malformed = |reason: &str| SecretStoreError::MalformedSecret {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        let username = secret
            .username
            .ok_or_else(|| malformed("username not found in secret"))?;
        let password = secret
            .password
            .ok_or_else(|| malformed("password not found in secret"))?;

        Ok(Credentials::new(username, password, secret.email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// KV v2 read response envelope as Vault returns it
    fn kv_response(data: serde_json::Value) -> Response {
        Json(json!({
            "request_id": "7d2a1c8e-0000-4000-8000-000000000000",
            "lease_id": "",
            "renewable": false,
            "lease_duration": 0,
            "data": {
                "data": data,
                "metadata": {
                    "created_time": "2024-01-01T00:00:00.000000Z",
                    "custom_metadata": null,
                    "deletion_time": "",
                    "destroyed": false,
                    "version": 1
                }
            },
            "wrap_info": null,
            "warnings": null,
            "auth": null
        }))
        .into_response()
    }

    fn vault_error(status: StatusCode) -> Response {
        (status, Json(json!({"errors": []}))).into_response()
    }

    async fn fake_vault(
        State(requests): State<Arc<AtomicUsize>>,
        headers: HeaderMap,
        Path(path): Path<String>,
    ) -> Response {
        requests.fetch_add(1, Ordering::SeqCst);
        let token = headers
            .get("X-Vault-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if token != "good-token" {
            return vault_error(StatusCode::FORBIDDEN);
        }

        match path.as_str() {
            "docker-hub" | "team/docker-hub" => kv_response(
                json!({"username": "hubuser", "password": "hubpass", "email": "hub@example.com"}),
            ),
            "no-email" => kv_response(json!({"username": "u", "password": "p"})),
            "no-password" => kv_response(json!({"username": "u"})),
            "broken" => vault_error(StatusCode::INTERNAL_SERVER_ERROR),
            _ => vault_error(StatusCode::NOT_FOUND),
        }
    }

    async fn spawn_fake_vault() -> (String, Arc<AtomicUsize>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/v1/secret/data/{*path}", get(fake_vault))
            .with_state(requests.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), requests)
    }

    fn store_for(address: &str) -> VaultSecretStore {
        VaultSecretStore::new(&SecretStoreSettings {
            address: address.to_string(),
            mount: "secret".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_validate_secret_path() {
        assert_eq!(validate_secret_path("docker-hub"), Ok("docker-hub"));
        assert_eq!(validate_secret_path("/team/docker-hub/"), Ok("team/docker-hub"));

        for path in ["", "/", "a//b", "../sys/policy", "team/./x", "a?b=1", "a#frag", "a%2Fb"] {
            assert_eq!(
                validate_secret_path(path),
                Err(SecretStoreError::NotFound(path.to_string())),
                "path: {:?}",
                path
            );
        }
    }

    #[test]
    fn test_new_rejects_invalid_address() {
        let result = VaultSecretStore::new(&SecretStoreSettings {
            address: "not a url".to_string(),
            mount: "secret".to_string(),
            timeout_secs: 5,
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_credentials() {
        let (address, _) = spawn_fake_vault().await;
        let store = store_for(&address);
        let token = SecretToken::new("good-token");

        let creds = store.fetch(&token, "docker-hub").await.unwrap();
        assert_eq!(creds.username(), "hubuser");
        assert_eq!(creds.password(), "hubpass");
        assert_eq!(creds.email(), "hub@example.com");

        let creds = store.fetch(&token, "team/docker-hub").await.unwrap();
        assert_eq!(creds.username(), "hubuser");

        let creds = store.fetch(&token, "no-email").await.unwrap();
        assert_eq!(creds.email(), "");
    }

    #[tokio::test]
    async fn test_fetch_uses_each_callers_token() {
        let (address, _) = spawn_fake_vault().await;
        let store = store_for(&address);

        let good = SecretToken::new("good-token");
        let bad = SecretToken::new("bad-token");
        let (ok, denied) = tokio::join!(
            store.fetch(&good, "docker-hub"),
            store.fetch(&bad, "docker-hub")
        );

        assert!(ok.is_ok());
        assert_eq!(denied, Err(SecretStoreError::InvalidToken));
    }

    #[tokio::test]
    async fn test_fetch_error_mapping() {
        let (address, _) = spawn_fake_vault().await;
        let store = store_for(&address);
        let good = SecretToken::new("good-token");

        assert_eq!(
            store.fetch(&good, "missing").await,
            Err(SecretStoreError::NotFound("missing".to_string()))
        );
        assert_eq!(
            store.fetch(&SecretToken::new("bad"), "docker-hub").await,
            Err(SecretStoreError::InvalidToken)
        );
        assert!(matches!(
            store.fetch(&good, "no-password").await,
            Err(SecretStoreError::MalformedSecret { .. })
        ));
        assert!(matches!(
            store.fetch(&good, "broken").await,
            Err(SecretStoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_path_tricks_without_calling_vault() {
        let (address, requests) = spawn_fake_vault().await;
        let store = store_for(&address);
        let good = SecretToken::new("good-token");

        for path in ["docker-hub?version=1", "docker-hub#x", "../../sys/seal-status"] {
            assert_eq!(
                store.fetch(&good, path).await,
                Err(SecretStoreError::NotFound(path.to_string()))
            );
        }
        assert_eq!(requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_store() {
        // Bind then drop a listener to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = store_for(&format!("http://{}", addr));
        let result = store.fetch(&SecretToken::new("t"), "docker-hub").await;
        assert!(matches!(result, Err(SecretStoreError::Connection(_))));
    }
}

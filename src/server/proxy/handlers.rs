use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};

use crate::server::auth::challenge::{API_VERSION, API_VERSION_HEADER};
use crate::server::error::ProxyError;
use crate::server::middleware::RequestMeta;
use crate::server::registry::RegistryAuth;
use crate::server::state::AppState;

/// Registry API endpoints the proxy relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEndpoint {
    Catalog,
    Tags { name: String },
    Manifest { name: String, reference: String },
    Blob { name: String, digest: String },
}

impl RegistryEndpoint {
    /// Classify a request path such as `/v2/library/nginx/manifests/latest`
    pub fn from_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix("/v2/")?;
        if rest == "_catalog" {
            return Some(Self::Catalog);
        }

        if let Some(name) = rest.strip_suffix("/tags/list") {
            return (!name.is_empty()).then(|| Self::Tags {
                name: name.to_string(),
            });
        }

        let (prefix, last) = rest.rsplit_once('/')?;
        let (name, kind) = prefix.rsplit_once('/')?;
        if name.is_empty() || last.is_empty() {
            return None;
        }

        match kind {
            "manifests" => Some(Self::Manifest {
                name: name.to_string(),
                reference: last.to_string(),
            }),
            "blobs" => Some(Self::Blob {
                name: name.to_string(),
                digest: last.to_string(),
            }),
            _ => None,
        }
    }

    /// Path below `/v2` on the upstream registry
    pub fn upstream_path(&self) -> String {
        match self {
            Self::Catalog => "/_catalog".to_string(),
            Self::Tags { name } => format!("/{}/tags/list", name),
            Self::Manifest { name, reference } => format!("/{}/manifests/{}", name, reference),
            Self::Blob { name, digest } => format!("/{}/blobs/{}", name, digest),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Tags { .. } => "tags",
            Self::Manifest { .. } => "manifest",
            Self::Blob { .. } => "blob",
        }
    }
}

/// GET /v2/ - API version probe, never authenticated
pub async fn api_version_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION))],
    )
}

/// GET|HEAD /v2/{name}/... - relay a registry request to the upstream
///
/// In Basic mode the real credentials are resolved (cache first, then the
/// secret store) and injected. In Bearer mode the request is relayed as-is and
/// the secret store is never consulted.
pub async fn proxy_registry_request(
    State(state): State<AppState>,
    Extension(auth): Extension<RegistryAuth>,
    req: Request,
) -> Result<Response, ProxyError> {
    let endpoint = RegistryEndpoint::from_path(req.uri().path())
        .ok_or_else(|| ProxyError::UnknownEndpoint(req.uri().path().to_string()))?;
    let sub_path = endpoint.upstream_path();
    let meta = RequestMeta::from_request(&req);

    tracing::info!(
        request_id = ?meta.request_id,
        uri = %meta.uri,
        auth_mode = meta.auth_mode.unwrap_or("none"),
        endpoint = endpoint.kind(),
        registry = %auth.registry_url(),
        "Proxying {} request",
        endpoint.kind()
    );

    let response = match &auth {
        RegistryAuth::Basic { locator, token } => {
            let credentials = state
                .resolver
                .resolve(token, &locator.secret_path)
                .await?;
            state
                .forwarder
                .forward_with_credentials(req, &locator.registry_url, &sub_path, &credentials)
                .await?
        }
        RegistryAuth::Bearer {
            authorization,
            registry_url,
        } => {
            state
                .forwarder
                .forward_bearer(req, registry_url, &sub_path, authorization)
                .await?
        }
    };

    tracing::info!(
        request_id = ?meta.request_id,
        status = response.status().as_u16(),
        "Proxied {} request",
        endpoint.kind()
    );
    Ok(response)
}

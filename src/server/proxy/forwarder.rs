use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use std::time::Duration;

use crate::server::error::ProxyError;
use crate::server::registry::{Credentials, SecretToken};
use crate::server::settings::UpstreamSettings;

/// Connection-scoped headers that must not be relayed by a proxy
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name) || name.as_str() == "keep-alive"
}

/// How the outbound request authenticates against the upstream registry
#[derive(Debug, Clone, Copy)]
pub enum UpstreamAuth<'a> {
    /// Replace the client's Authorization header with real credentials
    Inject(&'a Credentials),
    /// Relay the client's bearer `Authorization` value byte for byte
    PassThrough(&'a SecretToken),
}

/// Build `https://<host>/v2<sub_path>[?<query>]`, keeping an explicit scheme
pub fn target_url(registry_url: &str, sub_path: &str, query: Option<&str>) -> String {
    let registry_url = registry_url.trim_end_matches('/');
    let base = if registry_url.starts_with("http://") || registry_url.starts_with("https://") {
        registry_url.to_string()
    } else {
        format!("https://{}", registry_url)
    };

    let mut url = format!("{}/v2{}", base, sub_path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Copy client headers for the upstream request according to the auth mode
pub fn outbound_headers(
    inbound: &HeaderMap,
    auth: UpstreamAuth<'_>,
) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if is_hop_by_hop(name) {
            continue;
        }
        if name == header::AUTHORIZATION {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let authorization = match auth {
        UpstreamAuth::Inject(credentials) => credentials.basic_auth_header(),
        UpstreamAuth::PassThrough(authorization) => authorization.as_str().to_string(),
    };
    let mut value = HeaderValue::from_str(&authorization).map_err(|e| ProxyError::Forward {
        message: "credentials cannot be sent as a header".to_string(),
        detail: e.to_string(),
    })?;
    value.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, value);

    Ok(headers)
}

/// Replays registry requests against the real upstream and streams the answer back
pub struct RequestForwarder {
    http_client: reqwest::Client,
}

impl RequestForwarder {
    pub fn new(settings: &UpstreamSettings) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs));
        if let Some(timeout) = settings.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        Ok(Self {
            http_client: builder.build()?,
        })
    }

    /// Forward with real credentials replacing the client's Authorization
    pub async fn forward_with_credentials(
        &self,
        req: Request,
        registry_url: &str,
        sub_path: &str,
        credentials: &Credentials,
    ) -> Result<Response, ProxyError> {
        self.forward(req, registry_url, sub_path, UpstreamAuth::Inject(credentials))
            .await
    }

    /// Forward the client's bearer token unchanged
    pub async fn forward_bearer(
        &self,
        req: Request,
        registry_url: &str,
        sub_path: &str,
        authorization: &SecretToken,
    ) -> Result<Response, ProxyError> {
        self.forward(req, registry_url, sub_path, UpstreamAuth::PassThrough(authorization))
            .await
    }

    /// Issue the upstream request once (no retries) and relay status, headers
    /// and a streamed body.
    pub async fn forward(
        &self,
        req: Request,
        registry_url: &str,
        sub_path: &str,
        auth: UpstreamAuth<'_>,
    ) -> Result<Response, ProxyError> {
        let url = target_url(registry_url, sub_path, req.uri().query());
        let (parts, body) = req.into_parts();
        let headers = outbound_headers(&parts.headers, auth)?;

        let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
            || parts.headers.contains_key(header::TRANSFER_ENCODING);

        tracing::debug!("Forwarding {} {}", parts.method, url);

        let mut upstream_req = self
            .http_client
            .request(parts.method.clone(), &url)
            .headers(headers);
        if has_body {
            upstream_req =
                upstream_req.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream_resp = upstream_req.send().await.map_err(|e| {
            tracing::warn!("Upstream request to {} failed: {}", url, e);
            ProxyError::forward(e)
        })?;

        tracing::debug!(
            "Upstream {} {} answered {}",
            parts.method,
            url,
            upstream_resp.status()
        );

        let mut response = Response::builder().status(upstream_resp.status());
        if let Some(response_headers) = response.headers_mut() {
            for (name, value) in upstream_resp.headers() {
                if !is_hop_by_hop(name) {
                    response_headers.append(name.clone(), value.clone());
                }
            }
        }

        response
            .body(Body::from_stream(upstream_resp.bytes_stream()))
            .map_err(|e| ProxyError::Forward {
                message: "invalid upstream response".to_string(),
                detail: e.to_string(),
            })
    }
}

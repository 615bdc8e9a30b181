use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::server::auth::challenge::{API_VERSION, API_VERSION_HEADER};
use crate::server::registry::LocatorError;
use crate::server::secret_store::SecretStoreError;

/// Every failure the proxy reports to a registry client.
///
/// Status codes and registry error codes come from one table
/// ([`ProxyError::status`] / [`ProxyError::code`]) no matter whether the error
/// was raised by the auth middleware, the resolver or the forwarder.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No usable credentials; carries the `WWW-Authenticate` challenge
    #[error("authentication required")]
    MissingAuth { challenge: String },

    #[error("invalid username format: {0}")]
    InvalidLocator(#[from] LocatorError),

    #[error("failed to retrieve credentials: {0}")]
    SecretStore(#[from] SecretStoreError),

    /// Transport failure talking to the upstream registry
    #[error("failed to forward request: {detail}")]
    Forward { message: String, detail: String },

    #[error("unsupported registry endpoint: {0}")]
    UnknownEndpoint(String),
}

/// Registry API error body: `{"errors":[{"code":..,"message":..}]}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl ProxyError {
    /// Build a forwarding error, keeping the transport text for logs only
    pub fn forward(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "upstream registry timed out"
        } else if err.is_connect() {
            "could not connect to upstream registry"
        } else {
            "upstream registry request failed"
        };
        Self::Forward {
            message: message.to_string(),
            detail: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingAuth { .. } | ProxyError::InvalidLocator(_) => {
                StatusCode::UNAUTHORIZED
            }
            ProxyError::SecretStore(SecretStoreError::NotFound(_))
            | ProxyError::SecretStore(SecretStoreError::InvalidToken) => StatusCode::UNAUTHORIZED,
            ProxyError::SecretStore(SecretStoreError::Connection(_))
            | ProxyError::SecretStore(SecretStoreError::MalformedSecret { .. })
            | ProxyError::Forward { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::MissingAuth { .. }
            | ProxyError::InvalidLocator(_)
            | ProxyError::SecretStore(SecretStoreError::NotFound(_))
            | ProxyError::SecretStore(SecretStoreError::InvalidToken) => "UNAUTHORIZED",
            ProxyError::SecretStore(SecretStoreError::Connection(_))
            | ProxyError::Forward { .. } => "UNAVAILABLE",
            ProxyError::SecretStore(SecretStoreError::MalformedSecret { .. }) => "UNKNOWN",
            ProxyError::UnknownEndpoint(_) => "UNSUPPORTED",
        }
    }

    /// Message returned to the client
    pub fn client_message(&self) -> String {
        match self {
            ProxyError::Forward { message, .. } => format!("failed to forward request: {}", message),
            ProxyError::SecretStore(SecretStoreError::Connection(_)) => {
                "failed to retrieve credentials: secret store unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                code = self.code(),
                error = %self,
                "Registry proxy error"
            );
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = Json(ErrorResponse {
            errors: vec![ErrorDetail {
                code: self.code(),
                message: self.client_message(),
            }],
        });

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));

        if let ProxyError::MissingAuth { challenge } = &self {
            match HeaderValue::from_str(challenge) {
                Ok(value) => {
                    headers.insert(header::WWW_AUTHENTICATE, value);
                }
                Err(e) => tracing::warn!("Challenge is not a valid header value: {}", e),
            }
        }

        response
    }
}

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};

use crate::server::auth::cookie_helpers;
use crate::server::error::ProxyError;
use crate::server::registry::{RegistryAuth, RegistryLocator, SecretToken};
use crate::server::settings::AuthSettings;
use crate::server::state::AppState;

/// Extract the token from a `Bearer <token>` Authorization value
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Decode a `Basic base64(username:password)` Authorization value.
///
/// Splits on the last colon: the username is a locator whose registry URL may
/// carry a scheme or port, the password is a secret-store token without colons.
fn decode_basic_auth(auth_header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = auth_header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.rsplit_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Resolve the upstream host for a bearer request: override header, then
/// cookie, then the configured default
fn resolve_bearer_registry(headers: &HeaderMap, settings: &AuthSettings) -> String {
    headers
        .get(settings.registry_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| cookie_helpers::extract_cookie(headers, &settings.registry_cookie))
        .unwrap_or_else(|| settings.default_registry.clone())
}

/// Decide how a request authenticates.
///
/// Returns the per-request auth context, or the error to answer with:
/// - no `Authorization` header (or an unusable one) → challenge
/// - `Bearer <token>` → pass-through, no secret-store access
/// - Basic auth whose username is not a valid locator → 401
pub fn select_auth_mode(
    headers: &HeaderMap,
    settings: &AuthSettings,
    challenge: impl FnOnce() -> String,
) -> Result<RegistryAuth, ProxyError> {
    let missing = |challenge: String| ProxyError::MissingAuth { challenge };

    let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        tracing::debug!("Auth middleware: no Authorization header, issuing challenge");
        return Err(missing(challenge()));
    };

    if let Some(token) = extract_bearer_token(auth_header) {
        if token.trim().is_empty() {
            return Err(missing(challenge()));
        }

        let registry_url = resolve_bearer_registry(headers, settings);
        tracing::debug!(
            "Auth middleware: bearer pass-through to registry {}",
            registry_url
        );
        return Ok(RegistryAuth::Bearer {
            authorization: SecretToken::new(auth_header),
            registry_url,
        });
    }

    let Some((username, password)) = decode_basic_auth(auth_header) else {
        tracing::debug!("Auth middleware: undecodable Authorization header, issuing challenge");
        return Err(missing(challenge()));
    };

    let locator = RegistryLocator::parse(&username).map_err(|e| {
        tracing::warn!("Auth middleware: rejected username: {}", e);
        ProxyError::InvalidLocator(e)
    })?;

    let token = SecretToken::new(password);
    if token.is_empty() {
        return Err(missing(challenge()));
    }

    tracing::debug!(
        registry = %locator.registry_url,
        secret_path = %locator.secret_path,
        "Auth middleware: credential injection"
    );
    Ok(RegistryAuth::Basic { locator, token })
}

/// Registry authentication middleware
///
/// Runs on every registry route except the version probe and inserts the
/// resulting [`RegistryAuth`] into request extensions for the handlers.
pub async fn registry_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    let auth = select_auth_mode(req.headers(), &state.auth_settings, || {
        state.challenge.challenge(req.method(), req.uri().path())
    })?;

    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

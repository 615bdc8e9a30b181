use base64::{engine::general_purpose, Engine as _};
use std::fmt;

use super::locator::RegistryLocator;

/// Real upstream registry credentials, as resolved from the secret store.
///
/// Fields are private so a resolved value cannot be mutated after construction.
/// The `Debug` impl never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    email: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        email: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            email: email.unwrap_or_default(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Email attached to the secret, empty when the record carries none
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Both username and password must be present for injection to make sense
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// `Authorization` header value for the Basic scheme (`base64(user:pass)`)
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", general_purpose::STANDARD.encode(raw))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Secret-store authentication token presented as the Basic-auth password
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(<redacted>)")
    }
}

/// Per-request authentication context, produced by the auth middleware and
/// consumed by the registry handlers through request extensions.
#[derive(Debug, Clone)]
pub enum RegistryAuth {
    /// Credential injection: the username was a locator, the password a secret-store token
    Basic {
        locator: RegistryLocator,
        token: SecretToken,
    },
    /// Bearer pass-through: the original header is forwarded untouched
    Bearer {
        /// Full `Authorization` header value as presented by the client
        authorization: SecretToken,
        registry_url: String,
    },
}

impl RegistryAuth {
    pub fn mode(&self) -> &'static str {
        match self {
            RegistryAuth::Basic { .. } => "basic",
            RegistryAuth::Bearer { .. } => "bearer",
        }
    }

    /// Upstream registry host this request targets
    pub fn registry_url(&self) -> &str {
        match self {
            RegistryAuth::Basic { locator, .. } => &locator.registry_url,
            RegistryAuth::Bearer { registry_url, .. } => registry_url,
        }
    }
}

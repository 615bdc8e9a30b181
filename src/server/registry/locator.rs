use std::fmt;
use std::str::FromStr;

/// Errors produced while parsing a `<registry_type>;<secret_path>;<registry_url>` locator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    #[error("expected <registry_type>;<secret_path>;<registry_url>")]
    InvalidFormat,

    #[error("unsupported registry type '{0}'")]
    UnsupportedRegistryType(String),
}

/// Registry flavours accepted in the locator's first segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryType {
    Docker,
    Ecr,
    Gcr,
}

impl RegistryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryType::Docker => "docker",
            RegistryType::Ecr => "ecr",
            RegistryType::Gcr => "gcr",
        }
    }
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryType {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(RegistryType::Docker),
            "ecr" => Ok(RegistryType::Ecr),
            "gcr" => Ok(RegistryType::Gcr),
            other => Err(LocatorError::UnsupportedRegistryType(other.to_string())),
        }
    }
}

/// Which secret to fetch and which upstream registry to talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLocator {
    pub registry_type: RegistryType,
    pub secret_path: String,
    pub registry_url: String,
}

impl RegistryLocator {
    /// Parse a locator carried in the Basic-auth username.
    ///
    /// The split is bounded to three parts, so the registry URL segment may
    /// itself contain `;`. Each part is trimmed and must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let parts: Vec<&str> = raw.splitn(3, ';').map(str::trim).collect();

        let [registry_type, secret_path, registry_url] = parts.as_slice() else {
            return Err(LocatorError::InvalidFormat);
        };

        if registry_type.is_empty() || secret_path.is_empty() || registry_url.is_empty() {
            return Err(LocatorError::InvalidFormat);
        }

        Ok(Self {
            registry_type: registry_type.parse()?,
            secret_path: secret_path.to_string(),
            registry_url: registry_url.to_string(),
        })
    }
}

impl FromStr for RegistryLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RegistryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{}",
            self.registry_type, self.secret_path, self.registry_url
        )
    }
}

pub mod cache;
pub mod locator;
pub mod models;
pub mod resolver;

pub use cache::CredentialCache;
pub use locator::{LocatorError, RegistryLocator, RegistryType};
pub use models::{Credentials, RegistryAuth, SecretToken};
pub use resolver::CredentialResolver;

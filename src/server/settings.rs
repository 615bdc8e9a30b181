use config::{Config, ConfigError};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub secret_store: SecretStoreSettings,
    pub auth: AuthSettings,
    pub cache: CacheSettings,
    pub upstream: UpstreamSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Vault KV v2 secret store the registry secrets live in
#[derive(Debug, Deserialize, Clone)]
pub struct SecretStoreSettings {
    /// Vault server address, e.g. "http://localhost:8200"
    pub address: String,
    /// KV v2 engine mount path (default: "secret")
    pub mount: String,
    /// Timeout for one secret read, connect included
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    /// Token realm advertised in `WWW-Authenticate` challenges
    pub realm: String,
    /// Service advertised in `WWW-Authenticate` challenges
    pub service: String,
    /// Upstream host for bearer requests that name none
    pub default_registry: String,
    /// Request header that overrides the upstream host for bearer requests
    pub registry_header: String,
    /// Cookie consulted when the override header is absent
    pub registry_cookie: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    /// Lifetime of cached credentials in seconds (default: 300)
    pub ttl_secs: u64,
    /// Interval of the expired-entry sweep in seconds (default: 600)
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub connect_timeout_secs: u64,
    /// Total request timeout; unset means blobs may stream for as long as they take
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_VAULT_ADDR: &str = "http://localhost:8200";
pub const DEFAULT_REALM: &str = "https://auth.docker.io/token";
pub const DEFAULT_SERVICE: &str = "registry.docker.io";
pub const DEFAULT_REGISTRY: &str = "registry-1.docker.io";

impl Settings {
    /// Substitute environment variables in a string value
    /// Replaces ${VAR_NAME} or ${VAR_NAME:-default} with environment variable values
    fn substitute_env_vars_in_string(s: &str) -> String {
        let re = match regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}") {
            Ok(re) => re,
            Err(_) => return s.to_string(),
        };

        re.replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => default_value.unwrap_or("").to_string(),
            }
        })
        .to_string()
    }

    /// Convert a config::Value to a serde_json::Value, performing environment variable substitution
    fn config_value_to_json(value: &config::Value) -> serde_json::Value {
        use config::ValueKind;

        match &value.kind {
            ValueKind::Nil => serde_json::Value::Null,
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
            ValueKind::I128(i) => serde_json::Value::Number((*i as i64).into()),
            ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
            ValueKind::U128(u) => serde_json::Value::Number((*u as u64).into()),
            ValueKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::String(s) => {
                // Perform environment variable substitution
                serde_json::Value::String(Self::substitute_env_vars_in_string(s))
            }
            ValueKind::Table(table) => {
                let mut map = serde_json::Map::new();
                for (k, v) in table.iter() {
                    map.insert(k.clone(), Self::config_value_to_json(v));
                }
                serde_json::Value::Object(map)
            }
            ValueKind::Array(arr) => {
                let vec: Vec<serde_json::Value> =
                    arr.iter().map(Self::config_value_to_json).collect();
                serde_json::Value::Array(vec)
            }
        }
    }

    /// Try to add a config file with multiple extension attempts (.toml, .yaml, .yml)
    /// Returns true if a file was loaded
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
    ) -> bool {
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{}/{}.{}", config_dir, name, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading config file: {}", path);
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{}/{}", config_dir, name)));
                return true;
            }
        }

        tracing::debug!(
            "Optional config file not found: {}/{}.{{toml,yaml,yml}}",
            config_dir,
            name
        );
        false
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", DEFAULT_PORT as i64)?
            .set_default("secret_store.address", DEFAULT_VAULT_ADDR)?
            .set_default("secret_store.mount", "secret")?
            .set_default("secret_store.timeout_secs", 10)?
            .set_default("auth.realm", DEFAULT_REALM)?
            .set_default("auth.service", DEFAULT_SERVICE)?
            .set_default("auth.default_registry", DEFAULT_REGISTRY)?
            .set_default("auth.registry_header", "X-Registry-URL")?
            .set_default("auth.registry_cookie", "registry-url")?
            .set_default("cache.ttl_secs", 300)?
            .set_default("cache.sweep_interval_secs", 600)?
            .set_default("upstream.connect_timeout_secs", 30)
    }

    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("PROXY_CONFIG_RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("PROXY_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let mut builder = Self::defaults()?;

        // Config files are all optional; TOML takes precedence over YAML
        Self::try_add_config_file(&mut builder, &config_dir, "default");
        Self::try_add_config_file(&mut builder, &config_dir, &run_mode);
        Self::try_add_config_file(&mut builder, &config_dir, "local");

        let config = builder.build()?;

        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("Failed to get config table: {}", e)))?;

        let mut json_map = serde_json::Map::new();
        for (k, v) in root_value.iter() {
            json_map.insert(k.clone(), Self::config_value_to_json(v));
        }
        let json_value = serde_json::Value::Object(json_map);

        // Deserialize from JSON value and collect unused fields
        let mut unused_fields = Vec::new();
        let mut settings: Settings = serde_ignored::deserialize(json_value, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            tracing::warn!("Unknown configuration field in proxy config: {}", field);
        }

        // PORT and VAULT_ADDR are the conventional deployment knobs and win over files
        if let Ok(port) = env::var("PORT") {
            if !port.is_empty() {
                settings.server.port = port.parse().map_err(|_| {
                    ConfigError::Message(format!("PORT must be a valid port number, got '{}'", port))
                })?;
            }
        }
        if let Ok(vault_addr) = env::var("VAULT_ADDR") {
            if !vault_addr.is_empty() {
                settings.secret_store.address = vault_addr;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("server.port must be non-zero".into()));
        }
        if self.secret_store.address.is_empty() {
            return Err(ConfigError::Message(
                "Secret store address not configured. Set VAULT_ADDR or [secret_store] address"
                    .into(),
            ));
        }
        if self.auth.default_registry.is_empty() {
            return Err(ConfigError::Message(
                "auth.default_registry must not be empty".into(),
            ));
        }
        if self.cache.ttl_secs == 0 || self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "cache.ttl_secs and cache.sweep_interval_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

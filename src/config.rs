//! Connection configuration and precedence resolution.
//!
//! Effective options are merged from three layers, highest first:
//!
//! 1. environment overrides (`REDIS_HOST`, `REDIS_PORT`, the password variable)
//! 2. the configured [`StoreOptions`]
//! 3. library defaults (empty options)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use urlencoding::encode;

/// Environment variable whose value overrides the configured host.
pub const HOST_ENV_NAME: &str = "REDIS_HOST";

/// Environment variable whose value overrides the configured port.
pub const PORT_ENV_NAME: &str = "REDIS_PORT";

/// Default name of the variable carrying the store password.
pub const DEFAULT_PASSWORD_ENV_NAME: &str = "REDIS_PASSWORD";

/// Host used in connection URLs when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used in connection URLs when none is configured.
pub const DEFAULT_PORT: u16 = 6379;

/// Connection parameters handed to the store client.
///
/// Unknown keys are kept in `extra` and passed through untouched.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<i64>,
    pub tls: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoreOptions {
    /// Options pointing at `host:port`.
    pub fn with_endpoint(host: impl Into<String>, port: u16) -> Self {
        StoreOptions {
            host: Some(host.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    pub fn effective_host(&self) -> &str {
        self.host
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// `host:port` the client will connect to.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.effective_host(), self.effective_port())
    }

    /// Render the options as a `redis://` (or `rediss://`) connection URL.
    ///
    /// Credentials are percent-encoded. Scalar `extra` entries become query
    /// parameters; nested values have no URL form and are skipped.
    pub fn connection_url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let mut url = format!("{}://", scheme);

        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                url.push_str(&format!("{}:{}@", encode(user), encode(pass)))
            }
            (Some(user), None) => url.push_str(&format!("{}@", encode(user))),
            (None, Some(pass)) => url.push_str(&format!(":{}@", encode(pass))),
            (None, None) => {}
        }

        let host = self.effective_host();
        if host.contains(':') && !host.starts_with('[') {
            url.push_str(&format!("[{}]", host));
        } else {
            url.push_str(host);
        }
        url.push_str(&format!(":{}", self.effective_port()));

        if let Some(db) = self.db {
            url.push_str(&format!("/{}", db));
        }

        let query: Vec<String> = self
            .extra
            .iter()
            .filter_map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some(format!("{}={}", encode(key), encode(&rendered)))
            })
            .collect();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }

        url
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("tls", &self.tls)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Provider configuration as injected by the host.
///
/// The serialized form uses the host's constant names:
///
/// ```
/// use store_provider::config::ProviderConfig;
///
/// let config = ProviderConfig::from_json_str(
///     r#"{
///         "REDIS": { "host": "localhost", "port": 6379 },
///         "REDIS_PASSWORD_ENV_NAME": "CACHE_SECRET"
///     }"#,
/// ).unwrap();
/// assert_eq!(config.password_env_name(), "CACHE_SECRET");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "REDIS", default)]
    pub store_options: StoreOptions,
    #[serde(
        rename = "REDIS_PASSWORD_ENV_NAME",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub password_env_name: Option<String>,
}

impl ProviderConfig {
    pub fn new(store_options: StoreOptions) -> Self {
        ProviderConfig {
            store_options,
            password_env_name: None,
        }
    }

    /// Read the password from `name` instead of `REDIS_PASSWORD`.
    pub fn with_password_env_name(mut self, name: impl Into<String>) -> Self {
        self.password_env_name = Some(name.into());
        self
    }

    pub fn password_env_name(&self) -> &str {
        self.password_env_name
            .as_deref()
            .unwrap_or(DEFAULT_PASSWORD_ENV_NAME)
    }

    /// Decode a configuration object from JSON.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if the payload is malformed
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Snapshot of environment variables.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment.
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs.into_iter().collect()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Value of `name`, treating an empty string as unset.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Environment {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may hold secrets.
        let mut names: Vec<&String> = self.vars.keys().collect();
        names.sort();
        f.debug_struct("Environment").field("names", &names).finish()
    }
}

/// Merge configuration and environment into the options passed to the client.
///
/// # Errors
/// Returns `Error::ConfigError` if `REDIS_PORT` is set but is not a valid port
pub fn resolve_options(config: &ProviderConfig, env: &Environment) -> Result<StoreOptions> {
    let mut options = config.store_options.clone();

    if let Some(host) = env.non_empty(HOST_ENV_NAME) {
        options.host = Some(host.to_string());
    }

    if let Some(raw) = env.non_empty(PORT_ENV_NAME) {
        options.port = Some(parse_port(raw)?);
    }

    let password_env_name = config.password_env_name();
    if let Some(password) = env.non_empty(password_env_name) {
        debug!("Using store password from {}", password_env_name);
        options.password = Some(password.to_string());
    }

    Ok(options)
}

/// Strictly parse a TCP port from environment text.
///
/// # Errors
/// Returns `Error::ConfigError` unless `raw` is an integer in `1..=65535`
pub fn parse_port(raw: &str) -> Result<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(Error::ConfigError(format!(
            "Invalid {} value {:?}: expected an integer between 1 and 65535",
            PORT_ENV_NAME, raw
        ))),
        Ok(port) => Ok(port),
    }
}

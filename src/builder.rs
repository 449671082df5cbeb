//! Builder pattern for provider initialization.

use crate::backend::StoreClient;
use crate::config::{Environment, ProviderConfig, StoreOptions};
use crate::error::Result;
use crate::logger::{LogCrateSink, LogSink};
use crate::provider::{initialize, Provider};
use std::sync::Arc;

/// Fluent builder for [`Provider`]s.
///
/// Defaults: empty store options, the process environment, and a logger that
/// forwards to the `log` crate.
///
/// # Example
///
/// ```ignore
/// use store_provider::backend::RedisClient;
///
/// let provider = ProviderBuilder::new()
///     .with_store_options(StoreOptions::with_endpoint("localhost", 6379))
///     .with_password_env_name("CACHE_SECRET")
///     .initialize::<RedisClient>()
///     .await?;
/// ```
pub struct ProviderBuilder {
    config: ProviderConfig,
    env: Option<Environment>,
    logger: Arc<dyn LogSink>,
}

impl Default for ProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ProviderConfig::default(),
            env: None,
            logger: Arc::new(LogCrateSink),
        }
    }

    /// Replace the whole configuration object.
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the store options, keeping the password variable name.
    pub fn with_store_options(mut self, options: StoreOptions) -> Self {
        self.config.store_options = options;
        self
    }

    /// Read the password from `name` instead of `REDIS_PASSWORD`.
    pub fn with_password_env_name(mut self, name: impl Into<String>) -> Self {
        self.config.password_env_name = Some(name.into());
        self
    }

    /// Use `env` instead of the process environment.
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    /// Route lifecycle log lines to `logger`.
    pub fn with_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = logger;
        self
    }

    /// Build the provider.
    ///
    /// The process environment is captured here, not when the builder was
    /// created.
    ///
    /// # Errors
    ///
    /// Same as [`initialize`]: `Error::ConfigError` for a malformed port,
    /// `Error::ConnectionError` if the client rejects the options.
    pub async fn initialize<C: StoreClient>(self) -> Result<Provider<C>> {
        let env = self.env.unwrap_or_else(Environment::from_process);
        initialize::<C>(&self.config, &env, self.logger).await
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::backend::InMemoryClient;
    use crate::logger::{LogLevel, MemorySink};

    #[tokio::test]
    async fn test_builder_basic() {
        let sink = Arc::new(MemorySink::new());

        let provider = ProviderBuilder::new()
            .with_store_options(StoreOptions::with_endpoint("localhost", 6379))
            .with_environment(Environment::new())
            .with_logger(sink.clone())
            .initialize::<InMemoryClient>()
            .await
            .expect("Failed to initialize");

        assert_eq!(provider.service().options().endpoint(), "localhost:6379");
        assert_eq!(sink.lines()[0].0, LogLevel::Warning);
        provider.dispose().await;
    }

    #[tokio::test]
    async fn test_builder_password_env_name() {
        let provider = ProviderBuilder::new()
            .with_password_env_name("CACHE_SECRET")
            .with_environment(Environment::new().with("CACHE_SECRET", "hunter2"))
            .with_logger(Arc::new(MemorySink::new()))
            .initialize::<InMemoryClient>()
            .await
            .expect("Failed to initialize");

        assert_eq!(
            provider.service().options().password.as_deref(),
            Some("hunter2")
        );
    }

    #[tokio::test]
    async fn test_builder_config_replaces_options() {
        let config = ProviderConfig::new(StoreOptions::with_endpoint("cache.internal", 7000))
            .with_password_env_name("OTHER");

        let provider = ProviderBuilder::new()
            .with_config(config)
            .with_environment(Environment::new().with("REDIS_PORT", "7001"))
            .with_logger(Arc::new(MemorySink::new()))
            .initialize::<InMemoryClient>()
            .await
            .expect("Failed to initialize");

        assert_eq!(provider.service().options().endpoint(), "cache.internal:7001");
    }

    #[tokio::test]
    async fn test_builder_propagates_config_error() {
        let result = ProviderBuilder::new()
            .with_environment(Environment::new().with("REDIS_PORT", "six"))
            .with_logger(Arc::new(MemorySink::new()))
            .initialize::<InMemoryClient>()
            .await;

        assert!(matches!(result, Err(crate::Error::ConfigError(_))));
    }
}

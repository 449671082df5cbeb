//! # store-provider
//!
//! A managed connection provider for remote key-value stores.
//!
//! `initialize` builds a store client from configuration and environment,
//! watches it for fatal transport errors, and hands back a [`Provider`]: the
//! live client, a one-shot [`FatalErrorSignal`], and a graceful `dispose`.
//!
//! ## Features
//!
//! - **Configuration precedence:** `REDIS_HOST` / `REDIS_PORT` / password
//!   variable override the configured options
//! - **Fail fast:** malformed ports and rejected options fail initialization
//! - **Fatal error signal:** the first transport failure resolves a shared
//!   signal exactly once; later failures are ignored
//! - **Graceful shutdown:** `dispose` logs and waits for the session to end
//! - **Backend Agnostic:** Redis (feature `redis`) or in-memory (default)
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use store_provider::{initialize, Environment, ProviderConfig, StoreClient};
//! use store_provider::backend::RedisClient;
//! use store_provider::config::StoreOptions;
//! use store_provider::logger::LogCrateSink;
//!
//! let config = ProviderConfig::new(StoreOptions::with_endpoint("localhost", 6379));
//! let env = Environment::from_process();
//! let provider = initialize::<RedisClient>(&config, &env, Arc::new(LogCrateSink)).await?;
//!
//! // Hand the signal to the supervisor
//! let fatal = provider.fatal_error();
//! tokio::spawn(async move {
//!     let err = fatal.await;
//!     eprintln!("store failed: {}", err.trace());
//! });
//!
//! provider.service().set("my_key", b"value".to_vec(), None).await?;
//! let value = provider.service().get("my_key").await?;
//!
//! provider.dispose().await;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod builder;
pub mod config;
pub mod error;
pub mod logger;
pub mod provider;
pub mod signal;

// Re-exports for convenience
pub use backend::StoreClient;
pub use builder::ProviderBuilder;
pub use config::{Environment, ProviderConfig, StoreOptions};
pub use error::{Error, FatalError, Result};
pub use logger::{LogLevel, LogSink};
pub use provider::{initialize, DisposeAction, Provider, ProviderState};
pub use signal::FatalErrorSignal;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

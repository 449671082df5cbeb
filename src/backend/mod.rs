//! Store client implementations.
//!
//! A [`StoreClient`] is the handle the provider hands out. The provider only
//! needs three things from it: construction from merged [`StoreOptions`], a
//! way to observe transport errors, and a graceful `quit`. The command methods
//! are the subset of the store's API the provider's callers rely on.

#[cfg(feature = "inmemory")]
mod inmemory;
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryClient;
#[cfg(feature = "redis")]
pub use self::redis::RedisClient;

use crate::config::StoreOptions;
use crate::error::{Result, TransportError};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Callback invoked with every transport error a client reports.
pub type ErrorObserver = Arc<dyn Fn(TransportError) + Send + Sync>;

/// Client for a remote key-value store.
///
/// Clones share the same underlying session.
#[allow(async_fn_in_trait)]
pub trait StoreClient: Send + Sync + Clone + 'static {
    /// Build a client from merged options.
    ///
    /// Construction does not wait for the network handshake.
    ///
    /// # Errors
    /// Returns `Error::ConnectionError` if the client rejects the options
    fn connect(options: StoreOptions) -> Result<Self>;

    /// Options this client was built from.
    fn options(&self) -> &StoreOptions;

    /// Register an observer for transport errors.
    ///
    /// Observers are called for every error, in registration order.
    fn on_error(&self, observer: ErrorObserver);

    /// Open the session ahead of the first command.
    ///
    /// The provider spawns this right after installing its observer, so a
    /// store that cannot be reached is reported without waiting for traffic.
    /// Failures must also be emitted to observers. Clients without a session
    /// to open keep the default, which is immediately ready.
    fn warm_up(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        std::future::ready(Ok(()))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Delete `key`. Returns `true` if it existed.
    async fn del(&self, key: &str) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Batch get, preserving input order.
    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Round trip to the store.
    async fn ping(&self) -> Result<()>;

    /// End the session gracefully, waiting for the store's acknowledgement.
    async fn quit(&self) -> Result<()>;
}

/// Fan-out of transport errors to registered observers.
#[derive(Clone, Default)]
pub(crate) struct ErrorHub {
    observers: Arc<Mutex<Vec<ErrorObserver>>>,
}

impl ErrorHub {
    pub(crate) fn subscribe(&self, observer: ErrorObserver) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn emit(&self, err: TransportError) {
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if observers.is_empty() {
            warn!("Transport error with no observer installed: {}", err);
        }
        for observer in observers {
            observer(Arc::clone(&err));
        }
    }
}

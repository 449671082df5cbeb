//! In-process store client.
//!
//! Behaves like a single store session: commands fail once the session has
//! been quit, keys honor TTLs, and transport failures can be injected with
//! [`InMemoryClient::inject_transport_error`] to exercise fatal-error paths.

use super::{ErrorHub, ErrorObserver, StoreClient};
use crate::config::StoreOptions;
use crate::error::{Error, Result, TransportError};
use dashmap::DashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// DashMap-backed [`StoreClient`].
///
/// # Example
///
/// ```
/// # use store_provider::backend::{InMemoryClient, StoreClient};
/// # use store_provider::config::StoreOptions;
/// # async fn example() -> store_provider::Result<()> {
/// let client = InMemoryClient::connect(StoreOptions::with_endpoint("localhost", 6379))?;
/// client.set("key", b"value".to_vec(), None).await?;
/// assert_eq!(client.get("key").await?, Some(b"value".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryClient {
    options: StoreOptions,
    store: Arc<DashMap<String, Entry>>,
    errors: ErrorHub,
    closed: Arc<AtomicBool>,
}

impl InMemoryClient {
    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.store.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Report a transport failure to every installed observer.
    pub fn inject_transport_error(&self, message: &str) {
        let err: TransportError = Arc::new(io::Error::new(
            io::ErrorKind::ConnectionReset,
            message.to_string(),
        ));
        warn!("⚠ In-memory transport error injected: {}", message);
        self.errors.emit(err);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::BackendError("Connection is closed".to_string()));
        }
        Ok(())
    }
}

impl StoreClient for InMemoryClient {
    fn connect(options: StoreOptions) -> Result<Self> {
        if options.host.as_deref() == Some("") {
            return Err(Error::ConnectionError("Host must not be empty".to_string()));
        }
        if options.port == Some(0) {
            return Err(Error::ConnectionError("Port 0 is not a valid target".to_string()));
        }

        debug!("✓ In-memory client created for {}", options.endpoint());

        Ok(InMemoryClient {
            options,
            store: Arc::new(DashMap::new()),
            errors: ErrorHub::default(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn on_error(&self, observer: ErrorObserver) {
        self.errors.subscribe(observer);
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let now = Instant::now();

        let value = match self.store.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        };

        if value.is_none() {
            self.store.remove_if(key, |_, entry| entry.is_expired(now));
            debug!("✓ In-memory GET {} -> MISS", key);
        } else {
            debug!("✓ In-memory GET {} -> HIT", key);
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.store
            .insert(key.to_string(), Entry { value, expires_at });
        debug!("✓ In-memory SET {}", key);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let now = Instant::now();
        let removed = self
            .store
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now));
        debug!("✓ In-memory DEL {}", key);
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn quit(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::BackendError("Connection is already closed".to_string()));
        }
        debug!("✓ In-memory session closed for {}", self.options.endpoint());
        Ok(())
    }
}

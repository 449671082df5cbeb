//! Redis store client.

use super::{ErrorHub, ErrorObserver, StoreClient};
use crate::config::StoreOptions;
use crate::error::{Error, Result};
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, RedisError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// `extra` keys the Redis URL parser understands.
const URL_OPTIONS: &[&str] = &["protocol"];

/// Redis client over a single multiplexed connection.
///
/// [`StoreClient::connect`] never touches the network; the connection is
/// opened by [`StoreClient::warm_up`] or the first command. Connection
/// failures and dropped sessions are reported to error observers in addition
/// to failing the command that hit them. A dropped connection is discarded,
/// so the next command opens a fresh one.
///
/// `extra` options are rendered into the connection URL, but the Redis URL
/// parser only reads `protocol`. Other keys are logged at warn level by
/// `connect` and otherwise ignored.
///
/// # Example
///
/// ```no_run
/// # use store_provider::backend::{RedisClient, StoreClient};
/// # use store_provider::config::StoreOptions;
/// # async fn example() -> store_provider::Result<()> {
/// let client = RedisClient::connect(StoreOptions::with_endpoint("localhost", 6379))?;
/// client.set("key", b"value".to_vec(), None).await?;
/// let value = client.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisClient {
    options: StoreOptions,
    client: Client,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
    errors: ErrorHub,
    closed: Arc<AtomicBool>,
}

impl RedisClient {
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::BackendError("Redis session is closed".to_string()));
        }
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => {
                info!("✓ Redis connection established to {}", self.options.endpoint());
                *slot = Some(conn.clone());
                Ok(conn)
            }
            Err(e) => {
                drop(slot);
                let message = format!(
                    "Redis connection to {} failed: {}",
                    self.options.endpoint(),
                    e
                );
                self.errors.emit(Arc::new(e));
                Err(Error::BackendError(message))
            }
        }
    }

    /// Map a command failure.
    ///
    /// Transport-level failures drop the cached connection and are forwarded
    /// to observers.
    async fn command_error(&self, command: &str, key: Option<&str>, e: RedisError) -> Error {
        let message = match key {
            Some(key) => format!("Redis {} failed for key {}: {}", command, key, e),
            None => format!("Redis {} failed: {}", command, e),
        };

        if e.is_unrecoverable_error() || e.is_io_error() || e.is_connection_dropped() {
            if self.connection.lock().await.take().is_some() {
                debug!("Redis connection to {} discarded", self.options.endpoint());
            }
            self.errors.emit(Arc::new(e));
        }

        Error::BackendError(message)
    }
}

fn ignored_options(options: &StoreOptions) -> Vec<&str> {
    options
        .extra
        .keys()
        .map(String::as_str)
        .filter(|key| !URL_OPTIONS.contains(key))
        .collect()
}

impl StoreClient for RedisClient {
    fn connect(options: StoreOptions) -> Result<Self> {
        let client = Client::open(options.connection_url().as_str()).map_err(|e| {
            Error::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let ignored = ignored_options(&options);
        if !ignored.is_empty() {
            warn!("⚠ Redis client ignores options: {}", ignored.join(", "));
        }

        debug!("✓ Redis client created for {}", options.endpoint());

        Ok(RedisClient {
            options,
            client,
            connection: Arc::new(Mutex::new(None)),
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

    fn warm_up(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let client = self.clone();
        async move { client.connection().await.map(|_| ()) }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = match conn.get(key).await {
            Ok(value) => value,
            Err(e) => return Err(self.command_error("GET", Some(key), e).await),
        };

        match &value {
            Some(_) => debug!("✓ Redis GET {} -> HIT", key),
            None => debug!("✓ Redis GET {} -> MISS", key),
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;

        match ttl {
            Some(d) => {
                let reply: ::redis::RedisResult<()> =
                    conn.set_ex(key, value, d.as_secs().max(1)).await;
                if let Err(e) = reply {
                    return Err(self.command_error("SETEX", Some(key), e).await);
                }
                debug!("✓ Redis SET {} (TTL: {:?})", key, d);
            }
            None => {
                let reply: ::redis::RedisResult<()> = conn.set(key, value).await;
                if let Err(e) = reply {
                    return Err(self.command_error("SET", Some(key), e).await);
                }
                debug!("✓ Redis SET {}", key);
            }
        }

        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;

        let removed: i64 = match conn.del(key).await {
            Ok(removed) => removed,
            Err(e) => return Err(self.command_error("DEL", Some(key), e).await),
        };

        debug!("✓ Redis DEL {}", key);
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;

        match conn.exists(key).await {
            Ok(found) => Ok(found),
            Err(e) => Err(self.command_error("EXISTS", Some(key), e).await),
        }
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;

        // MGET always replies with an array, even for a single key.
        let reply: ::redis::RedisResult<Vec<Option<Vec<u8>>>> =
            ::redis::cmd("MGET").arg(keys).query_async(&mut conn).await;
        let values = match reply {
            Ok(values) => values,
            Err(e) => return Err(self.command_error("MGET", None, e).await),
        };

        debug!("✓ Redis MGET {} keys", keys.len());
        Ok(values)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        let reply: ::redis::RedisResult<String> = ::redis::cmd("PING").query_async(&mut conn).await;
        match reply {
            Ok(_) => Ok(()),
            Err(e) => Err(self.command_error("PING", None, e).await),
        }
    }

    async fn quit(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::BackendError("Redis session is already closed".to_string()));
        }

        // Never connected, or the connection already dropped.
        let Some(mut conn) = self.connection.lock().await.take() else {
            debug!("✓ Redis session closed without an open connection");
            return Ok(());
        };

        let reply: ::redis::RedisResult<()> = ::redis::cmd("QUIT").query_async(&mut conn).await;
        match reply {
            Ok(()) => {}
            // The server may close the socket before the reply is read.
            Err(e) if e.is_connection_dropped() || e.is_io_error() => {}
            Err(e) => {
                return Err(Error::BackendError(format!("Redis QUIT failed: {}", e)));
            }
        }

        info!("✓ Redis session closed for {}", self.options.endpoint());
        Ok(())
    }
}

//! Connection provider: builds a store client and manages its lifecycle.

use crate::backend::StoreClient;
use crate::config::{resolve_options, Environment, ProviderConfig};
use crate::error::{Error, FatalError, Result, TransportError};
use crate::logger::{LogLevel, LogSink};
use crate::signal::{FatalErrorCell, FatalErrorSignal};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::Poll;

pub(crate) const INITIALIZED_MESSAGE: &str = "🏧 - Redis service initialized!";
pub(crate) const FATAL_ERROR_MESSAGE: &str = "💥 - Redis service error:";
pub(crate) const QUITTING_MESSAGE: &str = "🔌 - Quitting Redis server...";

/// Lifecycle state of a provider.
///
/// A provider exists only once [`initialize`] succeeds, so the first state it
/// reports is `Connecting` (until the client's session is open) or `Ready`.
/// `Faulted` does not imply `Closed`: a faulted provider must still be disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProviderState {
    Connecting = 0,
    Ready = 1,
    Faulted = 2,
    Disposing = 3,
    Closed = 4,
}

impl ProviderState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ProviderState::Connecting,
            1 => ProviderState::Ready,
            2 => ProviderState::Faulted,
            3 => ProviderState::Disposing,
            _ => ProviderState::Closed,
        }
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderState::Connecting => "connecting",
            ProviderState::Ready => "ready",
            ProviderState::Faulted => "faulted",
            ProviderState::Disposing => "disposing",
            ProviderState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        StateCell(Arc::new(AtomicU8::new(ProviderState::Connecting as u8)))
    }

    fn get(&self) -> ProviderState {
        ProviderState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ProviderState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move `from -> to`; returns `false` if the state was not `from`.
    fn transition(&self, from: ProviderState, to: ProviderState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Fault an open provider. Disposing or closed providers stay as they are.
    fn fault(&self) {
        let _ = self.transition(ProviderState::Connecting, ProviderState::Faulted)
            || self.transition(ProviderState::Ready, ProviderState::Faulted);
    }
}

/// Build a store client of type `C` from configuration and environment.
///
/// Returns as soon as the client exists and its error observer is installed.
/// The client's [`warm_up`](StoreClient::warm_up) runs in the background: the
/// provider moves to `Ready` when it succeeds, and a failure reaches the
/// fatal signal even if no command is ever issued.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use store_provider::{initialize, Environment, ProviderConfig, StoreClient};
/// # use store_provider::backend::InMemoryClient;
/// # use store_provider::config::StoreOptions;
/// # use store_provider::logger::LogCrateSink;
/// # async fn example() -> store_provider::Result<()> {
/// let config = ProviderConfig::new(StoreOptions::with_endpoint("localhost", 6379));
/// let env = Environment::new();
/// let provider = initialize::<InMemoryClient>(&config, &env, Arc::new(LogCrateSink)).await?;
///
/// provider.service().set("my_key", b"value".to_vec(), None).await?;
/// let value = provider.service().get("my_key").await?;
///
/// provider.dispose().await;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// - `Error::ConfigError`: `REDIS_PORT` is set but not a valid port
/// - `Error::ConnectionError`: the client rejected the merged options
///
/// Transport failures after this returns are reported only through
/// [`Provider::fatal_error`].
pub async fn initialize<C: StoreClient>(
    config: &ProviderConfig,
    env: &Environment,
    logger: Arc<dyn LogSink>,
) -> Result<Provider<C>> {
    let options = resolve_options(config, env)?;
    debug!("» Creating store client for {}", options.endpoint());

    let client = C::connect(options)?;
    let state = StateCell::new();

    logger.log(LogLevel::Warning, INITIALIZED_MESSAGE, &[]);

    let (cell, fatal_error) = FatalErrorCell::new();
    client.on_error(fatal_error_observer(
        cell,
        Arc::clone(&logger),
        state.clone(),
    ));

    let mut warm_up = Box::pin(client.warm_up());
    match futures::poll!(warm_up.as_mut()) {
        Poll::Ready(outcome) => finish_warm_up(outcome, &state),
        Poll::Pending => {
            let state = state.clone();
            tokio::spawn(async move { finish_warm_up(warm_up.await, &state) });
        }
    }

    Ok(Provider {
        service: client.clone(),
        fatal_error,
        dispose: DisposeAction {
            client,
            logger,
            state,
        },
    })
}

fn finish_warm_up(outcome: Result<()>, state: &StateCell) {
    match outcome {
        Ok(()) => {
            if state.transition(ProviderState::Connecting, ProviderState::Ready) {
                debug!("✓ Store session ready");
            }
        }
        // Transport failures already went through the observer.
        Err(e) => debug!("Store warm-up failed: {}", e),
    }
}

/// Observer that turns the first transport error into the fatal signal.
fn fatal_error_observer(
    cell: FatalErrorCell,
    logger: Arc<dyn LogSink>,
    state: StateCell,
) -> crate::backend::ErrorObserver {
    Arc::new(move |err: TransportError| {
        if !cell.claim() {
            debug!("Ignoring transport error after fatal error: {}", err);
            return;
        }

        let wrapped = FatalError::wrap(err);
        logger.log(LogLevel::ErrorStack, FATAL_ERROR_MESSAGE, &[wrapped.trace()]);
        state.fault();
        cell.reject(wrapped);
    })
}

/// A live store client paired with its fatal-error signal and teardown.
pub struct Provider<C: StoreClient> {
    service: C,
    fatal_error: FatalErrorSignal,
    dispose: DisposeAction<C>,
}

impl<C: StoreClient> Provider<C> {
    /// The store client.
    pub fn service(&self) -> &C {
        &self.service
    }

    /// Signal that resolves once the transport fails fatally.
    pub fn fatal_error(&self) -> FatalErrorSignal {
        self.fatal_error.clone()
    }

    pub fn state(&self) -> ProviderState {
        self.dispose.state.get()
    }

    /// Log the shutdown notice and end the store session.
    pub async fn dispose(self) {
        self.dispose.run().await
    }

    /// Split into `(service, fatal_error, dispose)`.
    pub fn into_parts(self) -> (C, FatalErrorSignal, DisposeAction<C>) {
        (self.service, self.fatal_error, self.dispose)
    }

    /// Run `f` with the service, then dispose.
    ///
    /// `f` is raced against the fatal signal: if the transport fails first,
    /// `f` is dropped and the fatal error is returned. Dispose runs exactly
    /// once whichever way the scope ends.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or `Error::TransportFatal` if the transport
    /// failed before `f` completed.
    pub async fn scoped<F, Fut, T>(self, f: F) -> Result<T>
    where
        F: FnOnce(C) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (service, fatal_error, dispose) = self.into_parts();

        let outcome = tokio::select! {
            result = f(service) => result,
            err = fatal_error.wait() => Err(Error::TransportFatal(err)),
        };

        dispose.run().await;
        outcome
    }
}

impl<C: StoreClient> fmt::Debug for Provider<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("endpoint", &self.service.options().endpoint())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Teardown half of a [`Provider`].
pub struct DisposeAction<C: StoreClient> {
    client: C,
    logger: Arc<dyn LogSink>,
    state: StateCell,
}

impl<C: StoreClient> DisposeAction<C> {
    pub fn state(&self) -> ProviderState {
        self.state.get()
    }

    /// Log the shutdown notice, then ask the client to quit and wait for it.
    ///
    /// Never fails: a session that is already broken has nothing left to end.
    pub async fn run(self) {
        self.logger.log(LogLevel::Warning, QUITTING_MESSAGE, &[]);
        self.state.set(ProviderState::Disposing);

        if let Err(e) = self.client.quit().await {
            debug!("Store session ended with error on quit: {}", e);
        }

        self.state.set(ProviderState::Closed);
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::backend::InMemoryClient;
    use crate::config::StoreOptions;
    use crate::logger::MemorySink;
    use std::time::Duration;

    fn local_config() -> ProviderConfig {
        ProviderConfig::new(StoreOptions::with_endpoint("localhost", 6379))
    }

    async fn init(
        config: &ProviderConfig,
        env: &Environment,
    ) -> (Provider<InMemoryClient>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let provider = initialize::<InMemoryClient>(config, env, sink.clone())
            .await
            .expect("Failed to initialize");
        (provider, sink)
    }

    #[tokio::test]
    async fn test_init_round_trip_and_dispose() {
        let (provider, sink) = init(&local_config(), &Environment::new()).await;
        assert_eq!(provider.state(), ProviderState::Ready);

        let redis = provider.service();
        redis
            .set("testkey", b"testvalue".to_vec(), None)
            .await
            .expect("Failed to set");
        assert_eq!(
            redis.get("testkey").await.expect("Failed to get"),
            Some(b"testvalue".to_vec())
        );
        redis.del("testkey").await.expect("Failed to delete");
        assert_eq!(redis.get("testkey").await.expect("Failed to get"), None);

        let service = redis.clone();
        provider.dispose().await;

        assert!(service.is_closed());
        assert_eq!(
            sink.lines(),
            vec![
                (LogLevel::Warning, INITIALIZED_MESSAGE.to_string()),
                (LogLevel::Warning, QUITTING_MESSAGE.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_effective_options_from_env() {
        let env = Environment::from_pairs([
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "s3cr3t"),
        ]);

        let (provider, _sink) = init(&ProviderConfig::default(), &env).await;
        let options = provider.service().options();

        assert_eq!(options.endpoint(), "cache.internal:6380");
        assert_eq!(options.password.as_deref(), Some("s3cr3t"));
    }

    #[tokio::test]
    async fn test_configured_options_without_env() {
        let (provider, _sink) = init(&local_config(), &Environment::new()).await;
        let options = provider.service().options();

        assert_eq!(options.endpoint(), "localhost:6379");
        assert_eq!(options.password, None);
    }

    #[tokio::test]
    async fn test_malformed_port_fails_initialization() {
        let sink = Arc::new(MemorySink::new());
        let env = Environment::from_pairs([("REDIS_PORT", "not-a-port")]);

        let result = initialize::<InMemoryClient>(&local_config(), &env, sink.clone()).await;

        assert!(matches!(result, Err(Error::ConfigError(_))));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_construction_failure_propagates() {
        let sink = Arc::new(MemorySink::new());
        let config = ProviderConfig::new(StoreOptions {
            port: Some(0),
            ..Default::default()
        });

        let result = initialize::<InMemoryClient>(&config, &Environment::new(), sink.clone()).await;

        assert!(matches!(result, Err(Error::ConnectionError(_))));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_error_rejects_once() {
        let (provider, sink) = init(&local_config(), &Environment::new()).await;
        let signal = provider.fatal_error();
        let other = provider.fatal_error();
        assert!(!signal.is_faulted());

        provider.service().inject_transport_error("connection reset");
        provider.service().inject_transport_error("second failure");
        provider.service().inject_transport_error("third failure");

        let err = signal.await;
        assert_eq!(err.code(), "E_REDIS");
        assert_eq!(err.message(), "connection reset");
        assert_eq!(other.wait().await.message(), "connection reset");
        assert_eq!(provider.state(), ProviderState::Faulted);

        let errors: Vec<_> = sink
            .records()
            .into_iter()
            .filter(|r| r.level == LogLevel::ErrorStack)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, FATAL_ERROR_MESSAGE);
        assert!(errors[0].details[0].starts_with("E_REDIS: connection reset"));

        // Faulted providers still need disposing.
        provider.dispose().await;
        assert_eq!(sink.lines().last().map(|(_, m)| m.clone()), Some(QUITTING_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn test_fatal_signal_pending_without_errors() {
        let (provider, _sink) = init(&local_config(), &Environment::new()).await;
        let signal = provider.fatal_error();

        let result = tokio::time::timeout(Duration::from_millis(50), signal.wait()).await;
        assert!(result.is_err());
        assert!(signal.peek().is_none());

        provider.dispose().await;
    }

    #[tokio::test]
    async fn test_dispose_logs_before_resolving() {
        let (provider, sink) = init(&local_config(), &Environment::new()).await;
        let (service, _signal, dispose) = provider.into_parts();
        assert_eq!(dispose.state(), ProviderState::Ready);

        sink.clear();
        dispose.run().await;

        assert_eq!(
            sink.lines(),
            vec![(LogLevel::Warning, QUITTING_MESSAGE.to_string())]
        );
        assert!(service.is_closed());
    }

    #[tokio::test]
    async fn test_dispose_tolerates_closed_session() {
        let (provider, sink) = init(&local_config(), &Environment::new()).await;
        provider.service().quit().await.expect("Failed to quit");

        let (_service, _signal, dispose) = provider.into_parts();
        let state = dispose.state.clone();
        dispose.run().await;

        assert_eq!(state.get(), ProviderState::Closed);
        assert_eq!(sink.records().len(), 2);
    }

    #[tokio::test]
    async fn test_fault_after_dispose_keeps_closed_state() {
        let (provider, _sink) = init(&local_config(), &Environment::new()).await;
        let (service, signal, dispose) = provider.into_parts();
        let state = dispose.state.clone();
        dispose.run().await;

        service.inject_transport_error("late failure");

        assert_eq!(state.get(), ProviderState::Closed);
        assert!(signal.is_faulted());
    }

    #[tokio::test]
    async fn test_scoped_disposes_on_success() {
        let (provider, sink) = init(&local_config(), &Environment::new()).await;

        let value = provider
            .scoped(|redis| async move {
                redis.set("k", b"v".to_vec(), None).await?;
                redis.get("k").await
            })
            .await
            .expect("Scope failed");

        assert_eq!(value, Some(b"v".to_vec()));
        assert_eq!(sink.lines().last().map(|(_, m)| m.clone()), Some(QUITTING_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn test_scoped_disposes_on_caller_error() {
        let (provider, sink) = init(&local_config(), &Environment::new()).await;

        let result: Result<()> = provider
            .scoped(|_redis| async { Err(Error::BackendError("caller failed".to_string())) })
            .await;

        assert!(matches!(result, Err(Error::BackendError(_))));
        assert_eq!(sink.records().len(), 2);
    }

    #[tokio::test]
    async fn test_scoped_returns_fatal_error() {
        let (provider, sink) = init(&local_config(), &Environment::new()).await;
        let service = provider.service().clone();

        let result: Result<()> = provider
            .scoped(|redis| async move {
                redis.inject_transport_error("socket closed");
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;

        match result {
            Err(Error::TransportFatal(err)) => assert_eq!(err.message(), "socket closed"),
            other => panic!("Expected TransportFatal, got {:?}", other),
        }
        assert!(service.is_closed());
        assert_eq!(
            sink.lines()
                .iter()
                .map(|(level, _)| *level)
                .collect::<Vec<_>>(),
            vec![LogLevel::Warning, LogLevel::ErrorStack, LogLevel::Warning]
        );
    }
}

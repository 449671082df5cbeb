//! Error types for the store provider.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Stable code attached to every fatal transport error.
pub const REDIS_ERROR_CODE: &str = "E_REDIS";

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the provider and its store clients.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or contradictory connection parameters (e.g. a non-numeric port).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The store client rejected the merged options at construction time.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A single store command failed.
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Unrecoverable transport failure reported after initialization.
    #[error(transparent)]
    TransportFatal(#[from] FatalError),

    /// Configuration payload could not be decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Short, stable tag identifying the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ConfigError(_) => "E_CONFIG",
            Error::ConnectionError(_) => "E_CONNECTION",
            Error::BackendError(_) => "E_BACKEND",
            Error::TransportFatal(fatal) => fatal.code(),
            Error::SerializationError(_) => "E_SERIALIZATION",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

/// Error emitted by a store client when its transport fails.
pub type TransportError = Arc<dyn StdError + Send + Sync + 'static>;

/// A transport error wrapped with a stable code and a rendered trace.
///
/// Cloning is cheap: the underlying cause is shared, so every awaiter of a
/// [`FatalErrorSignal`](crate::signal::FatalErrorSignal) gets the same value.
#[derive(Clone)]
pub struct FatalError {
    code: &'static str,
    message: String,
    trace: Arc<str>,
    source: TransportError,
}

impl FatalError {
    /// Wrap a transport error under the `E_REDIS` code.
    pub fn wrap(source: TransportError) -> Self {
        Self::wrap_with_code(source, REDIS_ERROR_CODE)
    }

    /// Wrap a transport error under a caller-chosen code.
    pub fn wrap_with_code(source: TransportError, code: &'static str) -> Self {
        let message = source.to_string();
        let trace = render_trace(code, source.as_ref());
        FatalError {
            code,
            message,
            trace: trace.into(),
            source,
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Cause chain plus the backtrace captured when the error was wrapped.
    pub fn trace(&self) -> &str {
        &self.trace
    }
}

impl fmt::Debug for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FatalError")
            .field("code", &self.code)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl StdError for FatalError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

fn render_trace(code: &str, source: &(dyn StdError + 'static)) -> String {
    let mut out = format!("{}: {}", code, source);
    let mut cause = source.source();
    while let Some(err) = cause {
        out.push_str(&format!("\n  caused by: {}", err));
        cause = err.source();
    }
    out.push_str("\nstack backtrace:\n");
    out.push_str(&Backtrace::force_capture().to_string());
    out
}

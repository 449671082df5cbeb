//! Leveled logging sink injected into the provider.
//!
//! The provider reports its lifecycle through a [`LogSink`] rather than calling
//! the `log` macros directly, so the host can route these lines wherever its
//! own service logs go. [`LogCrateSink`] is the default and forwards to `log`.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Severity of a provider log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    /// Error accompanied by a rendered stack trace in the details.
    ErrorStack,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::ErrorStack => "error-stack",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for provider log lines: `(level, message, ...details)`.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, details: &[&str]);
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str, &[&str]) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str, details: &[&str]) {
        self(level, message, details)
    }
}

/// Forwards provider log lines to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, level: LogLevel, message: &str, details: &[&str]) {
        let line = if details.is_empty() {
            message.to_string()
        } else {
            format!("{} {}", message, details.join(" "))
        };

        match level {
            LogLevel::Debug => debug!("{}", line),
            LogLevel::Info => info!("{}", line),
            LogLevel::Warning => warn!("{}", line),
            LogLevel::Error | LogLevel::ErrorStack => error!("{}", line),
        }
    }
}

/// A captured log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub details: Vec<String>,
}

/// Sink that keeps every line in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines logged so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `(level, message)` pairs, ignoring details.
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.records()
            .into_iter()
            .map(|r| (r.level, r.message))
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str, details: &[&str]) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogRecord {
                level,
                message: message.to_string(),
                details: details.iter().map(|d| d.to_string()).collect(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::Warning.to_string(), "warning");
        assert_eq!(LogLevel::ErrorStack.as_str(), "error-stack");
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.log(LogLevel::Warning, "first", &[]);
        sink.log(LogLevel::ErrorStack, "second", &["trace"]);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "first");
        assert_eq!(records[1].level, LogLevel::ErrorStack);
        assert_eq!(records[1].details, vec!["trace".to_string()]);

        sink.clear();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink: Arc<dyn LogSink> =
            Arc::new(move |level: LogLevel, message: &str, _details: &[&str]| {
                captured
                    .lock()
                    .expect("Failed to lock")
                    .push(format!("{}:{}", level, message));
            });

        sink.log(LogLevel::Info, "hello", &[]);

        assert_eq!(
            *seen.lock().expect("Failed to lock"),
            vec!["info:hello".to_string()]
        );
    }

    #[test]
    fn test_log_crate_sink_does_not_panic() {
        let _ = env_logger::builder().is_test(true).try_init();
        LogCrateSink.log(LogLevel::Warning, "warn line", &[]);
        LogCrateSink.log(LogLevel::ErrorStack, "error line", &["detail"]);
    }
}

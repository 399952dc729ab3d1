//! Error taxonomy for the activity logger.
//!
//! Each enum matches one failure class with its own recovery policy:
//!
//! - [`CaptureError`]: an input source went away. Retried with backoff.
//! - [`PersistenceError`]: a batch could not be written. The batch is kept
//!   in memory and retried on the next flush cycle.
//! - [`ParseError`]: a stored record could not be decoded. The record is
//!   skipped and the scan continues.
//! - [`ConfigError`]: bad configuration or a bad time-window request.

/// Errors raised by capture sources.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The source was connected and went away (controller unplugged, hook torn down).
    #[error("capture source disconnected: {0}")]
    Disconnected(String),

    /// The source could not be opened at all (permission missing, no device).
    #[error("capture source unavailable: {0}")]
    Unavailable(String),

    /// `Collector::start` was called twice.
    #[error("collector is already running")]
    AlreadyRunning,
}

impl CaptureError {
    /// Whether the collector should reconnect after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Disconnected(_) | CaptureError::Unavailable(_))
    }
}

/// Errors raised by the persistent store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A store operation did not finish within its deadline.
    #[error("store operation timed out")]
    Timeout,

    /// An earlier scan that timed out has not returned yet.
    #[error("previous scan still running")]
    Busy,

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),
}

/// A persisted record that could not be turned back into an event.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown event name: {0:?}")]
    UnknownEvent(String),

    #[error("{event} record is missing its {field} column")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("invalid button identifier: {0:?}")]
    InvalidButton(String),

    #[error("invalid position: {0:?}")]
    InvalidPosition(String),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    /// A requested time window could not be understood.
    #[error("invalid time window {0:?}: expected `all`, seconds, or <n>s|m|h|d")]
    InvalidWindow(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_errors_are_retryable() {
        assert!(CaptureError::Disconnected("pad".into()).is_retryable());
        assert!(CaptureError::Unavailable("tap".into()).is_retryable());
        assert!(!CaptureError::AlreadyRunning.is_retryable());
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::MissingField {
            event: "Moved",
            field: "position",
        };
        assert_eq!(err.to_string(), "Moved record is missing its position column");
    }
}

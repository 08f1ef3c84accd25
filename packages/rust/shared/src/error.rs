//! Error types for the keyword planner.
//!
//! Library crates use [`KwPlannerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! [`RequestError`] is the outcome of a single external call and is kept separate so
//! per-seed and per-batch code can inspect it (retryable or not) before deciding to
//! skip the unit.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all keyword planner operations.
#[derive(Debug, thiserror::Error)]
pub enum KwPlannerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// External request failed (after retries, if it was retryable).
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    /// Cache storage is unusable.
    #[error("cache error: {0}")]
    Cache(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid keyword, location, or argument supplied by the caller.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Malformed input document (seed or location file, response body).
    #[error("parse error: {message}")]
    Parse { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KwPlannerError>;

impl KwPlannerError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a cache error from any displayable message.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// RequestError
// ---------------------------------------------------------------------------

/// Failure of one external request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// Connection reset, timeout, or 5xx. Worth retrying.
    #[error("transient failure{}: {message}", status_suffix(*status))]
    Transient {
        message: String,
        status: Option<u16>,
    },

    /// HTTP 429. Retried, honouring the server's `Retry-After` when present.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Auth failure, other 4xx, or a body that is not the expected JSON.
    #[error("permanent failure{}: {message}", status_suffix(*status))]
    Permanent {
        message: String,
        status: Option<u16>,
    },

    /// A transient failure persisted through every allowed attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },
}

impl RequestError {
    pub fn transient(msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::Transient {
            message: msg.into(),
            status,
        }
    }

    pub fn permanent(msg: impl Into<String>, status: Option<u16>) -> Self {
        Self::Permanent {
            message: msg.into(),
            status,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }

    /// Whether retrying is pointless (bad credentials, malformed request/response).
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

fn status_suffix(status: Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = KwPlannerError::config("missing login");
        assert_eq!(err.to_string(), "config error: missing login");

        let err = KwPlannerError::validation("keyword term must not be empty");
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn request_error_classification() {
        assert!(RequestError::transient("reset", None).is_transient());
        assert!(RequestError::RateLimited { retry_after: None }.is_transient());
        assert!(RequestError::permanent("401", Some(401)).is_permanent());

        let exhausted = RequestError::RetryExhausted {
            attempts: 3,
            last: "timeout".into(),
        };
        assert!(!exhausted.is_transient());
        assert!(!exhausted.is_permanent());
    }

    #[test]
    fn request_error_display_includes_status() {
        let err = RequestError::transient("server error", Some(503));
        assert_eq!(err.to_string(), "transient failure (HTTP 503): server error");

        let err = RequestError::permanent("not json", None);
        assert_eq!(err.to_string(), "permanent failure: not json");
    }

    #[test]
    fn request_error_converts_into_top_level() {
        let err: KwPlannerError = RequestError::permanent("forbidden", Some(403)).into();
        assert!(matches!(err, KwPlannerError::Request(_)));
        assert!(err.to_string().starts_with("request error:"));
    }
}

//! Error types for circuit-runtime.
//!
//! Grouped by category, following `mcp-agent-mail-core`'s `error.rs`: one
//! `thiserror`-derived enum per concern, a `Result<T>` alias for the
//! non-generic surface, and a separate generic `ExecError<E>` for the
//! `Breaker::exec`/`Circuit::exec` boundary so a caller's own operation
//! error type is never erased or boxed away.

use thiserror::Error;

/// Result type alias for operations that cannot fail with a caller-defined
/// error type (bucket/stats bookkeeping, configuration validation).
pub type Result<T> = std::result::Result<T, BreakerError>;

/// Errors internal to the statistics and configuration machinery.
#[derive(Debug, Error)]
pub enum BreakerError {
    // ==========================================================================
    // Statistics errors
    // ==========================================================================
    /// [`crate::bucket::Bucket::percent`] was called with a field name that
    /// does not match any recognized counter.
    #[error("invalid bucket field: {0}")]
    InvalidBucketField(String),

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    #[error("threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("percentiles must be non-empty and within [0, 1], got {0:?}")]
    InvalidPercentiles(Vec<f64>),

    #[error("bucketNum must be at least 1, got {0}")]
    InvalidBucketNum(usize),
}

/// The deadline for a single `exec` was exceeded before the operation
/// completed.
///
/// Mirrors the legacy `TimeoutError`; message is fixed per spec §7.
#[derive(Debug, Clone, Error)]
#[error("Request Timed out")]
pub struct TimeoutError;

/// `exec` was attempted on an open breaker with no fallback available.
#[derive(Debug, Clone, Error)]
#[error("circuit open{}: {fail_percentage:.1}% failures (threshold {threshold:.1}%)", name.as_ref().map(|n| format!(" [{n}]")).unwrap_or_default())]
pub struct CircuitOpenError {
    pub name: Option<String>,
    /// Observed failure percentage (`0..=100`) of the current window.
    pub fail_percentage: f64,
    /// Configured threshold, expressed as a percentage (`threshold * 100`).
    pub threshold: f64,
}

/// The outcome of a single `Breaker`/`Circuit` invocation, surfaced to the
/// caller of `exec`.
///
/// Kept distinct from `BreakerError` because `Operation` carries the
/// caller's own error type verbatim (spec §7: "propagated user errors are
/// surfaced without being recorded" or "surfaced verbatim, with optional
/// name-prefix modification" — never downcast or boxed into a shared enum).
#[derive(Debug, Clone)]
pub enum ExecError<E> {
    Timeout(TimeoutError),
    CircuitOpen(CircuitOpenError),
    Operation(E),
}

impl<E: std::fmt::Display> ExecError<E> {
    /// Render the final message a caller would see, applying the
    /// `modifyError`/`name` prefix rule from spec §4.3 ("optionally prepend
    /// `[Breaker: <name>] ` ... when `opts.modifyError` is true and `name`
    /// is set").
    #[must_use]
    pub fn display_with_prefix(&self, name: Option<&str>, modify_error: bool) -> String {
        let base = self.to_string();
        match (modify_error, name) {
            (true, Some(name)) => format!("[Breaker: {name}] {base}"),
            _ => base,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for ExecError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(e) => write!(f, "{e}"),
            Self::CircuitOpen(e) => write!(f, "{e}"),
            Self::Operation(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for ExecError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl<E> From<TimeoutError> for ExecError<E> {
    fn from(e: TimeoutError) -> Self {
        Self::Timeout(e)
    }
}

impl<E> From<CircuitOpenError> for ExecError<E> {
    fn from(e: CircuitOpenError) -> Self {
        Self::CircuitOpen(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_message_includes_name_and_percentages() {
        let err = CircuitOpenError {
            name: Some("payments".to_string()),
            fail_percentage: 80.0,
            threshold: 50.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("payments"));
        assert!(msg.contains("80.0"));
        assert!(msg.contains("50.0"));
    }

    #[test]
    fn modify_error_prefix_applies_only_when_requested() {
        let err: ExecError<String> = ExecError::Operation("boom".to_string());
        assert_eq!(err.display_with_prefix(Some("payments"), false), "boom");
        assert_eq!(
            err.display_with_prefix(Some("payments"), true),
            "[Breaker: payments] boom"
        );
        assert_eq!(err.display_with_prefix(None, true), "boom");
    }
}

//! Canonical error type for all ACE operations.
//!
//! This module defines the error taxonomy of spec.md §7. All subsystems
//! return `Result<T, AceError>` for error handling.

use std::io;
use thiserror::Error;

/// Canonical error type for all ACE operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Many variants auto-convert from standard library errors via `#[from]`.
#[derive(Error, Debug)]
pub enum AceError {
    /// A detector or codemod rejected input bytes; non-fatal, file skipped.
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// Guard rejected an edit at a specific layer; the plan is aborted.
    #[error("guard failed at layer {layer}: {message}")]
    GuardFailure { layer: String, message: String },

    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A finding-count or regression gate triggered at run end.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Content hash mismatch during revert or crash recovery.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Per-run edited-file/line caps reached; remaining plans deferred.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// An `atomic_write` failed after rename was already attempted: the
    /// target file's final state (old vs. new content) cannot be assumed
    /// without re-reading it (spec.md §4.1).
    #[error("durability error after rename: {0}")]
    Durability(String),

    /// Malformed `policy.toml`.
    #[error("policy config error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed persisted JSON state.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Referenced resource (finding, plan, journal run, receipt) not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An invariant the caller was expected to have checked was violated.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_failure_display() {
        let err = AceError::GuardFailure {
            layer: "ast_hash".into(),
            message: "canonical hash mismatch".into(),
        };
        assert_eq!(
            format!("{}", err),
            "guard failed at layer ast_hash: canonical hash mismatch"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = AceError::NotFound("plan-abc123".into());
        assert_eq!(format!("{}", err), "not found: plan-abc123");
    }

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: AceError = io_err.into();
        assert!(matches!(err, AceError::Io(_)));
    }
}

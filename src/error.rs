//! Error types for the reconciliation subsystem
//!
//! This module provides:
//! - `ReconcileError`, the library error enum
//! - `ErrorCode`, a stable classification that doubles as the process exit
//!   status of the command-line tool and decides whether a failed operation
//!   may be retried
//!
//! Per-artifact and per-rollback-entry failures are not errors in this sense:
//! they are folded into `error`-status outcomes so one bad file never aborts a
//! batch. `ReconcileError` is reserved for failures that make the whole
//! operation meaningless.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, ReconcileError>;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Stable error classification.
///
/// Values are process exit statuses. 1 stays reserved for a pass that ran
/// but reported failed outcomes, 2 for usage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    /// Filesystem read/write/create failure
    IoError = 10,
    /// Permission denied by the filesystem
    PermissionDenied = 11,
    /// Persisted JSON document could not be parsed or produced
    SerializationError = 12,
    /// Sequence key could not be parsed
    InvalidKey = 13,
    /// Generation run not present in the run store
    RunNotFound = 14,
    /// Structural anchor missing from a hand-maintained file
    AnchorNotFound = 15,
    /// Directory casing could not be reconciled
    CaseConflict = 16,
    /// Rollback selection resolved to no runs
    NothingToRollBack = 17,
}

impl ErrorCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Classification of the first [`ReconcileError`] in an error chain
    pub fn of(err: &anyhow::Error) -> Option<Self> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<ReconcileError>())
            .map(ReconcileError::code)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::IoError | ErrorCode::CaseConflict)
    }

    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::IoError | ErrorCode::PermissionDenied => "io_error",
            ErrorCode::SerializationError | ErrorCode::InvalidKey => "data_error",
            ErrorCode::RunNotFound | ErrorCode::NothingToRollBack => "resource_not_found",
            ErrorCode::AnchorNotFound => "merge_error",
            ErrorCode::CaseConflict => "filesystem_conflict",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// =============================================================================
// RECONCILE ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON document {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid sequence key '{0}'")]
    InvalidKey(String),

    #[error("generation run '{0}' not found")]
    RunNotFound(String),

    #[error("anchor not found in {file}: {anchor}")]
    AnchorNotFound { file: String, anchor: String },

    #[error("cannot reconcile directory casing for {}: {message}", path.display())]
    CaseConflict { path: PathBuf, message: String },

    #[error("rollback selection matched no runs")]
    NothingToRollBack,
}

impl ReconcileError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ReconcileError::Io { source, .. }
                if source.kind() == io::ErrorKind::PermissionDenied =>
            {
                ErrorCode::PermissionDenied
            }
            ReconcileError::Io { .. } => ErrorCode::IoError,
            ReconcileError::Json { .. } => ErrorCode::SerializationError,
            ReconcileError::InvalidKey(_) => ErrorCode::InvalidKey,
            ReconcileError::RunNotFound(_) => ErrorCode::RunNotFound,
            ReconcileError::AnchorNotFound { .. } => ErrorCode::AnchorNotFound,
            ReconcileError::CaseConflict { .. } => ErrorCode::CaseConflict,
            ReconcileError::NothingToRollBack => ErrorCode::NothingToRollBack,
        }
    }
}

/// Attach a path to a raw `io::Result`
pub(crate) trait IoContext<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| ReconcileError::io(path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_classified_separately() {
        let err = ReconcileError::io(
            "/tmp/x",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(err.code().category(), "io_error");
        assert!(!err.code().is_retryable());
    }

    #[test]
    fn test_io_error_message_includes_path() {
        let err = ReconcileError::io("app/Models/User.php", io::Error::other("disk full"));
        let message = err.to_string();
        assert!(message.contains("app/Models/User.php"));
        assert!(message.contains("disk full"));
        assert!(err.code().is_retryable());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::RunNotFound.to_string(), "RunNotFound(14)");
    }

    #[test]
    fn test_codes_are_exit_statuses_clear_of_generic_failure() {
        let codes = [
            ErrorCode::IoError,
            ErrorCode::PermissionDenied,
            ErrorCode::SerializationError,
            ErrorCode::InvalidKey,
            ErrorCode::RunNotFound,
            ErrorCode::AnchorNotFound,
            ErrorCode::CaseConflict,
            ErrorCode::NothingToRollBack,
        ];
        assert!(codes.iter().all(|c| c.code() > 2));
        let mut unique: Vec<u8> = codes.iter().map(ErrorCode::code).collect();
        unique.dedup();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_code_is_found_through_context() {
        let err = anyhow::Error::new(ReconcileError::NothingToRollBack).context("rollback failed");
        assert_eq!(ErrorCode::of(&err), Some(ErrorCode::NothingToRollBack));

        let plain = anyhow::anyhow!("failed to read plan");
        assert_eq!(ErrorCode::of(&plain), None);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for cloudfs

use std::fmt;
use thiserror::Error;

/// Result type alias
pub type CloudFsResult<T> = Result<T, CloudFsError>;

/// Which half of a copy-then-delete rename finished before the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameStage {
    /// Nothing was written; the source is untouched.
    NotStarted,
    /// The target was written but the source could not be removed.
    Copied,
}

impl fmt::Display for RenameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameStage::NotStarted => write!(f, "nothing copied"),
            RenameStage::Copied => write!(f, "copied, source not deleted"),
        }
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum CloudFsError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Missing bucket name in {0}")]
    MissingBucket(String),

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("No client registered for scheme: {0}")]
    BackendNotFound(String),

    #[error("Rename {source_path} -> {target_path} failed ({stage}): {cause}")]
    RenamePartialFailure {
        source_path: String,
        target_path: String,
        stage: RenameStage,
        #[source]
        cause: Box<CloudFsError>,
    },

    #[error("Provider API error ({provider}): {message}")]
    ProviderApi { provider: String, message: String },

    #[error("Invalid UTF-8 in {0}")]
    Decode(String),

    #[error("Timeout")]
    Timeout,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloudFsError {
    /// Map an OS error for `path` onto the taxonomy.
    pub fn from_io(err: std::io::Error, path: impl fmt::Display) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => return CloudFsError::NotFound(path.to_string()),
            ErrorKind::AlreadyExists => return CloudFsError::AlreadyExists(path.to_string()),
            _ => {}
        }

        #[cfg(unix)]
        {
            match err.raw_os_error() {
                Some(libc::ENOTEMPTY) => return CloudFsError::DirectoryNotEmpty(path.to_string()),
                Some(libc::EISDIR) => return CloudFsError::IsADirectory(path.to_string()),
                Some(libc::ENOTDIR) => return CloudFsError::NotADirectory(path.to_string()),
                _ => {}
            }
        }

        CloudFsError::Io(err)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudFsError::NotFound(_))
    }

    /// Whether retrying the same call might succeed. The engines never retry
    /// themselves; this is a hint for adapters and callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloudFsError::BackendUnavailable(_) | CloudFsError::Timeout)
    }
}

//! Error types for ODFS operations.
//!
//! Every failure the path cache or the remote client can produce is an
//! [`OdfsError`]. Filesystem frontends turn it into a POSIX error code with
//! [`OdfsError::to_errno`]; remote failures always surface as `EIO` so a
//! flaky network fails one operation rather than the whole mount.

use crate::bridge::BridgeError;
use thiserror::Error;

/// Errors produced by the ODFS cache and remote client.
#[derive(Debug, Error)]
pub enum OdfsError {
    /// Unknown or confirmed-missing path.
    #[error("No such entry: {0}")]
    NotFound(String),

    /// A directory operation was issued against a file.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Write intent on a read-only mount.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation on a handle that is not open.
    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),

    /// Transport failure, timeout or a server-side error.
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote store rejected our credential or streaming key.
    #[error("Remote store rejected credentials: {0}")]
    RemoteAuth(String),

    /// The remote store answered with an unexpected status.
    #[error("Remote store returned {status} for {endpoint}")]
    RemoteRejected { status: u16, endpoint: String },

    /// The remote store answered with a body we could not decode.
    #[error("Invalid response from remote store: {0}")]
    InvalidResponse(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OdfsError {
    /// Converts this error to a libc error code.
    pub fn to_errno(&self) -> i32 {
        match self {
            OdfsError::NotFound(_) => libc::ENOENT,
            OdfsError::NotADirectory(_) => libc::ENOTDIR,
            OdfsError::PermissionDenied(_) => libc::EACCES,
            OdfsError::InvalidHandle(_) => libc::EBADF,
            OdfsError::RemoteUnavailable(_)
            | OdfsError::RemoteAuth(_)
            | OdfsError::RemoteRejected { .. }
            | OdfsError::InvalidResponse(_) => libc::EIO,
            OdfsError::Config(_) => libc::EINVAL,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, OdfsError::RemoteUnavailable(_))
    }
}

impl From<BridgeError> for OdfsError {
    fn from(e: BridgeError) -> Self {
        OdfsError::RemoteUnavailable(e.to_string())
    }
}

/// Result type for ODFS operations.
pub type OdfsResult<T> = Result<T, OdfsError>;

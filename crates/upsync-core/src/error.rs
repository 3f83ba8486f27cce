//! Error types for Upsync.
//!
//! This module provides a unified error type for all Upsync operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Upsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Upsync.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A required configuration field is absent (U001)
    #[error("required configuration field missing: {0}")]
    MissingField(&'static str),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Could not reach or negotiate with the remote host (U002)
    #[error("connection to {host}:{port} failed: {reason}")]
    ConnectionFailed {
        /// Remote host
        host: String,
        /// Remote port
        port: u16,
        /// Underlying failure
        reason: String,
    },

    /// The server rejected the credentials (U003)
    #[error("authentication rejected for user '{0}'")]
    AuthenticationFailed(String),

    /// The connection refused the file-transfer sub-channel (U004)
    #[error("transport unavailable: {0}")]
    ChannelUnavailable(String),

    /// The transport errored or closed underneath a live session (U005)
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Remote root exists but is not a directory (U006)
    #[error("remote path is not a directory: {0}")]
    RemoteNotDirectory(String),

    /// Remote root could not be stat'ed (U007)
    #[error("remote path unreachable: {path}: {reason}")]
    RemoteUnreachable {
        /// Remote path
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Remote root stat did not answer in time (U008)
    #[error("validation timeout: no answer for '{path}' after {secs} seconds")]
    ValidationTimeout {
        /// Remote path
        path: String,
        /// Timeout that elapsed
        secs: u64,
    },

    /// A single file transfer failed
    #[error("upload of '{path}' failed: {reason}")]
    UploadFailed {
        /// Local path relative to the working root
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// File system watcher error
    #[error("file watcher error: {0}")]
    WatcherError(String),

    /// Directory not found
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Reconnect attempts used up without reaching an active session (U009)
    #[error("gave up after {attempts} reconnect attempts: {last}")]
    RetriesExhausted {
        /// Number of consecutive failed attempts
        attempts: u32,
        /// The failure of the final attempt
        last: Box<Error>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern UXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(_) => Some("U001"),
            Self::ConnectionFailed { .. } => Some("U002"),
            Self::AuthenticationFailed(_) => Some("U003"),
            Self::ChannelUnavailable(_) => Some("U004"),
            Self::ConnectionClosed(_) => Some("U005"),
            Self::RemoteNotDirectory(_) => Some("U006"),
            Self::RemoteUnreachable { .. } => Some("U007"),
            Self::ValidationTimeout { .. } => Some("U008"),
            Self::RetriesExhausted { .. } => Some("U009"),
            _ => None,
        }
    }

    /// Returns whether this error is recovered by resetting the session.
    ///
    /// Only transport-level failures qualify. Everything else either
    /// terminates the process or, for uploads, is handled by the queue.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ChannelUnavailable(_) | Self::ConnectionClosed(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(_) => Some(
                "sftp.json needs: host, port, auth.username, auth.password, path",
            ),
            Self::AuthenticationFailed(_) => {
                Some("Check auth.username and auth.password in sftp.json")
            }
            Self::RemoteNotDirectory(_) | Self::RemoteUnreachable { .. } => {
                Some("Make sure 'path' in sftp.json names an existing remote directory")
            }
            Self::ValidationTimeout { .. } => Some(
                "The server did not answer in time. Check the network or raise validate_timeout",
            ),
            _ => None,
        }
    }
}

//! One-way directory mirroring to a remote host.
//!
//! This module keeps a remote directory up to date with a local one:
//! files created or modified under the local root are uploaded to the
//! matching location under the remote root, one at a time, in the order
//! the changes were seen.
//!
//! ## Pieces
//!
//! - [`watcher`] - change feed over the local tree
//! - [`queue`] - FIFO of pending uploads with a single in-flight transfer
//! - [`validator`] - remote root check with a bounded wait
//! - [`backoff`] - delay policy between session resets
//! - [`session`] - the state machine tying it together
//!
//! ## Example
//!
//! ```rust,ignore
//! use upsync_core::sync::{SessionController, Uploader, FileWatcher};
//! use upsync_core::transport::ssh::SshGateway;
//!
//! let feed = FileWatcher::new(&root, &config.ignore)?;
//! let uploader = Uploader::new(&root, &remote.path, notifier);
//! let mut controller = SessionController::new(remote, SshGateway::new(), feed, uploader);
//! controller.run().await?;
//! ```

use std::path::{Path, PathBuf};

pub mod backoff;
pub mod queue;
pub mod session;
pub mod validator;
pub mod watcher;

pub use backoff::{Backoff, ReconnectConfig};
pub use queue::{DrainStep, UploadQueue, Uploader};
pub use session::{Session, SessionController, SessionEvent, SessionState};
pub use validator::PathValidator;
pub use watcher::{ChangeEvent, ChangeFeed, ChangeKind, FileWatcher};

/// A path relative to the local root.
///
/// Paths are normalized to use forward slashes regardless of platform.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new relative path, normalizing path separators.
    #[must_use]
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(path.as_ref().replace('\\', "/"))
    }

    /// Get the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Location of this path under a remote root, `/`-separated.
    #[must_use]
    pub fn to_remote(&self, remote_root: &str) -> String {
        let root = remote_root.trim_end_matches('/');
        format!("{root}/{}", self.0.trim_start_matches('/'))
    }

    /// Create from an absolute path under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not below the root.
    pub fn from_absolute(absolute: &Path, root: &Path) -> crate::Result<Self> {
        let rel = absolute
            .strip_prefix(root)
            .map_err(|_| crate::Error::InvalidPath(absolute.display().to_string()))?;

        Ok(Self::new(rel.to_str().ok_or_else(|| {
            crate::Error::InvalidPath(absolute.display().to_string())
        })?))
    }
}

impl std::fmt::Display for RelativePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local file waiting to be uploaded.
///
/// Tasks have no identity beyond their path; the same path may be queued
/// more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    /// Absolute local path
    pub path: PathBuf,
}

impl UploadTask {
    /// Create a task for an absolute local path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of this task relative to `root`.
    pub fn relative_to(&self, root: &Path) -> crate::Result<RelativePath> {
        RelativePath::from_absolute(&self.path, root)
    }
}

/// Counters for the lifetime of a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// Files uploaded successfully
    pub files_uploaded: u64,
    /// Bytes uploaded successfully
    pub bytes_uploaded: u64,
    /// Failed transfers
    pub failures: u64,
    /// Tasks dropped from the queue without being attempted
    pub discarded: u64,
    /// Session resets
    pub resets: u64,
}

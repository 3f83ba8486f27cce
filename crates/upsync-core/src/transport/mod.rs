//! Secure transport to the remote host.
//!
//! A [`Gateway`] owns one connection at a time and hands out a
//! [`RemoteChannel`], the file-transfer sub-channel multiplexed over it.
//! The production implementation is [`ssh::SshGateway`], which speaks SSH
//! and opens the `sftp` subsystem.
//!
//! Transport loss is reported out of band: [`Gateway::closed`] returns a
//! token that is cancelled when the current connection errors or closes.

use std::future::Future;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::config::RemoteConfig;
use crate::Result;

pub mod ssh;

/// Attributes of a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteStat {
    /// Whether the path is a directory
    pub is_dir: bool,
    /// Size in bytes, when reported
    pub size: Option<u64>,
}

impl RemoteStat {
    /// Stat result for a directory.
    #[must_use]
    pub const fn directory() -> Self {
        Self {
            is_dir: true,
            size: None,
        }
    }

    /// Stat result for a regular file of `size` bytes.
    #[must_use]
    pub const fn file(size: u64) -> Self {
        Self {
            is_dir: false,
            size: Some(size),
        }
    }
}

/// File-transfer operations on an open sub-channel.
///
/// Handles are cheap to clone and share the same underlying channel.
pub trait RemoteChannel: Clone + Send + Sync + 'static {
    /// Stat a remote path.
    fn stat(&self, path: &str) -> impl Future<Output = Result<RemoteStat>> + Send;

    /// Copy a local file to `remote`, creating missing parent directories.
    ///
    /// Returns the number of bytes written.
    fn upload(&self, local: &Path, remote: &str) -> impl Future<Output = Result<u64>> + Send;
}

/// Owner of the secure connection.
pub trait Gateway: Send {
    /// Channel type produced by [`Gateway::open_channel`].
    type Channel: RemoteChannel;

    /// Connect and authenticate. Completion is the "ready" signal.
    fn connect(&mut self, config: &RemoteConfig) -> impl Future<Output = Result<()>> + Send;

    /// Request a file-transfer sub-channel on the ready connection.
    ///
    /// Fails with [`crate::Error::ChannelUnavailable`] when the connection
    /// is missing or rejects the request. Never retried here.
    fn open_channel(&mut self) -> impl Future<Output = Result<Self::Channel>> + Send;

    /// Token cancelled once the current connection errors or closes.
    fn closed(&self) -> CancellationToken;

    /// Terminate the connection. Safe to call when already closed or never
    /// opened.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

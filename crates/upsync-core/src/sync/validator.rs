//! Remote root validation.

use std::time::Duration;

use crate::transport::RemoteChannel;
use crate::{Error, Result};

/// Confirms the remote root exists and is a directory.
#[derive(Debug, Clone, Copy)]
pub struct PathValidator {
    timeout: Duration,
}

impl Default for PathValidator {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::DEFAULT_VALIDATE_TIMEOUT_SECS))
    }
}

impl PathValidator {
    /// Create a validator that waits at most `timeout` for the stat reply.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The configured wait.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validate `remote_root` over `channel`.
    ///
    /// Returns immediately without a round-trip when `already_validated`
    /// is set. Otherwise the stat request races the timeout; whichever
    /// finishes first decides the outcome and the other is dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::RemoteNotDirectory`] if the path is not a directory
    /// - [`Error::RemoteUnreachable`] if the stat request fails
    /// - [`Error::ValidationTimeout`] if no reply arrives in time
    /// - transport errors from the channel are passed through unchanged
    pub async fn validate<C: RemoteChannel>(
        &self,
        channel: &C,
        remote_root: &str,
        already_validated: bool,
    ) -> Result<()> {
        if already_validated {
            return Ok(());
        }

        tracing::info!("Validating remote directory: {} ...", remote_root);

        match tokio::time::timeout(self.timeout, channel.stat(remote_root)).await {
            Ok(Ok(stat)) if stat.is_dir => {
                tracing::info!("Remote directory ok: {}", remote_root);
                Ok(())
            }
            Ok(Ok(_)) => Err(Error::RemoteNotDirectory(remote_root.to_string())),
            Ok(Err(Error::RemoteUnreachable { path, reason })) => {
                Err(Error::RemoteUnreachable { path, reason })
            }
            Ok(Err(e)) if e.is_recoverable() => Err(e),
            Ok(Err(e)) => Err(Error::RemoteUnreachable {
                path: remote_root.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ValidationTimeout {
                path: remote_root.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

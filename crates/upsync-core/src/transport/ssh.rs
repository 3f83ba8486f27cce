//! SSH transport with an SFTP sub-channel.
//!
//! Authentication is by password. The server host key is accepted without
//! verification and its fingerprint is logged at debug level.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::{Gateway, RemoteChannel, RemoteStat};
use crate::config::RemoteConfig;
use crate::{Error, Result};

/// Name of the SSH subsystem carrying the file-transfer protocol.
const SFTP_SUBSYSTEM: &str = "sftp";

/// Client callbacks for one connection.
///
/// The handler lives exactly as long as the connection task inside
/// `russh`, so dropping it is the close signal.
struct ClientHandler {
    closed: CancellationToken,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        tracing::debug!(
            fingerprint = %server_public_key.fingerprint(),
            "Accepting server host key"
        );
        Ok(true)
    }
}

impl Drop for ClientHandler {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// [`Gateway`] over SSH.
pub struct SshGateway {
    handle: Option<Handle<ClientHandler>>,
    closed: CancellationToken,
}

impl Default for SshGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SshGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshGateway")
            .field("connected", &self.handle.is_some())
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

impl SshGateway {
    /// Create a gateway with no connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: None,
            closed: CancellationToken::new(),
        }
    }
}

impl Gateway for SshGateway {
    type Channel = SftpChannel;

    async fn connect(&mut self, config: &RemoteConfig) -> Result<()> {
        self.close().await;

        tracing::info!("Connecting to {}:{} ...", config.host, config.port);

        let ssh_config = client::Config {
            keepalive_interval: config.keepalive,
            ..Default::default()
        };

        let closed = CancellationToken::new();
        let handler = ClientHandler {
            closed: closed.clone(),
        };

        let connection_failed = |e: russh::Error| Error::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            reason: e.to_string(),
        };

        let mut handle = client::connect(
            Arc::new(ssh_config),
            (config.host.as_str(), config.port),
            handler,
        )
        .await
        .map_err(connection_failed)?;

        let authenticated = handle
            .authenticate_password(config.username.clone(), config.password.clone())
            .await
            .map_err(connection_failed)?;

        if !authenticated {
            disconnect(handle).await;
            return Err(Error::AuthenticationFailed(config.username.clone()));
        }

        tracing::debug!("Authenticated as {}", config.username);

        self.handle = Some(handle);
        self.closed = closed;
        Ok(())
    }

    async fn open_channel(&mut self) -> Result<SftpChannel> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::ChannelUnavailable("not connected".to_string()))?;

        let unavailable = |e: russh::Error| Error::ChannelUnavailable(e.to_string());

        let mut channel = handle.channel_open_session().await.map_err(unavailable)?;
        channel
            .request_subsystem(true, SFTP_SUBSYSTEM)
            .await
            .map_err(unavailable)?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::ChannelUnavailable(e.to_string()))?;

        tracing::debug!("SFTP channel open");
        Ok(SftpChannel {
            sftp: Arc::new(sftp),
        })
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            disconnect(handle).await;
        }
    }
}

async fn disconnect(handle: Handle<ClientHandler>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
    {
        tracing::debug!("Disconnect failed: {}", e);
    }
}

/// [`RemoteChannel`] backed by an SFTP session.
#[derive(Clone)]
pub struct SftpChannel {
    sftp: Arc<SftpSession>,
}

impl std::fmt::Debug for SftpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpChannel").finish_non_exhaustive()
    }
}

impl SftpChannel {
    async fn ensure_parent_dirs(&self, remote: &str) -> Result<()> {
        let upload_failed = |e: SftpError| Error::UploadFailed {
            path: remote.to_string(),
            reason: e.to_string(),
        };

        let chain = parent_chain(remote);
        let Some(parent) = chain.last() else {
            return Ok(());
        };
        if self
            .sftp
            .try_exists(parent.clone())
            .await
            .map_err(upload_failed)?
        {
            return Ok(());
        }

        for dir in chain {
            if !self
                .sftp
                .try_exists(dir.clone())
                .await
                .map_err(upload_failed)?
            {
                tracing::debug!("Creating remote directory {}", dir);
                self.sftp.create_dir(dir).await.map_err(upload_failed)?;
            }
        }

        Ok(())
    }
}

impl RemoteChannel for SftpChannel {
    async fn stat(&self, path: &str) -> Result<RemoteStat> {
        let attrs = self
            .sftp
            .metadata(path.to_string())
            .await
            .map_err(|e| {
                if is_transport_loss(&e) {
                    Error::ConnectionClosed(e.to_string())
                } else {
                    Error::RemoteUnreachable {
                        path: path.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        Ok(RemoteStat {
            is_dir: attrs.is_dir(),
            size: attrs.size,
        })
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
        let upload_failed = |reason: String| Error::UploadFailed {
            path: remote.to_string(),
            reason,
        };

        self.ensure_parent_dirs(remote).await?;

        let mut source = tokio::fs::File::open(local).await?;
        let mut target = self
            .sftp
            .create(remote.to_string())
            .await
            .map_err(|e| upload_failed(e.to_string()))?;

        let bytes = tokio::io::copy(&mut source, &mut target)
            .await
            .map_err(|e| upload_failed(e.to_string()))?;
        target
            .shutdown()
            .await
            .map_err(|e| upload_failed(e.to_string()))?;

        Ok(bytes)
    }
}

/// Whether an SFTP error means the sub-channel itself is gone rather than
/// the server answering the request.
const fn is_transport_loss(e: &SftpError) -> bool {
    matches!(e, SftpError::IO(_) | SftpError::UnexpectedBehavior(_))
}

/// Every ancestor directory of `remote`, outermost first.
///
/// `/a/b/c.txt` yields `["/a", "/a/b"]`. The filesystem root is never
/// included.
fn parent_chain(remote: &str) -> Vec<String> {
    let Some((parent, _)) = remote.rsplit_once('/') else {
        return Vec::new();
    };

    let mut current = if remote.starts_with('/') {
        String::from("/")
    } else {
        String::new()
    };

    let mut chain = Vec::new();
    for part in parent.split('/').filter(|p| !p.is_empty()) {
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(part);
        chain.push(current.clone());
    }
    chain
}

//! Session lifecycle and recovery.
//!
//! The [`SessionController`] owns the gateway, the change feed and the one
//! live [`Session`]. It runs the establishment pipeline
//! (connect, open channel, validate, drain, activate feed), serves change
//! events while active, and decides what happens on failure:
//!
//! - transport failures reset the session and reconnect after a backoff delay
//! - everything else (bad credentials, a bad remote root, a broken feed)
//!   terminates
//!
//! ```text
//! Disconnected -> Connecting -> Establishing -> Active
//!                     ^              |            |
//!                     |              v            v
//!                     +-------- Resetting <-------+
//!                                    |
//!                                    v
//!                               Terminating
//! ```
//!
//! A reset never repairs the old session. It is dropped together with its
//! queue and validation flag, and the next attempt builds a new one.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::backoff::{Backoff, ReconnectConfig};
use super::queue::{DrainStep, UploadQueue, Uploader};
use super::validator::PathValidator;
use super::watcher::{self, ChangeEvent, ChangeFeed};
use super::{UploadStats, UploadTask};
use crate::config::RemoteConfig;
use crate::transport::{Gateway, RemoteChannel};
use crate::{Error, Result};

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection, nothing running
    Disconnected,
    /// Waiting for the gateway to become ready
    Connecting,
    /// Opening the channel and validating the remote root
    Establishing,
    /// Serving change events
    Active,
    /// Tearing down after a transport failure
    Resetting,
    /// Fatal failure; nothing follows
    Terminating,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Active, Connecting, Disconnected, Establishing, Resetting, Terminating};

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Establishing | Resetting | Terminating | Disconnected)
                | (Establishing, Active | Resetting | Terminating | Disconnected)
                | (Active, Resetting | Terminating | Disconnected)
                | (Resetting, Connecting | Terminating | Disconnected)
        )
    }

    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Establishing => "establishing",
            Self::Active => "active",
            Self::Resetting => "resetting",
            Self::Terminating => "terminating",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something observable that happened inside the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The state machine moved
    StateChanged {
        /// Previous state
        from: SessionState,
        /// New state
        to: SessionState,
    },
    /// A change was queued for upload
    Enqueued {
        /// Local path
        path: PathBuf,
        /// Pending tasks after the append, not counting one in flight
        pending: usize,
    },
    /// A transfer started
    UploadStarted {
        /// Local path
        path: PathBuf,
    },
    /// A transfer finished
    UploadFinished {
        /// Local path
        path: PathBuf,
        /// Whether it succeeded
        success: bool,
    },
    /// The session was torn down after a transport failure
    Reset {
        /// What caused it
        reason: String,
        /// Pending tasks dropped without being attempted
        discarded: usize,
    },
}

/// One attempt at keeping the remote in sync.
///
/// Built fresh once the gateway is ready and dropped wholesale on reset.
#[derive(Debug)]
pub struct Session<C> {
    channel: C,
    validated: bool,
    queue: UploadQueue,
}

impl<C: RemoteChannel> Session<C> {
    /// Start a session on an open channel. Not yet validated, queue empty.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            validated: false,
            queue: UploadQueue::new(),
        }
    }

    /// The file-transfer channel.
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Whether the remote root has been confirmed for this session.
    pub const fn is_validated(&self) -> bool {
        self.validated
    }

    /// Pending uploads.
    pub const fn queue(&self) -> &UploadQueue {
        &self.queue
    }
}

type InFlight = Pin<Box<dyn Future<Output = (UploadTask, Result<u64>)> + Send>>;

/// Drives sessions until shutdown or a fatal failure.
///
/// # Example
///
/// ```rust,ignore
/// let shutdown = CancellationToken::new();
/// let mut controller = SessionController::new(remote, SshGateway::new(), watcher, uploader)
///     .with_reconnect(config.reconnect)
///     .with_shutdown(shutdown.clone());
///
/// controller.run().await?;
/// ```
pub struct SessionController<G: Gateway, F: ChangeFeed> {
    remote: RemoteConfig,
    gateway: G,
    feed: F,
    validator: PathValidator,
    uploader: Uploader,
    backoff: Backoff,
    state: SessionState,
    session: Option<Session<G::Channel>>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    shutdown: CancellationToken,
    stats: UploadStats,
}

impl<G: Gateway, F: ChangeFeed> std::fmt::Debug for SessionController<G, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("remote", &self.remote)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<G: Gateway, F: ChangeFeed> SessionController<G, F> {
    /// Create a controller in the [`SessionState::Disconnected`] state.
    pub fn new(remote: RemoteConfig, gateway: G, feed: F, uploader: Uploader) -> Self {
        Self {
            remote,
            gateway,
            feed,
            validator: PathValidator::default(),
            uploader,
            backoff: Backoff::new(ReconnectConfig::default()),
            state: SessionState::Disconnected,
            session: None,
            events: None,
            shutdown: CancellationToken::new(),
            stats: UploadStats::default(),
        }
    }

    /// Use a custom validator.
    #[must_use]
    pub fn with_validator(mut self, validator: PathValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Use a custom reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.backoff = Backoff::new(config);
        self
    }

    /// Report [`SessionEvent`]s on `events`.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Stop cleanly when `shutdown` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Counters accumulated across sessions.
    #[must_use]
    pub const fn stats(&self) -> UploadStats {
        self.stats
    }

    /// Run until shutdown or a fatal failure.
    ///
    /// Returns `Ok(())` only when the shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the failure that moved the controller to
    /// [`SessionState::Terminating`]. All resources are closed by then.
    pub async fn run(&mut self) -> Result<()> {
        if self.state == SessionState::Terminating {
            return Err(Error::Internal("session controller already terminated".to_string()));
        }

        let shutdown = self.shutdown.clone();

        loop {
            self.transition(SessionState::Connecting);

            let error = tokio::select! {
                biased;

                () = shutdown.cancelled() => return self.shut_down().await,
                error = self.run_session() => error,
            };

            if !error.is_recoverable() {
                return Err(self.terminate(error).await);
            }

            tracing::warn!("Session lost: {}", error);
            self.reset(&error).await;

            let Some(delay) = self.backoff.next_delay() else {
                let exhausted = Error::RetriesExhausted {
                    attempts: self.backoff.attempts().saturating_sub(1),
                    last: Box::new(error),
                };
                return Err(self.terminate(exhausted).await);
            };

            tracing::info!("Reconnecting in {:.1}s", delay.as_secs_f64());
            tokio::select! {
                biased;

                () = shutdown.cancelled() => return self.shut_down().await,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Establish a session and serve it. Only returns on failure.
    async fn run_session(&mut self) -> Error {
        let closed = match self.establish().await {
            Ok(closed) => closed,
            Err(e) => return e,
        };

        let mut in_flight = self.start_next();

        if let Err(e) = self.feed.activate() {
            return e;
        }
        self.transition(SessionState::Active);
        self.backoff.reset();

        loop {
            tokio::select! {
                biased;

                () = closed.cancelled() => {
                    return Error::ConnectionClosed("transport closed by peer".to_string());
                }
                (task, result) = async {
                    match in_flight.as_mut() {
                        Some(upload) => upload.await,
                        None => std::future::pending().await,
                    }
                } => {
                    in_flight = None;
                    self.finish_upload(&task, &result);
                }
                event = self.feed.next_event() => match event {
                    Some(event) => self.handle_change(event),
                    None => return Error::WatcherError("change feed ended".to_string()),
                },
            }

            if in_flight.is_none() {
                in_flight = self.start_next();
            }
        }
    }

    /// Connect, open the channel and validate the remote root.
    ///
    /// Returns the close signal of the new connection.
    async fn establish(&mut self) -> Result<CancellationToken> {
        self.gateway.connect(&self.remote).await?;
        self.transition(SessionState::Establishing);

        let closed = self.gateway.closed();
        let mut session = Session::new(self.gateway.open_channel().await?);

        let validated = tokio::select! {
            biased;

            () = closed.cancelled() => {
                return Err(Error::ConnectionClosed(
                    "lost during validation".to_string(),
                ));
            }
            result = self.validator.validate(
                &session.channel,
                &self.remote.path,
                session.validated,
            ) => result,
        };

        if let Err(e) = validated {
            // A stat that failed because the connection went away is a
            // transport failure, not a verdict on the remote root.
            if e.is_recoverable() || closed.is_cancelled() {
                return Err(Error::ConnectionClosed(format!(
                    "lost during validation: {e}"
                )));
            }
            return Err(e);
        }
        session.validated = true;

        self.session = Some(session);
        Ok(closed)
    }

    fn handle_change(&mut self, event: ChangeEvent) {
        tracing::info!("{}", watcher::describe(&event, self.uploader.local_root()));

        if !event.kind.triggers_upload() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.queue.enqueue(UploadTask::new(event.path.clone()));
        let pending = session.queue.len();
        self.emit(SessionEvent::Enqueued {
            path: event.path,
            pending,
        });
    }

    /// Take the next task off the queue and start it, unless one is running.
    fn start_next(&mut self) -> Option<InFlight> {
        let session = self.session.as_mut()?;
        let DrainStep::Start(task) = session.queue.drain() else {
            return None;
        };

        let channel = session.channel.clone();
        let uploader = self.uploader.clone();
        self.emit(SessionEvent::UploadStarted {
            path: task.path.clone(),
        });

        Some(Box::pin(async move {
            let result = uploader.upload(&channel, &task).await;
            (task, result)
        }))
    }

    fn finish_upload(&mut self, task: &UploadTask, result: &Result<u64>) {
        let discarded = self
            .session
            .as_mut()
            .map_or(0, |session| session.queue.finish(result));

        match result {
            Ok(bytes) => {
                self.stats.files_uploaded += 1;
                self.stats.bytes_uploaded += bytes;
            }
            Err(_) => {
                self.stats.failures += 1;
                self.stats.discarded += discarded as u64;
                if discarded > 0 {
                    tracing::warn!("Discarded {} pending uploads after failure", discarded);
                }
            }
        }

        self.emit(SessionEvent::UploadFinished {
            path: task.path.clone(),
            success: result.is_ok(),
        });
    }

    async fn reset(&mut self, cause: &Error) {
        self.transition(SessionState::Resetting);

        let discarded = self.teardown().await;
        self.stats.resets += 1;
        self.stats.discarded += discarded as u64;

        self.emit(SessionEvent::Reset {
            reason: cause.to_string(),
            discarded,
        });
    }

    async fn terminate(&mut self, error: Error) -> Error {
        tracing::error!("Fatal: {}", error);
        self.transition(SessionState::Terminating);
        self.teardown().await;
        error
    }

    async fn shut_down(&mut self) -> Result<()> {
        tracing::info!("Shutting down");
        self.transition(SessionState::Disconnected);
        self.teardown().await;
        Ok(())
    }

    /// Close the feed and the connection and drop the session. Returns the
    /// number of pending tasks dropped with it.
    async fn teardown(&mut self) -> usize {
        self.feed.close();
        self.gateway.close().await;
        self.session
            .take()
            .map_or(0, |mut session| session.queue.clear())
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(to),
            "invalid session transition {from} -> {to}"
        );

        tracing::debug!("Session state: {} -> {}", from, to);
        self.state = to;
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

//! Common test utilities for `Upsync` integration tests.
//!
//! In-memory stand-ins for the gateway, the SFTP channel, the change feed
//! and the notifier. Each fake is cheap to clone; clones share state, so a
//! test keeps one clone as a probe and hands the other to the controller.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use upsync_core::config::RemoteConfig;
use upsync_core::notifier::{Notification, Notifier};
use upsync_core::sync::{ChangeEvent, ChangeFeed, ChangeKind, ReconnectConfig, SessionEvent};
use upsync_core::transport::{Gateway, RemoteChannel, RemoteStat};
use upsync_core::{Error, Result};

/// Local root used by every scenario.
pub const LOCAL_ROOT: &str = "/local";

/// Remote root used by every scenario.
pub const REMOTE_ROOT: &str = "/remote";

/// Connection settings matching the reference scenario.
pub fn remote_config() -> RemoteConfig {
    RemoteConfig {
        host: "h".to_string(),
        port: 22,
        username: "u".to_string(),
        password: "p".to_string(),
        path: REMOTE_ROOT.to_string(),
        keepalive: None,
    }
}

/// Backoff short enough to keep tests fast.
pub fn fast_reconnect(max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_factor: 2.0,
        max_attempts,
    }
}

/// Absolute path under [`LOCAL_ROOT`].
pub fn local(name: &str) -> PathBuf {
    Path::new(LOCAL_ROOT).join(name)
}

/// How the stat of the remote root answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatReply {
    Directory,
    File,
    Error,
    /// The sub-channel dies under the request before any close signal.
    Lost,
    Silent,
}

#[derive(Debug)]
struct ChannelState {
    stat_reply: Mutex<StatReply>,
    stat_calls: AtomicUsize,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_uploads: AtomicBool,
    gate: Option<Semaphore>,
}

/// Fake SFTP channel recording every call.
#[derive(Debug, Clone)]
pub struct FakeChannel {
    state: Arc<ChannelState>,
}

impl Default for FakeChannel {
    fn default() -> Self {
        Self::build(None)
    }
}

impl FakeChannel {
    fn build(gate: Option<Semaphore>) -> Self {
        Self {
            state: Arc::new(ChannelState {
                stat_reply: Mutex::new(StatReply::Directory),
                stat_calls: AtomicUsize::new(0),
                started: Mutex::new(Vec::new()),
                completed: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_uploads: AtomicBool::new(false),
                gate,
            }),
        }
    }

    /// A channel whose uploads block until [`FakeChannel::release`] is called.
    pub fn gated() -> Self {
        Self::build(Some(Semaphore::new(0)))
    }

    /// Let `n` blocked uploads complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(n);
        }
    }

    pub fn set_stat_reply(&self, reply: StatReply) {
        *self.state.stat_reply.lock().unwrap() = reply;
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.state.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn stat_calls(&self) -> usize {
        self.state.stat_calls.load(Ordering::SeqCst)
    }

    /// Remote paths of every upload that started.
    pub fn started(&self) -> Vec<String> {
        self.state.started.lock().unwrap().clone()
    }

    /// Remote paths of every upload that ran to completion.
    pub fn completed(&self) -> Vec<String> {
        self.state.completed.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl RemoteChannel for FakeChannel {
    async fn stat(&self, path: &str) -> Result<RemoteStat> {
        self.state.stat_calls.fetch_add(1, Ordering::SeqCst);
        let reply = *self.state.stat_reply.lock().unwrap();
        match reply {
            StatReply::Directory => Ok(RemoteStat::directory()),
            StatReply::File => Ok(RemoteStat::file(0)),
            StatReply::Error => Err(Error::RemoteUnreachable {
                path: path.to_string(),
                reason: "no such file".to_string(),
            }),
            StatReply::Lost => Err(Error::ConnectionClosed("channel closed".to_string())),
            StatReply::Silent => std::future::pending().await,
        }
    }

    async fn upload(&self, _local: &Path, remote: &str) -> Result<u64> {
        self.state.started.lock().unwrap().push(remote.to_string());
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.state.gate {
            gate.acquire().await.unwrap().forget();
        }
        tokio::task::yield_now().await;

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.state.fail_uploads.load(Ordering::SeqCst) {
            return Err(Error::UploadFailed {
                path: remote.to_string(),
                reason: "permission denied".to_string(),
            });
        }

        self.state.completed.lock().unwrap().push(remote.to_string());
        Ok(remote.len() as u64)
    }
}

/// Scripted outcome of one connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Ready,
    Refused,
    AuthRejected,
    ChannelRejected,
}

#[derive(Debug, Default)]
struct GatewayState {
    script: Mutex<VecDeque<ConnectOutcome>>,
    reject_channel: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    current: Mutex<CancellationToken>,
}

/// Fake gateway. Connects succeed unless scripted otherwise.
#[derive(Debug, Clone)]
pub struct FakeGateway {
    channel: FakeChannel,
    state: Arc<GatewayState>,
}

impl FakeGateway {
    pub fn new(channel: FakeChannel) -> Self {
        Self {
            channel,
            state: Arc::new(GatewayState::default()),
        }
    }

    /// Outcomes for the next connect attempts, in order. Once the script
    /// runs out, connects succeed.
    pub fn script(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        self.state.script.lock().unwrap().extend(outcomes);
    }

    /// Drop the live connection as if the peer went away.
    pub fn kill(&self) {
        self.state.current.lock().unwrap().cancel();
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

impl Gateway for FakeGateway {
    type Channel = FakeChannel;

    async fn connect(&mut self, config: &RemoteConfig) -> Result<()> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .state
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ConnectOutcome::Ready);

        self.state
            .reject_channel
            .store(outcome == ConnectOutcome::ChannelRejected, Ordering::SeqCst);

        match outcome {
            ConnectOutcome::Refused => Err(Error::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                reason: "connection refused".to_string(),
            }),
            ConnectOutcome::AuthRejected => {
                Err(Error::AuthenticationFailed(config.username.clone()))
            }
            ConnectOutcome::Ready | ConnectOutcome::ChannelRejected => {
                *self.state.current.lock().unwrap() = CancellationToken::new();
                Ok(())
            }
        }
    }

    async fn open_channel(&mut self) -> Result<FakeChannel> {
        if self.state.reject_channel.load(Ordering::SeqCst) {
            return Err(Error::ChannelUnavailable("subsystem request denied".to_string()));
        }
        Ok(self.channel.clone())
    }

    fn closed(&self) -> CancellationToken {
        self.state.current.lock().unwrap().clone()
    }

    async fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.current.lock().unwrap().cancel();
    }
}

/// Fake change feed driven through a [`FeedHandle`].
///
/// The feed keeps a sender of its own, so it only ends when the handle
/// calls [`FeedHandle::end`], not when the handle is dropped.
///
/// Like the real watcher, it drops anything sent while it was closed.
#[derive(Debug)]
pub struct FakeFeed {
    rx: mpsc::UnboundedReceiver<Option<ChangeEvent>>,
    _tx: mpsc::UnboundedSender<Option<ChangeEvent>>,
    active: Arc<AtomicBool>,
    activations: Arc<AtomicUsize>,
    fail_activation: bool,
}

/// Test side of a [`FakeFeed`].
#[derive(Debug, Clone)]
pub struct FeedHandle {
    tx: mpsc::UnboundedSender<Option<ChangeEvent>>,
    active: Arc<AtomicBool>,
    activations: Arc<AtomicUsize>,
}

impl FakeFeed {
    pub fn new() -> (Self, FeedHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(false));
        let activations = Arc::new(AtomicUsize::new(0));

        let feed = Self {
            rx,
            _tx: tx.clone(),
            active: Arc::clone(&active),
            activations: Arc::clone(&activations),
            fail_activation: false,
        };
        let handle = FeedHandle {
            tx,
            active,
            activations,
        };
        (feed, handle)
    }

    /// A feed whose activation always fails.
    pub fn broken() -> (Self, FeedHandle) {
        let (mut feed, handle) = Self::new();
        feed.fail_activation = true;
        (feed, handle)
    }
}

impl ChangeFeed for FakeFeed {
    fn activate(&mut self) -> Result<()> {
        if self.fail_activation {
            return Err(Error::WatcherError("inotify limit reached".to_string()));
        }
        while self.rx.try_recv().is_ok() {}
        self.active.store(true, Ordering::SeqCst);
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChangeEvent> {
        if !self.active.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        self.rx.recv().await.flatten()
    }

    fn close(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl FeedHandle {
    /// Emit a change for `name` under [`LOCAL_ROOT`].
    pub fn emit(&self, kind: ChangeKind, name: &str) {
        self.tx
            .send(Some(ChangeEvent::new(kind, local(name))))
            .expect("feed dropped");
    }

    /// End the stream, as a watcher whose backend died would.
    pub fn end(&self) {
        self.tx.send(None).expect("feed dropped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

/// Notifier that keeps everything it was given.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.seen.lock().unwrap().push(notification.clone());
    }
}

/// Wait for the first event matching `pred`, skipping others.
pub async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return event;
            }
        }
        panic!("session event channel closed");
    })
    .await
    .expect("timed out waiting for session event")
}

/// Wait until the controller reaches `state`.
pub async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    state: upsync_core::sync::SessionState,
) {
    wait_for(events, |e| matches!(e, SessionEvent::StateChanged { to, .. } if *to == state)).await;
}

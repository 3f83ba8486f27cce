//! Upload queue with a single transfer in flight.
//!
//! Producers only ever append with [`UploadQueue::enqueue`]. The session
//! loop is the only consumer: it calls [`UploadQueue::drain`] to take the
//! next task, runs it through an [`Uploader`], and reports the outcome with
//! [`UploadQueue::finish`]. The `processing` flag is set exactly while a
//! transfer handed out by `drain` has not been finished.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::UploadTask;
use crate::notifier::{Notification, Notifier};
use crate::transport::RemoteChannel;
use crate::Result;

/// Outcome of a drain attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStep {
    /// A transfer is already in flight; nothing was taken.
    Busy,
    /// The queue is empty.
    Idle,
    /// Start this transfer and report back through [`UploadQueue::finish`].
    Start(UploadTask),
}

/// FIFO of pending uploads. Duplicates are kept.
#[derive(Debug, Default)]
pub struct UploadQueue {
    pending: VecDeque<UploadTask>,
    processing: bool,
}

impl UploadQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the tail.
    pub fn enqueue(&mut self, task: UploadTask) {
        self.pending.push_back(task);
    }

    /// Take the head task if no transfer is in flight.
    ///
    /// Calling this while a transfer is in flight changes nothing.
    pub fn drain(&mut self) -> DrainStep {
        if self.processing {
            return DrainStep::Busy;
        }

        match self.pending.pop_front() {
            Some(task) => {
                self.processing = true;
                DrainStep::Start(task)
            }
            None => {
                self.processing = false;
                DrainStep::Idle
            }
        }
    }

    /// Record the outcome of the in-flight transfer.
    ///
    /// A failure discards every pending task. Returns how many were
    /// discarded.
    pub fn finish<T>(&mut self, outcome: &Result<T>) -> usize {
        self.processing = false;
        if outcome.is_err() {
            self.clear()
        } else {
            0
        }
    }

    /// Drop every pending task and the in-flight marker. Returns how many
    /// pending tasks were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.processing = false;
        dropped
    }

    /// Whether a transfer is in flight.
    #[must_use]
    pub const fn is_processing(&self) -> bool {
        self.processing
    }

    /// Number of pending tasks, not counting the one in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no tasks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending tasks in upload order.
    pub fn iter(&self) -> impl Iterator<Item = &UploadTask> {
        self.pending.iter()
    }
}

/// Performs a single upload and reports it.
///
/// Maps the local path to the remote root, preserving the directory
/// structure, and emits one notification per attempt.
#[derive(Clone)]
pub struct Uploader {
    local_root: PathBuf,
    remote_root: String,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("local_root", &self.local_root)
            .field("remote_root", &self.remote_root)
            .finish_non_exhaustive()
    }
}

impl Uploader {
    /// Create an uploader for files under `local_root`.
    pub fn new(
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            notifier,
        }
    }

    /// The local working root.
    #[must_use]
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Path shown to the user for `task`: relative to the local root when
    /// possible, otherwise as given.
    #[must_use]
    pub fn display_path(&self, task: &UploadTask) -> String {
        task.relative_to(&self.local_root).map_or_else(
            |_| task.path.display().to_string(),
            |rel| rel.as_str().to_string(),
        )
    }

    /// Upload `task` over `channel`.
    ///
    /// Returns the number of bytes written.
    pub async fn upload<C: RemoteChannel>(&self, channel: &C, task: &UploadTask) -> Result<u64> {
        let shown = self.display_path(task);
        let result = self.transfer(channel, task).await;

        match &result {
            Ok(bytes) => {
                tracing::info!(bytes = *bytes, "Uploaded {}", task.path.display());
                self.notifier.notify(&Notification::upload_success(&shown));
            }
            Err(e) => {
                tracing::warn!("Upload of {} failed: {}", task.path.display(), e);
                self.notifier.notify(&Notification::upload_error(&shown));
            }
        }

        result
    }

    async fn transfer<C: RemoteChannel>(&self, channel: &C, task: &UploadTask) -> Result<u64> {
        let relative = task.relative_to(&self.local_root)?;
        let remote = relative.to_remote(&self.remote_root);

        tracing::info!("Uploading {} ...", task.path.display());
        channel.upload(&task.path, &remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RemoteStat;
    use crate::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Notification>>);

    impl Notifier for Recorder {
        fn notify(&self, notification: &Notification) {
            self.0.lock().unwrap().push(notification.clone());
        }
    }

    #[derive(Clone, Default)]
    struct RecordingChannel {
        fail: bool,
        uploads: Arc<Mutex<Vec<(PathBuf, String)>>>,
    }

    impl RemoteChannel for RecordingChannel {
        async fn stat(&self, _path: &str) -> Result<RemoteStat> {
            Ok(RemoteStat::directory())
        }

        async fn upload(&self, local: &Path, remote: &str) -> Result<u64> {
            self.uploads
                .lock()
                .unwrap()
                .push((local.to_path_buf(), remote.to_string()));
            if self.fail {
                Err(Error::UploadFailed {
                    path: remote.to_string(),
                    reason: "permission denied".to_string(),
                })
            } else {
                Ok(11)
            }
        }
    }

    fn task(path: &str) -> UploadTask {
        UploadTask::new(path)
    }

    #[test]
    fn test_drain_is_fifo() {
        let mut queue = UploadQueue::new();
        queue.enqueue(task("/l/a"));
        queue.enqueue(task("/l/b"));
        queue.enqueue(task("/l/c"));

        let mut order = Vec::new();
        while let DrainStep::Start(t) = queue.drain() {
            order.push(t.path);
            queue.finish(&Ok::<(), Error>(()));
        }

        assert_eq!(
            order,
            vec![
                PathBuf::from("/l/a"),
                PathBuf::from("/l/b"),
                PathBuf::from("/l/c")
            ]
        );
        assert!(!queue.is_processing());
    }

    #[test]
    fn test_drain_while_processing_is_noop() {
        let mut queue = UploadQueue::new();
        queue.enqueue(task("/l/a"));
        queue.enqueue(task("/l/b"));

        assert_eq!(queue.drain(), DrainStep::Start(task("/l/a")));
        assert!(queue.is_processing());

        assert_eq!(queue.drain(), DrainStep::Busy);
        assert_eq!(queue.drain(), DrainStep::Busy);
        assert_eq!(queue.len(), 1);
        assert!(queue.is_processing());
    }

    #[test]
    fn test_drain_empty_clears_processing() {
        let mut queue = UploadQueue::new();
        assert_eq!(queue.drain(), DrainStep::Idle);
        assert!(!queue.is_processing());
    }

    #[test]
    fn test_duplicates_are_kept() {
        let mut queue = UploadQueue::new();
        queue.enqueue(task("/l/a"));
        queue.enqueue(task("/l/a"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.iter().filter(|t| t.path == Path::new("/l/a")).count(), 2);
    }

    #[test]
    fn test_enqueue_during_transfer_lands_at_tail() {
        let mut queue = UploadQueue::new();
        queue.enqueue(task("/l/a"));
        assert_eq!(queue.drain(), DrainStep::Start(task("/l/a")));

        queue.enqueue(task("/l/b"));
        assert_eq!(queue.drain(), DrainStep::Busy);

        queue.finish(&Ok::<u64, Error>(1));
        assert_eq!(queue.drain(), DrainStep::Start(task("/l/b")));
    }

    #[test]
    fn test_failure_discards_pending() {
        let mut queue = UploadQueue::new();
        queue.enqueue(task("/l/a"));
        queue.enqueue(task("/l/b"));
        queue.enqueue(task("/l/c"));

        assert!(matches!(queue.drain(), DrainStep::Start(_)));
        let discarded = queue.finish(&Err::<u64, Error>(Error::Internal("boom".into())));

        assert_eq!(discarded, 2);
        assert!(queue.is_empty());
        assert!(!queue.is_processing());
        assert_eq!(queue.drain(), DrainStep::Idle);
    }

    #[tokio::test]
    async fn test_uploader_maps_remote_path_and_notifies() {
        let recorder = Arc::new(Recorder::default());
        let uploader = Uploader::new("/local", "/remote", recorder.clone());
        let channel = RecordingChannel::default();

        let bytes = uploader
            .upload(&channel, &task("/local/css/site.css"))
            .await
            .unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(
            channel.uploads.lock().unwrap().as_slice(),
            &[(
                PathBuf::from("/local/css/site.css"),
                "/remote/css/site.css".to_string()
            )]
        );
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[Notification::upload_success("css/site.css")]
        );
    }

    #[tokio::test]
    async fn test_uploader_failure_notifies_error() {
        let recorder = Arc::new(Recorder::default());
        let uploader = Uploader::new("/local", "/remote", recorder.clone());
        let channel = RecordingChannel {
            fail: true,
            ..Default::default()
        };

        let result = uploader.upload(&channel, &task("/local/a.txt")).await;

        assert!(matches!(result, Err(Error::UploadFailed { .. })));
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[Notification::upload_error("a.txt")]
        );
    }

    #[tokio::test]
    async fn test_uploader_rejects_path_outside_root() {
        let recorder = Arc::new(Recorder::default());
        let uploader = Uploader::new("/local", "/remote", recorder.clone());
        let channel = RecordingChannel::default();

        let result = uploader.upload(&channel, &task("/elsewhere/a.txt")).await;

        assert!(matches!(result, Err(Error::InvalidPath(_))));
        assert!(channel.uploads.lock().unwrap().is_empty());
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
        assert!(recorder.0.lock().unwrap()[0].is_error());
    }
}

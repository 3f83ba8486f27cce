//! File system watching for the local root.
//!
//! This module provides cross-platform file system watching using the `notify` crate.
//! It handles:
//! - Translating raw notify events into added / changed / deleted events
//! - Pattern-based exclusion of ignored paths
//! - Re-arming after a session reset without leaking stale events
//!
//! Events are not debounced or coalesced: an editor that writes a file
//! twice produces two events and therefore two uploads.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::RelativePath;
use crate::{Error, Result};

/// Kind of change reported by a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File appeared
    Added,
    /// File content changed
    Changed,
    /// File disappeared
    Deleted,
}

impl ChangeKind {
    /// Lowercase name used in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Deleted => "deleted",
        }
    }

    /// Whether this kind of change schedules an upload.
    #[must_use]
    pub const fn triggers_upload(self) -> bool {
        matches!(self, Self::Added | Self::Changed)
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change under the local root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Type of change
    pub kind: ChangeKind,
    /// Absolute local path
    pub path: PathBuf,
}

impl ChangeEvent {
    /// Create an event.
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Source of change events that can be switched on and off.
///
/// The session controller activates the feed once a session is established
/// and closes it on every reset. A closed feed yields nothing until it is
/// activated again, and events seen while closed are dropped.
pub trait ChangeFeed: Send {
    /// Start producing events.
    fn activate(&mut self) -> Result<()>;

    /// Wait for the next event. Returns `None` if the feed has ended.
    fn next_event(&mut self) -> impl Future<Output = Option<ChangeEvent>> + Send;

    /// Stop producing events. Idempotent.
    fn close(&mut self);
}

/// Watches the local root recursively.
///
/// # Example
///
/// ```rust,ignore
/// let mut watcher = FileWatcher::new("/path/to/site", &["*.log".to_string()])?;
/// watcher.activate()?;
///
/// while let Some(event) = watcher.next_event().await {
///     println!("{}: {}", event.kind, event.path.display());
/// }
/// ```
pub struct FileWatcher {
    root: PathBuf,
    matcher: Arc<PatternMatcher>,
    watcher: Option<RecommendedWatcher>,
    event_rx: Option<mpsc::UnboundedReceiver<ChangeEvent>>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root)
            .field("active", &self.watcher.is_some())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Create a watcher for `root`, skipping paths that match `ignore`.
    ///
    /// The watcher is created inactive. Call [`ChangeFeed::activate`] to
    /// begin watching.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The root directory doesn't exist
    /// - An ignore pattern is not a valid glob
    pub fn new(root: impl Into<PathBuf>, ignore: &[String]) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::DirectoryNotFound(root.display().to_string()));
        }

        Ok(Self {
            root,
            matcher: Arc::new(PatternMatcher::new(ignore)?),
            watcher: None,
            event_rx: None,
        })
    }

    /// The watched root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the watcher is currently producing events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Convert a notify event into change events, applying the ignore list.
    fn translate(root: &Path, matcher: &PatternMatcher, event: &Event) -> Vec<ChangeEvent> {
        let kinds: Vec<(ChangeKind, &PathBuf)> = match &event.kind {
            EventKind::Create(_) => event.paths.iter().map(|p| (ChangeKind::Added, p)).collect(),
            EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                event.paths.iter().map(|p| (ChangeKind::Deleted, p)).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                event.paths.iter().map(|p| (ChangeKind::Added, p)).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut out = Vec::new();
                if let Some(from) = event.paths.first() {
                    out.push((ChangeKind::Deleted, from));
                }
                if let Some(to) = event.paths.get(1) {
                    out.push((ChangeKind::Added, to));
                }
                out
            }
            EventKind::Modify(_) => event.paths.iter().map(|p| (ChangeKind::Changed, p)).collect(),
            EventKind::Remove(_) => event.paths.iter().map(|p| (ChangeKind::Deleted, p)).collect(),
            _ => return Vec::new(), // Ignore access and other event types
        };

        kinds
            .into_iter()
            .filter(|(kind, path)| should_process_file(root, matcher, path, *kind))
            .map(|(kind, path)| ChangeEvent::new(kind, path.clone()))
            .collect()
    }
}

impl ChangeFeed for FileWatcher {
    fn activate(&mut self) -> Result<()> {
        self.close();

        // A fresh channel per activation: anything still in flight from an
        // earlier watcher goes to a dropped receiver.
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let root = self.root.clone();
        let matcher = Arc::clone(&self.matcher);

        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                for change in Self::translate(&root, &matcher, &event) {
                    let _ = event_tx.send(change);
                }
            }
            Err(e) => tracing::warn!("Error handling file event: {}", e),
        })
        .map_err(|e| Error::WatcherError(e.to_string()))?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| Error::WatcherError(e.to_string()))?;

        tracing::info!("Watching for changes in {}", self.root.display());
        self.watcher = Some(watcher);
        self.event_rx = Some(event_rx);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChangeEvent> {
        match self.event_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    fn close(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.root) {
                tracing::debug!("Unwatch failed: {}", e);
            }
        }
        self.event_rx = None;
    }
}

/// Check if a path should be reported based on ignore patterns and kind.
fn should_process_file(root: &Path, matcher: &PatternMatcher, path: &Path, kind: ChangeKind) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };

    if matcher.is_excluded(relative) {
        tracing::debug!("Skipping ignored path: {}", relative.display());
        return false;
    }

    // For deletions, no need to check file metadata
    if kind == ChangeKind::Deleted {
        return true;
    }

    path.is_file()
}

/// Pattern matcher for ignored paths.
struct PatternMatcher {
    set: globset::GlobSet,
}

impl PatternMatcher {
    /// Create a new pattern matcher from glob patterns.
    fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = globset::GlobSetBuilder::new();

        for pattern in patterns {
            let glob = globset::Glob::new(pattern)
                .map_err(|e| Error::InvalidPath(format!("Invalid glob pattern: {e}")))?;
            builder.add(glob);
        }

        let set = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build glob set: {e}")))?;

        Ok(Self { set })
    }

    /// Check if a relative path, or any directory above it, is ignored.
    fn is_excluded(&self, relative: &Path) -> bool {
        relative
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.set.is_match(p))
    }
}

/// Log line for an event, with the path relative to `root`.
pub(crate) fn describe(event: &ChangeEvent, root: &Path) -> String {
    let shown = RelativePath::from_absolute(&event.path, root).map_or_else(
        |_| event.path.display().to_string(),
        |rel| rel.as_str().to_string(),
    );
    format!("{}: {}", event.kind, shown)
}

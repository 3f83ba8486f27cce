//! User-facing upload notifications.
//!
//! Every upload attempt produces one [`Notification`]. Delivery is handled by
//! a [`Notifier`]: [`LogNotifier`] writes to the log, [`DesktopNotifier`]
//! additionally hands the notification to the platform's notification tool.

use std::process::Stdio;

use tokio::process::Command;

/// Title used when a transfer completes.
pub const UPLOAD_SUCCESS_TITLE: &str = "Upload Success";

/// Title used when a transfer fails.
pub const UPLOAD_ERROR_TITLE: &str = "Upload Error";

/// A single notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Short heading
    pub title: String,
    /// Body text, the file path relative to the local root
    pub message: String,
}

impl Notification {
    /// Notification for a successful upload of `relative_path`.
    #[must_use]
    pub fn upload_success(relative_path: &str) -> Self {
        Self {
            title: UPLOAD_SUCCESS_TITLE.to_string(),
            message: relative_path.to_string(),
        }
    }

    /// Notification for a failed upload of `relative_path`.
    #[must_use]
    pub fn upload_error(relative_path: &str) -> Self {
        Self {
            title: UPLOAD_ERROR_TITLE.to_string(),
            message: relative_path.to_string(),
        }
    }

    /// Whether this reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.title == UPLOAD_ERROR_TITLE
    }
}

/// Sink for notifications.
///
/// Implementations must not block for long: they are called from the
/// session loop between uploads.
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Delivery failures are swallowed.
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        if notification.is_error() {
            tracing::warn!(title = %notification.title, "{}", notification.message);
        } else {
            tracing::info!(title = %notification.title, "{}", notification.message);
        }
    }
}

/// Shows notifications on the desktop.
///
/// Uses `notify-send` on Linux and BSD, `osascript` on macOS. Other
/// platforms, or a missing tool, fall back to the log.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    /// Create a notifier that labels notifications with `app_name`.
    #[must_use]
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    fn command(&self, notification: &Notification) -> Option<Command> {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification {} with title {}",
                applescript_quote(&notification.message),
                applescript_quote(&format!("{} {}", self.app_name, notification.title)),
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            Some(cmd)
        } else if cfg!(unix) {
            let mut cmd = Command::new("notify-send");
            cmd.arg("--app-name")
                .arg(&self.app_name)
                .arg(&notification.title)
                .arg(&notification.message);
            Some(cmd)
        } else {
            None
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, notification: &Notification) {
        LogNotifier.notify(notification);

        let Some(mut cmd) = self.command(notification) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("Desktop notification skipped outside the runtime");
            return;
        };

        match cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(mut child) => {
                runtime.spawn(async move {
                    match child.wait().await {
                        Ok(status) if !status.success() => {
                            tracing::debug!("Notification tool exited with {}", status);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!("Notification tool wait failed: {}", e),
                    }
                });
            }
            Err(e) => tracing::debug!("Desktop notification unavailable: {}", e),
        }
    }
}

fn applescript_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

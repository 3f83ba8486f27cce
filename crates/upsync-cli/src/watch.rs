//! Wiring for the watch-and-upload loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use upsync_core::config::Config;
use upsync_core::notifier::{DesktopNotifier, LogNotifier, Notifier};
use upsync_core::sync::{FileWatcher, PathValidator, SessionController, Uploader};
use upsync_core::transport::ssh::SshGateway;
use upsync_core::Error;

use crate::cli::Cli;
use crate::ui;

/// Load the configuration, connect and upload changes until Ctrl+C.
///
/// Exits the process with status 1 on a missing configuration field or a
/// fatal session failure.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("upsync v{}", upsync_core::VERSION);

    let root = resolve_root(cli.root.as_ref())?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| Config::default_path(&root));

    let config = Config::load(&config_path)?;
    let remote = match config.validate() {
        Ok(remote) => remote,
        Err(Error::MissingField(field)) => {
            eprintln!("{}", ui::missing_field_message(field));
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        "Syncing {} -> {}@{}:{}",
        root.display(),
        remote.username,
        remote.host,
        remote.path
    );

    let notifier: Arc<dyn Notifier> = if config.notify && !cli.no_notify {
        Arc::new(DesktopNotifier::new("upsync"))
    } else {
        Arc::new(LogNotifier)
    };

    let feed = FileWatcher::new(&root, &config.ignore)?;
    let uploader = Uploader::new(&root, remote.path.clone(), notifier);

    let shutdown = CancellationToken::new();
    spawn_ctrl_c(shutdown.clone());

    let mut controller = SessionController::new(remote, SshGateway::new(), feed, uploader)
        .with_validator(PathValidator::new(config.validate_timeout()))
        .with_reconnect(config.reconnect)
        .with_shutdown(shutdown);

    match controller.run().await {
        Ok(()) => {
            println!("{}", ui::format_summary(&controller.stats()));
            Ok(())
        }
        Err(e) => {
            ui::handle_error(&e);
            std::process::exit(1);
        }
    }
}

fn resolve_root(root: Option<&PathBuf>) -> anyhow::Result<PathBuf> {
    let root = match root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Cannot determine current directory")?,
    };

    let root = root
        .canonicalize()
        .with_context(|| format!("Cannot access directory '{}'", root.display()))?;

    if !root.is_dir() {
        anyhow::bail!("Not a directory: {}", root.display());
    }
    Ok(root)
}

fn spawn_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl+C: {}", e);
            return;
        }
        shutdown.cancel();
    });
}

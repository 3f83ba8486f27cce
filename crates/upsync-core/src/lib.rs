//! # Upsync Core Library
//!
//! `upsync-core` provides the core functionality for Upsync, an agent that
//! watches a local directory and uploads every created or modified file to
//! a remote directory over SFTP.
//!
//! ## Features
//!
//! - **Ordered uploads**: One transfer at a time, in the order changes were seen
//! - **Self-healing sessions**: Transport failures trigger a full reconnect with backoff
//! - **Strict validation**: The remote root is checked once per session, with a timeout
//! - **Ignore patterns**: Glob-based exclusion of local paths
//!
//! ## Modules
//!
//! - [`config`] - Configuration loading and validation
//! - [`notifier`] - Upload notifications
//! - [`sync`] - Change feed, upload queue and the session state machine
//! - [`transport`] - SSH connection and SFTP channel
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use upsync_core::config::Config;
//! use upsync_core::notifier::LogNotifier;
//! use upsync_core::sync::{FileWatcher, SessionController, Uploader};
//! use upsync_core::transport::ssh::SshGateway;
//!
//! let config = Config::load("sftp.json".as_ref())?;
//! let remote = config.validate()?;
//!
//! let feed = FileWatcher::new(&root, &config.ignore)?;
//! let uploader = Uploader::new(&root, &remote.path, Arc::new(LogNotifier));
//! let mut controller = SessionController::new(remote, SshGateway::new(), feed, uploader);
//! controller.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod notifier;
pub mod sync;
pub mod transport;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default wait for the remote root stat reply, in seconds
pub const DEFAULT_VALIDATE_TIMEOUT_SECS: u64 = 10;

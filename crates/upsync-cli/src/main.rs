//! Upsync CLI - watch a local directory and upload changes over SFTP
//!
//! Reads connection settings from `sftp.json` in the working directory and
//! uploads every created or modified file to the configured remote path,
//! reconnecting on its own when the connection drops.
//!
//! ## Quick Start
//!
//! ```bash
//! # Watch the current directory
//! upsync
//!
//! # Watch another directory with an explicit config file
//! upsync --root ./site --config ./deploy/sftp.json
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod cli;
mod ui;
mod watch;

use cli::{Cli, Verbosity};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    watch::run(cli).await
}

fn init_logging(verbosity: Verbosity) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

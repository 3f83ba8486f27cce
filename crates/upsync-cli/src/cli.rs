//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Upsync - watch a directory and upload changes over SFTP
#[derive(Parser, Debug)]
#[command(name = "upsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to sftp.json in the local root)
    #[arg(short, long, env = "UPSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Local directory to watch (defaults to the current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Log upload results instead of showing desktop notifications
    #[arg(long)]
    pub no_notify: bool,

    /// Detailed logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Log level selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// Filter used when `RUST_LOG` is not set.
    pub const fn default_filter(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "warn,upsync=info,upsync_core=info",
            Self::Verbose => "warn,upsync=debug,upsync_core=debug",
        }
    }
}

impl Cli {
    pub const fn verbosity(&self) -> Verbosity {
        if self.verbose {
            Verbosity::Verbose
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }
}

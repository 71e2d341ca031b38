//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mox_core::{AccessTier, AssetFormat};

/// Download manga series from mox.moe as e-books.
#[derive(Parser, Debug)]
#[command(name = "mox")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the TOML config file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored log output (also honored: NO_COLOR, TERM=dumb)
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download every volume of a series
    #[command(visible_alias = "dl")]
    Download(DownloadArgs),

    /// Show a series' title, authors and volumes
    Info(InfoArgs),
}

/// Arguments of `mox download`.
#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// Series ID (the number in /c/{id}.htm)
    #[arg(short, long)]
    pub id: u64,

    /// Asset format: epub or mobi (overrides config)
    #[arg(long)]
    pub format: Option<AssetFormat>,

    /// Access tier: vip or vip2 (overrides config)
    #[arg(long)]
    pub tier: Option<AccessTier>,

    /// Maximum concurrent downloads (overrides config)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub transfers: Option<u16>,
}

/// Arguments of `mox info`.
#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// Series ID (the number in /c/{id}.htm)
    #[arg(short, long)]
    pub id: u64,
}

impl Args {
    /// Default log level from `-q`/`-v`; `RUST_LOG` still takes precedence.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// bengal-core CLI: build, serve, and validate a content site.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Content directory path (relative to project root)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub content: Option<PathBuf>,

    /// Output directory path (relative to project root)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Config file path (default: bengal.toml)
    #[arg(short = 'C', long, default_value = "bengal.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the site
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Start the dev-server watcher and rebuild on change
    #[command(visible_alias = "s")]
    Serve {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Validate content frontmatter against declared collection schemas
    #[command(visible_alias = "v")]
    Validate {
        #[command(flatten)]
        args: ValidateArgs,
    },
}

/// Shared build arguments for `build` and `serve`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Force a full rebuild, bypassing the incremental change detector
    #[arg(long, conflicts_with = "incremental")]
    pub force: bool,

    /// Use the incremental change detector (default)
    #[arg(long)]
    pub incremental: bool,

    /// Render pages across a worker pool
    #[arg(long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Render pages on a single thread
    #[arg(long)]
    pub sequential: bool,

    /// Worker pool size (default: from config)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Verbose (debug-level) logging
    #[arg(short = 'V', long)]
    pub verbose: bool,

    /// Paths the dev-server watcher observed changing since the last
    /// build; not a CLI flag, set by `serve` to force these into the
    /// change detector's `forced_changed` set regardless of fingerprint.
    #[arg(skip)]
    pub forced_paths: Vec<String>,
}

/// Validate command arguments.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Files or directories to validate. If omitted, validates all content.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Treat validation failures as warnings instead of errors
    #[arg(long, short = 'w')]
    pub warn_only: bool,
}

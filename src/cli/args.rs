//! Command-line interface definitions.

use clap::{ColorChoice, Parser};
use std::path::PathBuf;

/// Keep a handful of git-hosted workers running the latest pushed code
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,

    /// Log to the console instead of the configured log file
    #[arg(short, long)]
    pub console: bool,

    /// Enable debug log lines
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file path (default: warden.toml)
    #[arg(short = 'C', long, default_value = "warden.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Seconds between poll cycles (overrides `supervisor.poll_interval`)
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Deployment root (overrides `supervisor.base_dir`)
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub base_dir: Option<PathBuf>,
}

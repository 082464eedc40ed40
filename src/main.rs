//! Warden - keeps git-hosted workers running the latest pushed code.

mod cli;
mod config;
mod controller;
mod core;
mod deploy;
mod freshness;
mod logger;
mod process;
mod sync;
mod utils;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::Cli;
use config::WardenConfig;
use controller::{Controller, SleepTicker};
use deploy::Materializer;
use process::{LaunchPolicy, ProcessManager, SystemProcessTable};
use std::fs;
use sync::{GitCli, Synchronizer};

fn main() -> Result<()> {
    // Setup global Ctrl+C / SIGTERM handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = WardenConfig::load(&cli)?;
    init_sink(&cli, &config);
    print_banner(&config);

    let sup = &config.supervisor;
    fs::create_dir_all(&sup.base_dir)
        .with_context(|| format!("Failed to create base directory {}", sup.base_dir.display()))?;

    let processes = ProcessManager::new(SystemProcessTable::new(), config.state_dir())
        .with_stop_timeout(sup.stop_timeout())
        .with_policy(LaunchPolicy::from_grace(sup.launch_grace()));

    let mut controller = Controller::new(
        config.units(),
        Synchronizer::new(GitCli::new(&sup.git)),
        Materializer::new(sup.exclude.iter().cloned()),
        processes,
    )
    .with_gate(sup.restart_on)
    .with_poll_interval(sup.poll_interval());

    controller.run(&mut SleepTicker::new())
}

/// Console with `-c`, the configured log file otherwise.
fn init_sink(cli: &Cli, config: &WardenConfig) {
    if cli.console {
        logger::init_console();
        return;
    }
    let path = &config.supervisor.log_file;
    if let Err(e) = logger::init_file(path) {
        logger::init_console();
        warn!("warden"; "cannot open log file {}: {}, logging to console", path.display(), e);
    }
}

fn print_banner(config: &WardenConfig) {
    log!("warden"; "warden {} on {} ({})",
        env!("CARGO_PKG_VERSION"), std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(cwd) = std::env::current_dir() {
        log!("warden"; "working directory {}", cwd.display());
    }
    log!("warden"; "arguments {:?}", std::env::args().skip(1).collect::<Vec<_>>());
    log!("warden"; "config {}", config.config_path.display());
    log!("warden"; "base directory {}, polling every {}s",
        config.supervisor.base_dir.display(), config.supervisor.poll_interval);
    for unit in config.units() {
        log!("warden"; "unit {} from {} runs `{}` in {}",
            unit.name, unit.remote, unit.launch, unit.live_dir.display());
    }
}

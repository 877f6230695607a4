//! Multidevice Player - plays sound files on a chosen output device.

use clap::Parser;
use multidevice_player::cli;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("multidevice_player=info".parse()?))
        .init();

    cli::run_command(&args)
}

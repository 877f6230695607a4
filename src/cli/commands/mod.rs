//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `devices`: driver listing and file info
//! - `play`: playback with fades

mod devices;
mod play;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::AudioContext;
use crate::config::{self, Config};

pub use devices::{cmd_devices, cmd_info};
pub use play::{PlayOptions, cmd_play};

/// Multidevice Player CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the one in the OS config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory relative sound names resolve against
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which output device to use
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Output device index (see `devices`)
    #[arg(short, long, conflicts_with = "device_name")]
    pub device: Option<usize>,

    /// Output device name, or part of it
    #[arg(short = 'n', long)]
    pub device_name: Option<String>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// List output devices
    Devices,
    /// Load a sound file and show its length
    Info {
        /// Sound file, relative to the data directory or absolute
        file: String,
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Play a sound file on one device
    Play {
        /// Sound file, relative to the data directory or absolute
        file: String,
        #[command(flatten)]
        device: DeviceArgs,
        /// Volume (1.0 = unity gain)
        #[arg(long)]
        volume: Option<f32>,
        /// Pan from 0.0 (left) to 1.0 (right)
        #[arg(long)]
        pan: Option<f32>,
        /// Speed multiplier
        #[arg(long)]
        speed: Option<f32>,
        /// Loop until stopped
        #[arg(short, long = "loop")]
        looping: bool,
        /// Decode while playing instead of up front
        #[arg(long)]
        stream: bool,
        /// Start silent and fade in
        #[arg(long)]
        fade_in: bool,
        /// Start fading out after this many milliseconds
        #[arg(long)]
        fade_out_after: Option<u64>,
        /// Fade duration in milliseconds
        #[arg(long)]
        fade_ms: Option<u64>,
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f32>,
    },
}

/// Run the parsed command
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = Some(dir.clone());
    }

    let ctx = AudioContext::from_config(&config)?;

    match &cli.command {
        Commands::Devices => cmd_devices(&ctx),
        Commands::Info { file, device } => cmd_info(&ctx, file, &DeviceTarget::resolve(device, &config)),
        Commands::Play {
            file,
            device,
            volume,
            pan,
            speed,
            looping,
            stream,
            fade_in,
            fade_out_after,
            fade_ms,
            seconds,
        } => {
            let options = PlayOptions {
                volume: *volume,
                pan: *pan,
                speed: *speed,
                looping: *looping,
                stream: *stream,
                fade_in: *fade_in,
                fade_out_after_ms: *fade_out_after,
                fade_ms: *fade_ms,
                seconds: *seconds,
            };
            cmd_play(&ctx, file, &DeviceTarget::resolve(device, &config), &options)
        }
    }
}

/// A device picked on the command line or in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    Index(usize),
    Name(String),
}

impl DeviceTarget {
    /// Command line wins over config; a configured name wins over the
    /// configured index.
    pub fn resolve(args: &DeviceArgs, config: &Config) -> Self {
        if let Some(index) = args.device {
            return Self::Index(index);
        }
        if let Some(name) = &args.device_name {
            return Self::Name(name.clone());
        }
        match &config.audio.device_name {
            Some(name) => Self::Name(name.clone()),
            None => Self::Index(config.audio.default_device),
        }
    }

    pub fn index(&self, ctx: &AudioContext) -> crate::Result<usize> {
        match self {
            Self::Index(index) => Ok(*index),
            Self::Name(name) => ctx.registry().find_device(name),
        }
    }
}

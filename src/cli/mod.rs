//! Command-line interface for multidevice-player.
//!
//! Lists output devices and plays sound files on a chosen device, mostly
//! useful for checking a multi-output setup by ear.

mod commands;

pub use commands::{Cli, Commands, run_command};

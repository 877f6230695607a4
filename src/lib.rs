//! Multidevice Player - per-device sound playback.
//!
//! Each output device gets its own engine instance, opened on first use and
//! kept in a [`DeviceRegistry`]. A [`DevicePlayer`] loads one sound on one
//! device and controls its playback, including timed fades driven by
//! [`DevicePlayer::update`].

pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod paths;
pub mod player;
pub mod registry;
#[cfg(test)]
pub mod test_utils;

pub use context::AudioContext;
pub use error::{Error, Result};
pub use player::{DevicePlayer, LoadOptions};
pub use registry::DeviceRegistry;

//! Audio engine capability interface.
//!
//! Everything the registry and players need from an audio engine goes
//! through the two traits in this module:
//!
//! ```text
//! ┌──────────────────┐  create()   ┌────────────────────────────────────┐
//! │  EngineFactory   │ ──────────▶ │          EngineInstance            │
//! │  (one per proc)  │             │  one output device, voice pool,    │
//! └──────────────────┘             │  loaded sounds, master group       │
//!                                  └────────────────────────────────────┘
//! ```
//!
//! The default backend lives in [`cpal_backend`] (device output through cpal,
//! decoding through symphonia, voices mixed by [`mixer::Mixer`]).
//!
//! Voice handles carry a generation. An instance bumps the generation of a
//! voice slot whenever the slot is reclaimed, so a handle that outlived its
//! voice is rejected with [`EngineError::InvalidVoice`] instead of silently
//! addressing whatever plays in that slot now.

pub mod cpal_backend;
mod decoder;
pub mod mixer;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use cpal_backend::CpalEngine;

/// Handle to a sound loaded into an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(pub u64);

/// Handle to one playing voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    /// Slot in the instance's voice pool
    pub index: u32,
    /// Generation of that slot when the voice was started
    pub generation: u32,
}

/// Handle to a channel group (only the master group exists today).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupHandle(pub u32);

impl GroupHandle {
    pub const MASTER: GroupHandle = GroupHandle(0);
}

/// Description of one output driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub index: usize,
    pub name: String,
    /// Stable identifier, `host:name`
    pub id: String,
}

/// How a sound is held in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoundMode {
    /// Fully decoded before `create_sound` returns.
    #[default]
    Sample,
    /// Decoded progressively in the background while it plays.
    Stream,
}

/// Loop behavior of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Normal,
}

impl From<bool> for LoopMode {
    fn from(looping: bool) -> Self {
        if looping { LoopMode::Normal } else { LoopMode::Off }
    }
}

/// Sample interpolation used when a voice plays at a rate other than the
/// output rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
}

/// Engine errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("No output driver at index {0}")]
    NoSuchDriver(usize),

    #[error("No output devices available")]
    NoDevices,

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Unknown sound handle {0:?}")]
    InvalidSound(SoundHandle),

    #[error("Voice {0:?} is no longer active")]
    InvalidVoice(VoiceHandle),

    #[error("Engine instance is not initialized")]
    NotInitialized,

    #[error("Failed to spawn thread: {0}")]
    Thread(String),
}

/// Creates engine instances and enumerates output drivers.
pub trait EngineFactory {
    /// Create a new, uninitialized instance.
    fn create(&self) -> Result<Box<dyn EngineInstance>, EngineError>;

    /// List the output drivers available right now.
    fn drivers(&self) -> Result<Vec<DriverInfo>, EngineError>;
}

/// One engine instance bound to one output device.
///
/// Voice and sound handles are only meaningful to the instance that
/// produced them.
pub trait EngineInstance {
    fn driver_count(&self) -> Result<usize, EngineError>;
    fn driver_info(&self, index: usize) -> Result<DriverInfo, EngineError>;
    /// Select the output driver used by [`init`](Self::init).
    fn set_driver(&mut self, index: usize) -> Result<(), EngineError>;
    /// Open the selected driver with room for `max_voices` simultaneous voices.
    fn init(&mut self, max_voices: usize, interpolation: Interpolation) -> Result<(), EngineError>;
    fn master_group(&self) -> Result<GroupHandle, EngineError>;
    fn set_group_volume(&mut self, group: GroupHandle, volume: f32) -> Result<(), EngineError>;
    /// Service the instance; reclaims voices that have finished.
    fn update(&mut self) -> Result<(), EngineError>;
    /// Close the device and drop every sound and voice.
    fn close(&mut self) -> Result<(), EngineError>;

    fn create_sound(&mut self, path: &Path, mode: SoundMode) -> Result<SoundHandle, EngineError>;
    /// Total length in sample frames.
    fn sound_length(&self, sound: SoundHandle) -> Result<u64, EngineError>;
    /// Native sample rate of a sound in Hz.
    fn sound_frequency(&self, sound: SoundHandle) -> Result<f32, EngineError>;
    fn release_sound(&mut self, sound: SoundHandle) -> Result<(), EngineError>;

    fn play_sound(&mut self, sound: SoundHandle, paused: bool) -> Result<VoiceHandle, EngineError>;
    fn is_playing(&self, voice: VoiceHandle) -> Result<bool, EngineError>;
    fn stop(&mut self, voice: VoiceHandle) -> Result<(), EngineError>;
    /// Playback position in sample frames.
    fn position(&self, voice: VoiceHandle) -> Result<u64, EngineError>;
    fn set_position(&mut self, voice: VoiceHandle, frame: u64) -> Result<(), EngineError>;
    fn set_volume(&mut self, voice: VoiceHandle, volume: f32) -> Result<(), EngineError>;
    /// Pan from 0.0 (left) through 0.5 (center) to 1.0 (right).
    fn set_pan(&mut self, voice: VoiceHandle, pan: f32) -> Result<(), EngineError>;
    /// Playback rate in Hz.
    fn frequency(&self, voice: VoiceHandle) -> Result<f32, EngineError>;
    fn set_frequency(&mut self, voice: VoiceHandle, frequency: f32) -> Result<(), EngineError>;
    fn set_loop_mode(&mut self, voice: VoiceHandle, mode: LoopMode) -> Result<(), EngineError>;
    fn set_paused(&mut self, voice: VoiceHandle, paused: bool) -> Result<(), EngineError>;
}

//! Crate-wide error types.
//!
//! Engine backends report [`EngineError`]; the registry and players wrap
//! those with the device index or file path they concern. The binary uses
//! `anyhow` on top of this.
//!
//! # Example
//!
//! ```ignore
//! use multidevice_player::error::{Error, Result};
//!
//! fn start(ctx: &AudioContext) -> Result<()> {
//!     ctx.registry().ensure_initialized(1)?; // DeviceInit is retryable
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::registry::MAX_DEVICES;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Device index past the end of the registry table
    #[error("Device slot {0} is out of range (at most {max} devices)", max = MAX_DEVICES)]
    SlotOutOfRange(usize),

    /// Engine instance creation or initialization failed; the slot stays
    /// uninitialized so the call can be retried
    #[error("Failed to initialize audio device {index}: {source}")]
    DeviceInit {
        index: usize,
        #[source]
        source: EngineError,
    },

    /// The slot has no initialized engine instance yet
    #[error("Audio device {0} has not been initialized")]
    DeviceNotInitialized(usize),

    /// No driver matches the requested name
    #[error("No audio device matching {0:?}")]
    DeviceNotFound(String),

    /// The engine rejected a sound file
    #[error("Could not load sound file {path} on device {device}: {source}")]
    Load {
        path: PathBuf,
        device: usize,
        #[source]
        source: EngineError,
    },

    /// Any other engine failure
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a device initialization error.
    pub fn device_init(index: usize, source: EngineError) -> Self {
        Self::DeviceInit { index, source }
    }

    /// Create a load error.
    pub fn load(path: impl Into<PathBuf>, device: usize, source: EngineError) -> Self {
        Self::Load {
            path: path.into(),
            device,
            source,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceInit { .. } | Self::DeviceNotInitialized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_mentions_path_and_device() {
        let err = Error::load("/sounds/click.wav", 3, EngineError::Decode("bad header".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("click.wav"));
        assert!(msg.contains("device 3"));
        assert!(msg.contains("bad header"));
    }

    #[test]
    fn test_slot_out_of_range_display() {
        let err = Error::SlotOutOfRange(40);
        assert!(err.to_string().contains("40"));
        assert!(err.to_string().contains("32"));
    }

    #[test]
    fn test_device_init_is_retryable() {
        assert!(Error::device_init(0, EngineError::NoDevices).is_retryable());
        assert!(!Error::DeviceNotFound("usb".to_string()).is_retryable());
    }

    #[test]
    fn test_engine_error_converts() {
        let err: Error = EngineError::NotInitialized.into();
        assert!(matches!(err, Error::Engine(EngineError::NotInitialized)));
    }
}

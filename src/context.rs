//! Shared collaborators handed to every player.

use std::path::PathBuf;
use std::rc::Rc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::CpalEngine;
use crate::error::Result;
use crate::paths::{DataDirResolver, PathResolver};
use crate::player::{DevicePlayer, PlayerDefaults};
use crate::registry::{DeviceRegistry, RegistryOptions};

/// Registry, clock and path resolution shared by a set of players.
///
/// Cloning is cheap and every clone refers to the same registry.
#[derive(Clone)]
pub struct AudioContext {
    registry: Rc<DeviceRegistry>,
    clock: Rc<dyn Clock>,
    resolver: Rc<dyn PathResolver>,
    defaults: PlayerDefaults,
}

impl AudioContext {
    pub fn new(registry: DeviceRegistry, clock: Rc<dyn Clock>, resolver: Rc<dyn PathResolver>) -> Self {
        Self {
            registry: Rc::new(registry),
            clock,
            resolver,
            defaults: PlayerDefaults::default(),
        }
    }

    /// Build a cpal-backed context from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let engine = match config.audio.host.as_deref() {
            Some(name) => CpalEngine::with_host_name(name)?,
            None => CpalEngine::new(),
        };
        let options = RegistryOptions {
            max_voices: config.audio.max_voices,
            interpolation: config.audio.interpolation,
        };
        let data_dir = config
            .paths
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data"));
        info!("Resolving sound files under {:?}", data_dir);

        let ctx = Self::new(
            DeviceRegistry::new(engine, options),
            Rc::new(SystemClock::new()),
            Rc::new(DataDirResolver::new(data_dir)),
        );
        Ok(ctx.with_defaults(PlayerDefaults {
            volume: config.playback.volume,
            pan: config.playback.pan,
            speed: config.playback.speed,
            fade_duration_ms: config.playback.fade_duration_ms,
        }))
    }

    /// Values new players start with.
    pub fn with_defaults(mut self, defaults: PlayerDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &PlayerDefaults {
        &self.defaults
    }

    pub fn registry(&self) -> &Rc<DeviceRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn resolver(&self) -> &dyn PathResolver {
        self.resolver.as_ref()
    }

    /// A fresh player with nothing loaded.
    pub fn player(&self) -> DevicePlayer {
        DevicePlayer::new(self)
    }
}

//! Per-device sound player.
//!
//! A [`DevicePlayer`] owns one loaded sound on one output device and at
//! most one voice it is tracking. Volume, pan, speed, loop and pause are
//! cached on the player and pushed to every new voice, so they can be set
//! before anything plays.
//!
//! ```ignore
//! let ctx = AudioContext::from_config(&config::load())?;
//! let mut player = ctx.player();
//! player.load("click.wav", 1)?;
//! player.fade_in();
//! loop {
//!     player.update(); // once per frame
//! }
//! ```
//!
//! Control methods never fail: when no sound is loaded they do nothing, and
//! engine errors are logged and leave the cached state in place. A voice the
//! engine has reclaimed is noticed on the next query and dropped.

mod fade;

pub use fade::{DEFAULT_FADE_DURATION_MS, Fade, FadeState, FadeTick};

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::AudioContext;
use crate::engine::{EngineError, EngineInstance, LoopMode, SoundHandle, SoundMode, VoiceHandle};
use crate::error::{Error, Result};

/// Rate assumed until a sound reports its own.
const DEFAULT_FREQUENCY: f32 = 44100.0;

/// Values a fresh player starts with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerDefaults {
    pub volume: f32,
    /// 0.0 left, 0.5 center, 1.0 right
    pub pan: f32,
    pub speed: f32,
    pub fade_duration_ms: u64,
}

impl Default for PlayerDefaults {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.5,
            speed: 1.0,
            fade_duration_ms: DEFAULT_FADE_DURATION_MS,
        }
    }
}

/// Options for [`DevicePlayer::load_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    /// Decode progressively instead of up front
    pub stream: bool,
}

/// The voice a player is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveVoice {
    #[default]
    Idle,
    Playing(VoiceHandle),
}

impl ActiveVoice {
    pub fn handle(self) -> Option<VoiceHandle> {
        match self {
            ActiveVoice::Idle => None,
            ActiveVoice::Playing(handle) => Some(handle),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LoadedSound {
    handle: SoundHandle,
    /// Device whose instance owns the sound
    device: usize,
    /// Registry epoch of that instance
    epoch: u64,
    streaming: bool,
    length: u64,
}

/// Plays one sound on one output device.
pub struct DevicePlayer {
    ctx: AudioContext,
    device: usize,
    device_name: String,
    sound: Option<LoadedSound>,
    voice: Cell<ActiveVoice>,
    base_frequency: f32,
    volume: f32,
    pan: f32,
    speed: f32,
    looping: bool,
    paused: bool,
    multi_play: bool,
    fade: Fade,
}

impl DevicePlayer {
    pub fn new(ctx: &AudioContext) -> Self {
        let defaults = *ctx.defaults();
        Self {
            ctx: ctx.clone(),
            device: 0,
            device_name: String::new(),
            sound: None,
            voice: Cell::new(ActiveVoice::Idle),
            base_frequency: DEFAULT_FREQUENCY,
            volume: defaults.volume,
            pan: defaults.pan,
            speed: defaults.speed,
            looping: false,
            paused: false,
            multi_play: false,
            fade: Fade::new(defaults.fade_duration_ms),
        }
    }

    /// The loaded sound, unless its device has been shut down since.
    fn live_sound(&self) -> Option<LoadedSound> {
        let sound = self.sound?;
        (self.ctx.registry().epoch(sound.device) == Some(sound.epoch)).then_some(sound)
    }

    /// Run `f` against the instance owning the loaded sound.
    fn engine<R>(&self, f: impl FnOnce(&mut dyn EngineInstance) -> std::result::Result<R, EngineError>) -> Result<R> {
        let sound = self.live_sound().ok_or(Error::DeviceNotInitialized(self.device))?;
        self.ctx.registry().with_instance(sound.device, f)
    }

    /// Run a voice command, logging failures.
    fn apply(&self, what: &str, f: impl FnOnce(&mut dyn EngineInstance) -> std::result::Result<(), EngineError>) {
        match self.engine(f) {
            Ok(()) => {}
            Err(Error::Engine(EngineError::InvalidVoice(handle))) => {
                debug!("Voice {:?} was reclaimed before {} could be applied", handle, what);
                self.voice.set(ActiveVoice::Idle);
            }
            Err(e) => warn!("Failed to apply {}: {}", what, e),
        }
    }

    /// Load `file` for playback on `device`.
    pub fn load(&mut self, file: &str, device: usize) -> Result<()> {
        self.load_with(file, device, LoadOptions::default())
    }

    /// Load `file` on the first device whose driver name matches `device_name`.
    pub fn load_by_name(&mut self, file: &str, device_name: &str) -> Result<()> {
        let device = self.ctx.registry().find_device(device_name)?;
        self.load(file, device)
    }

    /// Load `file` on `device`, replacing whatever was loaded before.
    ///
    /// The device is initialized first if needed; if that fails the player
    /// is left as it was. If the engine rejects the file, the player ends up
    /// with nothing loaded.
    pub fn load_with(&mut self, file: &str, device: usize, options: LoadOptions) -> Result<()> {
        let path = self.ctx.resolver().resolve(file);
        let registry = Rc::clone(self.ctx.registry());

        registry.ensure_initialized(device)?;
        let device_name = registry.device_name(device)?;
        let epoch = registry.epoch(device).ok_or(Error::DeviceNotInitialized(device))?;

        self.unload();
        self.multi_play = false;
        self.device = device;
        self.device_name = device_name;

        let mode = if options.stream { SoundMode::Stream } else { SoundMode::Sample };
        let created = registry.with_instance(device, |engine| {
            let handle = engine.create_sound(&path, mode)?;
            let info = engine
                .sound_length(handle)
                .and_then(|length| engine.sound_frequency(handle).map(|rate| (length, rate)));
            match info {
                Ok((length, frequency)) => Ok((handle, length, frequency)),
                Err(e) => {
                    let _ = engine.release_sound(handle);
                    Err(e)
                }
            }
        });

        match created {
            Ok((handle, length, frequency)) => {
                info!("Loaded {} on device {} ({})", path.display(), device, self.device_name);
                self.sound = Some(LoadedSound {
                    handle,
                    device,
                    epoch,
                    streaming: options.stream,
                    length,
                });
                self.base_frequency = frequency;
                Ok(())
            }
            Err(Error::Engine(source)) => {
                error!("Could not load sound file {} at index {}: {}", path.display(), device, source);
                Err(Error::load(path, device, source))
            }
            Err(e) => {
                error!("Could not load sound file {} at index {}: {}", path.display(), device, e);
                Err(e)
            }
        }
    }

    /// Stop playback and release the loaded sound.
    ///
    /// Streamed sounds are not released here; their instance frees them
    /// when the device is shut down. If the device was shut down already,
    /// the sound went with it and only the handle is dropped.
    pub fn unload(&mut self) {
        let Some(sound) = self.sound else {
            return;
        };
        if self.live_sound().is_none() {
            debug!("Device {} was shut down, dropping sound {:?}", sound.device, sound.handle);
            self.voice.set(ActiveVoice::Idle);
            self.fade.cancel();
            self.sound = None;
            return;
        }

        self.stop();
        if sound.streaming {
            debug!("Leaving streamed sound {:?} to device {}", sound.handle, sound.device);
        } else if let Err(e) = self.engine(|engine| engine.release_sound(sound.handle)) {
            debug!("Releasing sound {:?} failed: {}", sound.handle, e);
        }
        self.sound = None;
    }

    /// Whether the last load succeeded, nothing has been unloaded since and
    /// the device it was loaded on is still open.
    pub fn is_loaded(&self) -> bool {
        self.live_sound().is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.live_sound().is_some_and(|s| s.streaming)
    }

    /// Start a new voice for the loaded sound.
    pub fn play(&mut self) {
        let Some(sound) = self.live_sound() else {
            return;
        };

        // A looping voice left running would never end on its own
        if self.looping || !self.multi_play {
            self.stop_voice();
        }

        let paused = self.paused;
        let handle = match self.engine(|engine| engine.play_sound(sound.handle, paused)) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to start playback on device {}: {}", self.device, e);
                return;
            }
        };
        self.voice.set(ActiveVoice::Playing(handle));

        let (volume, pan, speed, loop_mode) = (self.volume, self.pan, self.speed, LoopMode::from(self.looping));
        let configured = self.engine(|engine| {
            let base = engine.frequency(handle)?;
            engine.set_volume(handle, volume)?;
            engine.set_pan(handle, pan)?;
            engine.set_frequency(handle, base * speed)?;
            engine.set_loop_mode(handle, loop_mode)?;
            // Finished voices are only reclaimed when the instance is serviced
            engine.update()?;
            Ok(base)
        });

        match configured {
            Ok(base) => self.base_frequency = base,
            Err(e) => warn!("Failed to configure voice {:?}: {}", handle, e),
        }
    }

    fn stop_voice(&self) {
        let Some(handle) = self.voice.replace(ActiveVoice::Idle).handle() else {
            return;
        };
        match self.engine(|engine| engine.stop(handle)) {
            Ok(()) | Err(Error::Engine(EngineError::InvalidVoice(_))) | Err(Error::DeviceNotInitialized(_)) => {}
            Err(e) => warn!("Failed to stop voice {:?}: {}", handle, e),
        }
    }

    /// Stop the tracked voice and cancel any fade.
    pub fn stop(&mut self) {
        self.stop_voice();
        self.fade.cancel();
    }

    /// Whether the tracked voice is still playing (paused counts).
    pub fn is_playing(&self) -> bool {
        if self.live_sound().is_none() {
            return false;
        }
        let Some(handle) = self.voice.get().handle() else {
            return false;
        };

        match self.engine(|engine| engine.is_playing(handle)) {
            Ok(true) => true,
            Ok(false) => {
                debug!("Voice {:?} finished", handle);
                self.voice.set(ActiveVoice::Idle);
                false
            }
            Err(e) => {
                debug!("Voice {:?} retired: {}", handle, e);
                self.voice.set(ActiveVoice::Idle);
                false
            }
        }
    }

    fn live_voice(&self) -> Option<VoiceHandle> {
        if self.is_playing() { self.voice.get().handle() } else { None }
    }

    /// The voice currently tracked, if any.
    pub fn active_voice(&self) -> ActiveVoice {
        self.voice.get()
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(handle) = self.live_voice() {
            self.apply("volume", |engine| engine.set_volume(handle, volume));
        }
        self.volume = volume;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_pan(&mut self, pan: f32) {
        if let Some(handle) = self.live_voice() {
            self.apply("pan", |engine| engine.set_pan(handle, pan));
        }
        self.pan = pan;
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Playback speed as a multiple of the sound's native rate.
    pub fn set_speed(&mut self, speed: f32) {
        if let Some(handle) = self.live_voice() {
            let frequency = self.base_frequency * speed;
            self.apply("speed", |engine| engine.set_frequency(handle, frequency));
        }
        self.speed = speed;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_loop(&mut self, looping: bool) {
        if let Some(handle) = self.live_voice() {
            self.apply("loop mode", |engine| engine.set_loop_mode(handle, LoopMode::from(looping)));
        }
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_paused(&mut self, paused: bool) {
        if let Some(handle) = self.live_voice() {
            self.apply("pause", |engine| engine.set_paused(handle, paused));
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Allow overlapping voices from this player.
    ///
    /// Voices replaced by a later `play` are no longer tracked and only
    /// end when the sound does (or never, if looping was on at the time).
    pub fn set_multi_play(&mut self, multi_play: bool) {
        self.multi_play = multi_play;
    }

    pub fn is_multi_play(&self) -> bool {
        self.multi_play
    }

    /// Seek to `pct` of the sound's length. Only while playing.
    pub fn set_position(&mut self, pct: f32) {
        let Some(handle) = self.live_voice() else {
            return;
        };
        let frame = (self.length_frames() as f64 * pct as f64) as u64;
        self.apply("position", |engine| engine.set_position(handle, frame));
    }

    /// Playback position as a fraction of the length, 0 when not playing.
    pub fn position(&self) -> f32 {
        let length = self.length_frames();
        if length == 0 {
            return 0.0;
        }
        let Some(handle) = self.live_voice() else {
            return 0.0;
        };
        match self.engine(|engine| engine.position(handle)) {
            Ok(frame) => frame as f32 / length as f32,
            Err(e) => {
                debug!("Position query for {:?} failed: {}", handle, e);
                0.0
            }
        }
    }

    /// Total length in sample frames.
    pub fn length_frames(&self) -> u64 {
        self.live_sound().map(|s| s.length).unwrap_or(0)
    }

    pub fn length_ms(&self) -> f32 {
        self.length_frames() as f32 * 1000.0 / self.base_frequency
    }

    pub fn position_ms(&self) -> f32 {
        self.position() * self.length_ms()
    }

    /// Native rate of the loaded sound, as last reported by the engine, in Hz.
    pub fn base_frequency(&self) -> f32 {
        self.base_frequency
    }

    pub fn device(&self) -> usize {
        self.device
    }

    /// Driver name cached at load time.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn fade_duration_ms(&self) -> u64 {
        self.fade.duration_ms()
    }

    pub fn set_fade_duration_ms(&mut self, duration_ms: u64) {
        self.fade.set_duration_ms(duration_ms);
    }

    pub fn is_fading_in(&self) -> bool {
        self.fade.is_fading_in()
    }

    pub fn is_fading_out(&self) -> bool {
        self.fade.is_fading_out()
    }

    /// Restart from silence and ramp up to full volume.
    ///
    /// Does nothing when nothing is loaded or the volume is exactly 1.0.
    pub fn fade_in(&mut self) {
        if self.live_sound().is_none() || self.volume == 1.0 {
            return;
        }
        self.volume = 0.0;
        self.play();
        self.fade.start_in(self.ctx.clock().now_ms());
    }

    /// Ramp the playing voice down to silence, then stop it.
    ///
    /// Does nothing when not playing or when the volume is exactly 0.0.
    pub fn fade_out(&mut self) {
        if !self.is_playing() || self.volume == 0.0 {
            return;
        }
        self.fade.start_out(self.ctx.clock().now_ms());
    }

    /// Advance any fade in progress. Call once per frame.
    pub fn update(&mut self) {
        let Some(tick) = self.fade.tick(self.ctx.clock().now_ms()) else {
            return;
        };
        self.set_volume(tick.volume);
        if tick.stop {
            self.stop();
        }
    }
}

impl Drop for DevicePlayer {
    fn drop(&mut self) {
        self.unload();
    }
}

//! Test utilities: a recording fake engine and context fixtures.
//!
//! [`MockEngine`] implements the engine traits without touching any audio
//! hardware. Every instance it creates shares one state table, so tests can
//! inspect voices and the ordered event log after the fact.
//!
//! # Example
//!
//! ```ignore
//! let (ctx, engine, clock) = test_context();
//! let mut player = ctx.player();
//! player.load("click.wav", 0).unwrap();
//! player.play();
//! assert_eq!(engine.active_voices(0), 1);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::AudioContext;
use crate::clock::ManualClock;
use crate::engine::{
    DriverInfo, EngineError, EngineFactory, EngineInstance, GroupHandle, Interpolation, LoopMode, SoundHandle,
    SoundMode, VoiceHandle,
};
use crate::paths::DataDirResolver;
use crate::registry::{DeviceRegistry, RegistryOptions};

/// Native rate every mock voice starts at.
pub const MOCK_SAMPLE_RATE: f32 = 44100.0;

/// Length of every mock sound, two seconds at [`MOCK_SAMPLE_RATE`].
pub const MOCK_LENGTH_FRAMES: u64 = 88200;

const MOCK_DRIVERS: [&str; 3] = ["Built-in Output", "USB Headphones", "HDMI Output"];

/// Things the mock engine was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Created(usize),
    DriverQueried { instance: usize, driver: usize },
    DriverSelected { instance: usize, driver: usize },
    Initialized { instance: usize, max_voices: usize },
    Closed(usize),
    SoundCreated { instance: usize, path: PathBuf, mode: SoundMode },
    SoundReleased { instance: usize, sound: SoundHandle },
    VoiceStarted { instance: usize, voice: VoiceHandle },
    VoiceStopped { instance: usize, voice: VoiceHandle },
    Updated(usize),
}

/// Live state of one mock voice.
#[derive(Debug, Clone, PartialEq)]
pub struct MockVoice {
    pub sound: SoundHandle,
    pub position: u64,
    pub volume: f32,
    pub pan: f32,
    pub frequency: f32,
    pub loop_mode: LoopMode,
    pub paused: bool,
    pub finished: bool,
}

#[derive(Debug, Default)]
struct VoiceSlot {
    generation: u32,
    voice: Option<MockVoice>,
}

#[derive(Debug, Default)]
struct InstanceState {
    driver: usize,
    initialized: bool,
    master_volume: Option<f32>,
    sounds: HashMap<u64, PathBuf>,
    next_sound: u64,
    voices: Vec<VoiceSlot>,
}

#[derive(Debug, Default)]
struct MockState {
    events: Vec<Event>,
    instances: Vec<InstanceState>,
    failing_inits: usize,
}

/// Recording engine factory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Rc<RefCell<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `init` fail.
    pub fn fail_next_inits(&self, count: usize) {
        self.state.borrow_mut().failing_inits = count;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn create_count(&self) -> usize {
        self.state.borrow().instances.len()
    }

    /// Number of stop calls that hit a live voice.
    pub fn stop_count(&self) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| matches!(e, Event::VoiceStopped { .. }))
            .count()
    }

    pub fn master_volume(&self, instance: usize) -> Option<f32> {
        self.state.borrow().instances.get(instance).and_then(|i| i.master_volume)
    }

    /// Voices holding a slot on `instance`.
    pub fn active_voices(&self, instance: usize) -> usize {
        self.state
            .borrow()
            .instances
            .get(instance)
            .map(|i| i.voices.iter().filter(|s| s.voice.is_some()).count())
            .unwrap_or(0)
    }

    pub fn voice(&self, instance: usize, handle: VoiceHandle) -> Option<MockVoice> {
        let state = self.state.borrow();
        let slot = state.instances.get(instance)?.voices.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.voice.clone()
    }

    /// The most recently started voice on `instance`.
    pub fn last_voice(&self, instance: usize) -> Option<(VoiceHandle, MockVoice)> {
        let handle = self.state.borrow().events.iter().rev().find_map(|e| match e {
            Event::VoiceStarted { instance: i, voice } if *i == instance => Some(*voice),
            _ => None,
        })?;
        self.voice(instance, handle).map(|v| (handle, v))
    }

    /// Let every voice on `instance` run off the end of its sound.
    pub fn finish_voices(&self, instance: usize) {
        if let Some(inst) = self.state.borrow_mut().instances.get_mut(instance) {
            for voice in inst.voices.iter_mut().filter_map(|s| s.voice.as_mut()) {
                voice.position = MOCK_LENGTH_FRAMES;
                voice.finished = true;
            }
        }
    }

    /// Move every voice on `instance` to `frame`.
    pub fn seek_voices(&self, instance: usize, frame: u64) {
        if let Some(inst) = self.state.borrow_mut().instances.get_mut(instance) {
            for voice in inst.voices.iter_mut().filter_map(|s| s.voice.as_mut()) {
                voice.position = frame;
            }
        }
    }

    pub fn loaded_sounds(&self, instance: usize) -> usize {
        self.state
            .borrow()
            .instances
            .get(instance)
            .map(|i| i.sounds.len())
            .unwrap_or(0)
    }
}

impl EngineFactory for MockEngine {
    fn create(&self) -> Result<Box<dyn EngineInstance>, EngineError> {
        let mut state = self.state.borrow_mut();
        let id = state.instances.len();
        state.instances.push(InstanceState {
            next_sound: 1,
            ..Default::default()
        });
        state.events.push(Event::Created(id));
        Ok(Box::new(MockInstance {
            id,
            state: Rc::clone(&self.state),
        }))
    }

    fn drivers(&self) -> Result<Vec<DriverInfo>, EngineError> {
        Ok(MOCK_DRIVERS
            .iter()
            .enumerate()
            .map(|(index, name)| DriverInfo {
                index,
                name: name.to_string(),
                id: format!("Mock:{}", name),
            })
            .collect())
    }
}

struct MockInstance {
    id: usize,
    state: Rc<RefCell<MockState>>,
}

impl MockInstance {
    fn push(&self, event: Event) {
        self.state.borrow_mut().events.push(event);
    }

    fn with_voice<R>(&self, handle: VoiceHandle, f: impl FnOnce(&mut MockVoice) -> R) -> Result<R, EngineError> {
        let mut state = self.state.borrow_mut();
        let inst = &mut state.instances[self.id];
        if !inst.initialized {
            return Err(EngineError::NotInitialized);
        }
        inst.voices
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.voice.as_mut())
            .map(f)
            .ok_or(EngineError::InvalidVoice(handle))
    }
}

impl EngineInstance for MockInstance {
    fn driver_count(&self) -> Result<usize, EngineError> {
        Ok(MOCK_DRIVERS.len())
    }

    fn driver_info(&self, index: usize) -> Result<DriverInfo, EngineError> {
        self.push(Event::DriverQueried {
            instance: self.id,
            driver: index,
        });
        let name = MOCK_DRIVERS.get(index).ok_or(EngineError::NoSuchDriver(index))?;
        Ok(DriverInfo {
            index,
            name: name.to_string(),
            id: format!("Mock:{}", name),
        })
    }

    fn set_driver(&mut self, index: usize) -> Result<(), EngineError> {
        if index >= MOCK_DRIVERS.len() {
            return Err(EngineError::NoSuchDriver(index));
        }
        self.state.borrow_mut().instances[self.id].driver = index;
        self.push(Event::DriverSelected {
            instance: self.id,
            driver: index,
        });
        Ok(())
    }

    fn init(&mut self, max_voices: usize, _interpolation: Interpolation) -> Result<(), EngineError> {
        {
            let mut state = self.state.borrow_mut();
            if state.failing_inits > 0 {
                state.failing_inits -= 1;
                return Err(EngineError::Device("mock init failure".to_string()));
            }
            state.instances[self.id].initialized = true;
        }
        self.push(Event::Initialized {
            instance: self.id,
            max_voices,
        });
        Ok(())
    }

    fn master_group(&self) -> Result<GroupHandle, EngineError> {
        if self.state.borrow().instances[self.id].initialized {
            Ok(GroupHandle::MASTER)
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    fn set_group_volume(&mut self, _group: GroupHandle, volume: f32) -> Result<(), EngineError> {
        self.state.borrow_mut().instances[self.id].master_volume = Some(volume);
        Ok(())
    }

    fn update(&mut self) -> Result<(), EngineError> {
        {
            let mut state = self.state.borrow_mut();
            for slot in &mut state.instances[self.id].voices {
                if slot.voice.as_ref().is_some_and(|v| v.finished) {
                    slot.voice = None;
                    slot.generation += 1;
                }
            }
        }
        self.push(Event::Updated(self.id));
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        {
            let mut state = self.state.borrow_mut();
            let inst = &mut state.instances[self.id];
            inst.initialized = false;
            inst.sounds.clear();
            for slot in &mut inst.voices {
                if slot.voice.take().is_some() {
                    slot.generation += 1;
                }
            }
        }
        self.push(Event::Closed(self.id));
        Ok(())
    }

    fn create_sound(&mut self, path: &Path, mode: SoundMode) -> Result<SoundHandle, EngineError> {
        let missing = path
            .file_stem()
            .is_some_and(|s| s.to_string_lossy().starts_with("missing"));
        if missing {
            return Err(EngineError::FileNotFound(path.to_path_buf()));
        }

        let handle = {
            let mut state = self.state.borrow_mut();
            let inst = &mut state.instances[self.id];
            if !inst.initialized {
                return Err(EngineError::NotInitialized);
            }
            let handle = SoundHandle(inst.next_sound);
            inst.next_sound += 1;
            inst.sounds.insert(handle.0, path.to_path_buf());
            handle
        };
        self.push(Event::SoundCreated {
            instance: self.id,
            path: path.to_path_buf(),
            mode,
        });
        Ok(handle)
    }

    fn sound_length(&self, sound: SoundHandle) -> Result<u64, EngineError> {
        if self.state.borrow().instances[self.id].sounds.contains_key(&sound.0) {
            Ok(MOCK_LENGTH_FRAMES)
        } else {
            Err(EngineError::InvalidSound(sound))
        }
    }

    fn sound_frequency(&self, sound: SoundHandle) -> Result<f32, EngineError> {
        self.sound_length(sound).map(|_| MOCK_SAMPLE_RATE)
    }

    fn release_sound(&mut self, sound: SoundHandle) -> Result<(), EngineError> {
        {
            let mut state = self.state.borrow_mut();
            let inst = &mut state.instances[self.id];
            inst.sounds.remove(&sound.0).ok_or(EngineError::InvalidSound(sound))?;
            for slot in &mut inst.voices {
                if slot.voice.as_ref().is_some_and(|v| v.sound == sound) {
                    slot.voice = None;
                    slot.generation += 1;
                }
            }
        }
        self.push(Event::SoundReleased { instance: self.id, sound });
        Ok(())
    }

    fn play_sound(&mut self, sound: SoundHandle, paused: bool) -> Result<VoiceHandle, EngineError> {
        let handle = {
            let mut state = self.state.borrow_mut();
            let inst = &mut state.instances[self.id];
            if !inst.sounds.contains_key(&sound.0) {
                return Err(EngineError::InvalidSound(sound));
            }
            let index = match inst.voices.iter().position(|s| s.voice.is_none()) {
                Some(free) => free,
                None => {
                    inst.voices.push(VoiceSlot::default());
                    inst.voices.len() - 1
                }
            };
            let slot = &mut inst.voices[index];
            slot.voice = Some(MockVoice {
                sound,
                position: 0,
                volume: 1.0,
                pan: 0.5,
                frequency: MOCK_SAMPLE_RATE,
                loop_mode: LoopMode::Off,
                paused,
                finished: false,
            });
            VoiceHandle {
                index: index as u32,
                generation: slot.generation,
            }
        };
        self.push(Event::VoiceStarted {
            instance: self.id,
            voice: handle,
        });
        Ok(handle)
    }

    fn is_playing(&self, voice: VoiceHandle) -> Result<bool, EngineError> {
        self.with_voice(voice, |v| !v.finished)
    }

    fn stop(&mut self, voice: VoiceHandle) -> Result<(), EngineError> {
        self.with_voice(voice, |_| ())?;
        {
            let mut state = self.state.borrow_mut();
            let slot = &mut state.instances[self.id].voices[voice.index as usize];
            slot.voice = None;
            slot.generation += 1;
        }
        self.push(Event::VoiceStopped { instance: self.id, voice });
        Ok(())
    }

    fn position(&self, voice: VoiceHandle) -> Result<u64, EngineError> {
        self.with_voice(voice, |v| v.position)
    }

    fn set_position(&mut self, voice: VoiceHandle, frame: u64) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.position = frame)
    }

    fn set_volume(&mut self, voice: VoiceHandle, volume: f32) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.volume = volume)
    }

    fn set_pan(&mut self, voice: VoiceHandle, pan: f32) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.pan = pan)
    }

    fn frequency(&self, voice: VoiceHandle) -> Result<f32, EngineError> {
        self.with_voice(voice, |v| v.frequency)
    }

    fn set_frequency(&mut self, voice: VoiceHandle, frequency: f32) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.frequency = frequency)
    }

    fn set_loop_mode(&mut self, voice: VoiceHandle, mode: LoopMode) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.loop_mode = mode)
    }

    fn set_paused(&mut self, voice: VoiceHandle, paused: bool) -> Result<(), EngineError> {
        self.with_voice(voice, |v| v.paused = paused)
    }
}

/// Write a 16-bit PCM WAV file holding `frames` frames of `value` on every
/// channel.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32, value: i16) -> std::io::Result<()> {
    let block_align = channels as u32 * 2;
    let data_len = frames * block_align;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames * channels as u32 {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    std::fs::write(path, bytes)
}

/// An [`AudioContext`] over a [`MockEngine`] with a manual clock at 0 ms.
pub fn test_context() -> (AudioContext, MockEngine, Rc<ManualClock>) {
    let engine = MockEngine::new();
    let clock = Rc::new(ManualClock::new(0));
    let registry = DeviceRegistry::new(engine.clone(), RegistryOptions::default());
    let ctx = AudioContext::new(registry, clock.clone(), Rc::new(DataDirResolver::new("/data")));
    (ctx, engine, clock)
}

//! Software voice mixer.
//!
//! The mixer owns a fixed pool of voice slots. Each slot holds at most one
//! voice and a generation counter; the counter is bumped every time the
//! slot's voice is stopped, reclaimed or stolen, which is what makes a
//! [`VoiceHandle`] go stale.
//!
//! A voice that reaches the end of a non-looping sound is only marked
//! finished by [`Mixer::render`]. The slot is freed later by
//! [`Mixer::reclaim`], which the owning instance calls from its `update`.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{EngineError, Interpolation, LoopMode, SoundHandle, VoiceHandle};

/// Samples of a sound that is still being decoded.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    /// Interleaved samples decoded so far
    pub samples: Vec<f32>,
    /// Set once the decoder reached the end of the file
    pub complete: bool,
}

#[derive(Debug)]
enum SourceData {
    Static(Vec<f32>),
    Streaming {
        buffer: Arc<RwLock<StreamBuffer>>,
        frames_hint: Option<u64>,
    },
}

/// Decoded audio shared between an instance's sound table and its voices.
#[derive(Debug)]
pub struct SoundSource {
    id: SoundHandle,
    sample_rate: u32,
    channels: u16,
    data: SourceData,
}

impl SoundSource {
    /// A sound decoded entirely up front.
    pub fn new_static(id: SoundHandle, sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            id,
            sample_rate,
            channels: channels.max(1),
            data: SourceData::Static(samples),
        }
    }

    /// A sound filled progressively through `buffer`.
    pub fn new_streaming(
        id: SoundHandle,
        sample_rate: u32,
        channels: u16,
        frames_hint: Option<u64>,
        buffer: Arc<RwLock<StreamBuffer>>,
    ) -> Self {
        Self {
            id,
            sample_rate,
            channels: channels.max(1),
            data: SourceData::Streaming { buffer, frames_hint },
        }
    }

    pub fn id(&self) -> SoundHandle {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.data, SourceData::Streaming { .. })
    }

    /// Length in frames. Streams report the header length when the
    /// container declares one, otherwise what has been decoded so far.
    pub fn frames(&self) -> u64 {
        match &self.data {
            SourceData::Static(samples) => (samples.len() / self.channels as usize) as u64,
            SourceData::Streaming { buffer, frames_hint } => frames_hint
                .unwrap_or_else(|| (buffer.read().samples.len() / self.channels as usize) as u64),
        }
    }

    /// Run `f` over the samples available right now and whether they are
    /// all there is. Returns `None` if a stream is being written to.
    pub(super) fn with_samples<R>(&self, f: impl FnOnce(&[f32], bool) -> R) -> Option<R> {
        match &self.data {
            SourceData::Static(samples) => Some(f(samples, true)),
            SourceData::Streaming { buffer, .. } => {
                let guard = buffer.try_read()?;
                Some(f(&guard.samples, guard.complete))
            }
        }
    }
}

/// Left/right gains for a pan position in `[0, 1]`, 0.5 being center.
///
/// Center leaves both sides at unity; moving toward one side attenuates the
/// other linearly.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let left = (2.0 * (1.0 - pan)).clamp(0.0, 1.0);
    let right = (2.0 * pan).clamp(0.0, 1.0);
    (left, right)
}

#[derive(Debug)]
struct Voice {
    source: Arc<SoundSource>,
    cursor: f64,
    frequency: f32,
    volume: f32,
    pan: f32,
    loop_mode: LoopMode,
    paused: bool,
    finished: bool,
    started: u64,
}

impl Voice {
    fn mix_into(&mut self, out: &mut [f32], out_channels: usize, output_rate: u32, interpolation: Interpolation, master: f32) {
        let step = self.frequency as f64 / output_rate as f64;
        if step <= 0.0 || !step.is_finite() {
            return;
        }

        let (left_gain, right_gain) = pan_gains(self.pan);
        let gain = self.volume * master;
        let looping = self.loop_mode == LoopMode::Normal;
        let source = Arc::clone(&self.source);
        let src_channels = source.channels() as usize;

        source.with_samples(|samples, complete| {
            let available = samples.len() / src_channels;

            for frame in out.chunks_mut(out_channels) {
                if self.cursor >= available as f64 {
                    if !complete {
                        // Underrun, the decoder has not caught up yet
                        break;
                    }
                    if looping && available > 0 {
                        self.cursor %= available as f64;
                    } else {
                        self.finished = true;
                        break;
                    }
                }

                let index = self.cursor as usize;
                let next = if index + 1 < available {
                    index + 1
                } else if looping && complete {
                    0
                } else {
                    index
                };

                let (mut left, mut right) = read_frame(samples, src_channels, index);
                if interpolation == Interpolation::Linear && next != index {
                    let frac = (self.cursor - index as f64) as f32;
                    let (next_left, next_right) = read_frame(samples, src_channels, next);
                    left += (next_left - left) * frac;
                    right += (next_right - right) * frac;
                }

                left *= left_gain * gain;
                right *= right_gain * gain;

                if out_channels == 1 {
                    frame[0] += (left + right) * 0.5;
                } else {
                    frame[0] += left;
                    frame[1] += right;
                }

                self.cursor += step;
            }
        });
    }
}

fn read_frame(samples: &[f32], channels: usize, index: usize) -> (f32, f32) {
    let base = index * channels;
    let left = samples[base];
    let right = if channels > 1 { samples[base + 1] } else { left };
    (left, right)
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    voice: Option<Voice>,
}

impl Slot {
    fn retire(&mut self) {
        self.voice = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Fixed-capacity voice pool rendering into an interleaved output buffer.
#[derive(Debug)]
pub struct Mixer {
    slots: Vec<Slot>,
    output_rate: u32,
    interpolation: Interpolation,
    master_volume: f32,
    next_start: u64,
}

impl Mixer {
    pub fn new(max_voices: usize, output_rate: u32, interpolation: Interpolation) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(max_voices.max(1), Slot::default);
        Self {
            slots,
            output_rate,
            interpolation,
            master_volume: 1.0,
            next_start: 0,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Voices currently holding a slot, finished or not.
    pub fn active_voices(&self) -> usize {
        self.slots.iter().filter(|s| s.voice.is_some()).count()
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume;
    }

    /// Start `source` on a free slot, stealing the oldest voice when the
    /// pool is full. Finished voices are stolen before audible ones.
    pub fn start(&mut self, source: Arc<SoundSource>, paused: bool) -> VoiceHandle {
        let index = match self.slots.iter().position(|s| s.voice.is_none()) {
            Some(free) => free,
            None => {
                let (oldest, _) = self
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| s.voice.as_ref().map(|v| (i, (!v.finished, v.started))))
                    .min_by_key(|(_, key)| *key)
                    .unwrap_or((0, (false, 0)));
                tracing::debug!("Voice pool full, stealing slot {}", oldest);
                self.slots[oldest].retire();
                oldest
            }
        };

        let started = self.next_start;
        self.next_start += 1;

        let slot = &mut self.slots[index];
        slot.voice = Some(Voice {
            frequency: source.sample_rate() as f32,
            source,
            cursor: 0.0,
            volume: 1.0,
            pan: 0.5,
            loop_mode: LoopMode::Off,
            paused,
            finished: false,
            started,
        });

        VoiceHandle {
            index: index as u32,
            generation: slot.generation,
        }
    }

    fn voice(&self, handle: VoiceHandle) -> Result<&Voice, EngineError> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.voice.as_ref())
            .ok_or(EngineError::InvalidVoice(handle))
    }

    fn voice_mut(&mut self, handle: VoiceHandle) -> Result<&mut Voice, EngineError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.voice.as_mut())
            .ok_or(EngineError::InvalidVoice(handle))
    }

    /// Paused voices count as playing; finished ones do not.
    pub fn is_playing(&self, handle: VoiceHandle) -> Result<bool, EngineError> {
        self.voice(handle).map(|v| !v.finished)
    }

    pub fn stop(&mut self, handle: VoiceHandle) -> Result<(), EngineError> {
        self.voice(handle)?;
        self.slots[handle.index as usize].retire();
        Ok(())
    }

    /// Stop every voice playing `sound`.
    pub fn stop_sound(&mut self, sound: SoundHandle) {
        for slot in &mut self.slots {
            if slot.voice.as_ref().is_some_and(|v| v.source.id() == sound) {
                slot.retire();
            }
        }
    }

    pub fn position(&self, handle: VoiceHandle) -> Result<u64, EngineError> {
        self.voice(handle).map(|v| v.cursor as u64)
    }

    pub fn set_position(&mut self, handle: VoiceHandle, frame: u64) -> Result<(), EngineError> {
        let voice = self.voice_mut(handle)?;
        voice.cursor = frame as f64;
        voice.finished = false;
        Ok(())
    }

    pub fn set_volume(&mut self, handle: VoiceHandle, volume: f32) -> Result<(), EngineError> {
        self.voice_mut(handle)?.volume = volume;
        Ok(())
    }

    pub fn set_pan(&mut self, handle: VoiceHandle, pan: f32) -> Result<(), EngineError> {
        self.voice_mut(handle)?.pan = pan;
        Ok(())
    }

    pub fn frequency(&self, handle: VoiceHandle) -> Result<f32, EngineError> {
        self.voice(handle).map(|v| v.frequency)
    }

    pub fn set_frequency(&mut self, handle: VoiceHandle, frequency: f32) -> Result<(), EngineError> {
        self.voice_mut(handle)?.frequency = frequency;
        Ok(())
    }

    pub fn set_loop_mode(&mut self, handle: VoiceHandle, mode: LoopMode) -> Result<(), EngineError> {
        self.voice_mut(handle)?.loop_mode = mode;
        Ok(())
    }

    pub fn set_paused(&mut self, handle: VoiceHandle, paused: bool) -> Result<(), EngineError> {
        self.voice_mut(handle)?.paused = paused;
        Ok(())
    }

    /// Free the slots of finished voices. Returns how many were freed.
    pub fn reclaim(&mut self) -> usize {
        let mut freed = 0;
        for slot in &mut self.slots {
            if slot.voice.as_ref().is_some_and(|v| v.finished) {
                slot.retire();
                freed += 1;
            }
        }
        freed
    }

    /// Drop every voice.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.voice.is_some() {
                slot.retire();
            }
        }
    }

    /// Mix all audible voices into `out` (interleaved, `channels` wide).
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }

        let (output_rate, interpolation, master) = (self.output_rate, self.interpolation, self.master_volume);
        for voice in self.slots.iter_mut().filter_map(|s| s.voice.as_mut()) {
            if voice.paused || voice.finished {
                continue;
            }
            voice.mix_into(out, channels, output_rate, interpolation, master);
        }
    }
}

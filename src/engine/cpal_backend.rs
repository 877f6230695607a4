//! Engine backend using cpal for device output and symphonia for decoding.
//!
//! Each [`CpalInstance`] opens one output stream on one device. The stream
//! callback runs on the audio thread and renders the instance's
//! [`Mixer`](super::mixer::Mixer), which is shared through a mutex with the
//! control thread issuing voice commands.
//!
//! Streamed sounds are decoded on a background thread into a growing
//! buffer; voices that catch up with the decoder output silence until more
//! samples arrive.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, HostId, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use parking_lot::{Mutex, MutexGuard, RwLock};

use super::decoder::AudioDecoder;
use super::mixer::{Mixer, SoundSource, StreamBuffer};
use super::{
    DriverInfo, EngineError, EngineFactory, EngineInstance, GroupHandle, Interpolation, LoopMode, SoundHandle,
    SoundMode, VoiceHandle,
};

/// Display name for a cpal host.
fn host_label(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn output_devices(host: &Host) -> Result<Vec<Device>, EngineError> {
    host.output_devices()
        .map(|devices| devices.collect())
        .map_err(|e| EngineError::Device(e.to_string()))
}

fn driver_info(host: &Host, device: &Device, index: usize) -> DriverInfo {
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    DriverInfo {
        index,
        id: format!("{}:{}", host_label(host.id()), name),
        name,
    }
}

/// Factory for cpal-backed instances on one host.
#[derive(Debug, Clone, Default)]
pub struct CpalEngine {
    host_id: Option<HostId>,
}

impl CpalEngine {
    /// Use the platform's default host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the host whose display name matches `name` (e.g. "ALSA", "JACK").
    pub fn with_host_name(name: &str) -> Result<Self, EngineError> {
        cpal::available_hosts()
            .into_iter()
            .find(|id| host_label(*id).eq_ignore_ascii_case(name))
            .map(|id| Self { host_id: Some(id) })
            .ok_or_else(|| EngineError::Device(format!("Audio host {:?} is not available", name)))
    }

    fn host(&self) -> Result<Host, EngineError> {
        match self.host_id {
            Some(id) => cpal::host_from_id(id).map_err(|e| EngineError::Device(e.to_string())),
            None => Ok(cpal::default_host()),
        }
    }
}

impl EngineFactory for CpalEngine {
    fn create(&self) -> Result<Box<dyn EngineInstance>, EngineError> {
        Ok(Box::new(CpalInstance::new(self.host()?)))
    }

    fn drivers(&self) -> Result<Vec<DriverInfo>, EngineError> {
        let host = self.host()?;
        Ok(output_devices(&host)?
            .iter()
            .enumerate()
            .map(|(i, d)| driver_info(&host, d, i))
            .collect())
    }
}

struct Output {
    _stream: Stream,
    mixer: Arc<Mutex<Mixer>>,
}

struct LoadedSound {
    source: Arc<SoundSource>,
    /// Dropping this stops the stream decoder thread
    _stop_tx: Option<Sender<()>>,
}

/// One open output device.
pub struct CpalInstance {
    host: Host,
    driver: usize,
    output: Option<Output>,
    sounds: HashMap<u64, LoadedSound>,
    next_sound: u64,
}

impl CpalInstance {
    fn new(host: Host) -> Self {
        Self {
            host,
            driver: 0,
            output: None,
            sounds: HashMap::new(),
            next_sound: 1,
        }
    }

    fn mixer(&self) -> Result<MutexGuard<'_, Mixer>, EngineError> {
        self.output
            .as_ref()
            .map(|o| o.mixer.lock())
            .ok_or(EngineError::NotInitialized)
    }

    fn source(&self, sound: SoundHandle) -> Result<&Arc<SoundSource>, EngineError> {
        self.sounds
            .get(&sound.0)
            .map(|s| &s.source)
            .ok_or(EngineError::InvalidSound(sound))
    }

    fn load_static(&self, id: SoundHandle, path: &Path) -> Result<LoadedSound, EngineError> {
        let decoder = AudioDecoder::open(path)?;
        let (rate, channels) = (decoder.sample_rate(), decoder.channels());
        let samples = decoder.decode_all()?;
        Ok(LoadedSound {
            source: Arc::new(SoundSource::new_static(id, rate, channels, samples)),
            _stop_tx: None,
        })
    }

    fn load_stream(&self, id: SoundHandle, path: &Path) -> Result<LoadedSound, EngineError> {
        let decoder = AudioDecoder::open(path)?;
        let buffer = Arc::new(RwLock::new(StreamBuffer::default()));
        let source = Arc::new(SoundSource::new_streaming(
            id,
            decoder.sample_rate(),
            decoder.channels(),
            decoder.frames(),
            Arc::clone(&buffer),
        ));

        let (stop_tx, stop_rx) = bounded::<()>(1);
        thread::Builder::new()
            .name("stream-decoder".to_string())
            .spawn(move || stream_decoder_main(decoder, buffer, stop_rx))
            .map_err(|e| EngineError::Thread(e.to_string()))?;

        Ok(LoadedSound {
            source,
            _stop_tx: Some(stop_tx),
        })
    }
}

/// Decode a streamed sound until it ends or the sound is released.
fn stream_decoder_main(mut decoder: AudioDecoder, buffer: Arc<RwLock<StreamBuffer>>, stop_rx: Receiver<()>) {
    let mut chunk = Vec::with_capacity(8192);
    loop {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => {
                tracing::debug!("Stream decoder stopped");
                return;
            }
        }

        chunk.clear();
        match decoder.decode_next(&mut chunk) {
            Ok(true) => buffer.write().samples.extend_from_slice(&chunk),
            Ok(false) => break,
            Err(e) => {
                tracing::error!("Stream decode error: {}", e);
                break;
            }
        }
    }
    buffer.write().complete = true;
}

fn build_stream<T>(device: &Device, config: &StreamConfig, mixer: Arc<Mutex<Mixer>>) -> Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let mix = &mut scratch[..data.len()];
            mixer.lock().render(mix, channels);
            for (out, sample) in data.iter_mut().zip(mix.iter()) {
                *out = T::from_sample(*sample);
            }
        },
        |err| {
            tracing::error!("Audio stream error: {}", err);
        },
        None,
    )
}

impl EngineInstance for CpalInstance {
    fn driver_count(&self) -> Result<usize, EngineError> {
        Ok(output_devices(&self.host)?.len())
    }

    fn driver_info(&self, index: usize) -> Result<DriverInfo, EngineError> {
        output_devices(&self.host)?
            .get(index)
            .map(|d| driver_info(&self.host, d, index))
            .ok_or(EngineError::NoSuchDriver(index))
    }

    fn set_driver(&mut self, index: usize) -> Result<(), EngineError> {
        if index >= self.driver_count()? {
            return Err(EngineError::NoSuchDriver(index));
        }
        self.driver = index;
        Ok(())
    }

    fn init(&mut self, max_voices: usize, interpolation: Interpolation) -> Result<(), EngineError> {
        if self.output.is_some() {
            self.close()?;
        }

        let device = output_devices(&self.host)?
            .into_iter()
            .nth(self.driver)
            .ok_or(EngineError::NoSuchDriver(self.driver))?;

        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::Device(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let mixer = Arc::new(Mutex::new(Mixer::new(max_voices, sample_rate, interpolation)));
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&mixer)),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&mixer)),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&mixer)),
            format => {
                return Err(EngineError::Stream(format!("Unsupported sample format: {:?}", format)));
            }
        }
        .map_err(|e| EngineError::Stream(e.to_string()))?;

        stream.play().map_err(|e| EngineError::Stream(e.to_string()))?;

        tracing::info!(
            "Opened {} at {}Hz, {} channels, {} voices",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate,
            channels,
            max_voices
        );

        self.output = Some(Output { _stream: stream, mixer });
        Ok(())
    }

    fn master_group(&self) -> Result<GroupHandle, EngineError> {
        self.output
            .as_ref()
            .map(|_| GroupHandle::MASTER)
            .ok_or(EngineError::NotInitialized)
    }

    fn set_group_volume(&mut self, _group: GroupHandle, volume: f32) -> Result<(), EngineError> {
        self.mixer()?.set_master_volume(volume);
        Ok(())
    }

    fn update(&mut self) -> Result<(), EngineError> {
        let freed = self.mixer()?.reclaim();
        if freed > 0 {
            tracing::trace!("Reclaimed {} finished voices", freed);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if let Some(output) = self.output.take() {
            output.mixer.lock().clear();
        }
        self.sounds.clear();
        Ok(())
    }

    fn create_sound(&mut self, path: &Path, mode: SoundMode) -> Result<SoundHandle, EngineError> {
        if self.output.is_none() {
            return Err(EngineError::NotInitialized);
        }

        let id = SoundHandle(self.next_sound);
        let loaded = match mode {
            SoundMode::Sample => self.load_static(id, path)?,
            SoundMode::Stream => self.load_stream(id, path)?,
        };
        self.next_sound += 1;
        self.sounds.insert(id.0, loaded);
        Ok(id)
    }

    fn sound_length(&self, sound: SoundHandle) -> Result<u64, EngineError> {
        self.source(sound).map(|s| s.frames())
    }

    fn sound_frequency(&self, sound: SoundHandle) -> Result<f32, EngineError> {
        self.source(sound).map(|s| s.sample_rate() as f32)
    }

    fn release_sound(&mut self, sound: SoundHandle) -> Result<(), EngineError> {
        self.sounds.remove(&sound.0).ok_or(EngineError::InvalidSound(sound))?;
        if let Ok(mut mixer) = self.mixer() {
            mixer.stop_sound(sound);
        }
        Ok(())
    }

    fn play_sound(&mut self, sound: SoundHandle, paused: bool) -> Result<VoiceHandle, EngineError> {
        let source = Arc::clone(self.source(sound)?);
        Ok(self.mixer()?.start(source, paused))
    }

    fn is_playing(&self, voice: VoiceHandle) -> Result<bool, EngineError> {
        self.mixer()?.is_playing(voice)
    }

    fn stop(&mut self, voice: VoiceHandle) -> Result<(), EngineError> {
        self.mixer()?.stop(voice)
    }

    fn position(&self, voice: VoiceHandle) -> Result<u64, EngineError> {
        self.mixer()?.position(voice)
    }

    fn set_position(&mut self, voice: VoiceHandle, frame: u64) -> Result<(), EngineError> {
        self.mixer()?.set_position(voice, frame)
    }

    fn set_volume(&mut self, voice: VoiceHandle, volume: f32) -> Result<(), EngineError> {
        self.mixer()?.set_volume(voice, volume)
    }

    fn set_pan(&mut self, voice: VoiceHandle, pan: f32) -> Result<(), EngineError> {
        self.mixer()?.set_pan(voice, pan)
    }

    fn frequency(&self, voice: VoiceHandle) -> Result<f32, EngineError> {
        self.mixer()?.frequency(voice)
    }

    fn set_frequency(&mut self, voice: VoiceHandle, frequency: f32) -> Result<(), EngineError> {
        self.mixer()?.set_frequency(voice, frequency)
    }

    fn set_loop_mode(&mut self, voice: VoiceHandle, mode: LoopMode) -> Result<(), EngineError> {
        self.mixer()?.set_loop_mode(voice, mode)
    }

    fn set_paused(&mut self, voice: VoiceHandle, paused: bool) -> Result<(), EngineError> {
        self.mixer()?.set_paused(voice, paused)
    }
}

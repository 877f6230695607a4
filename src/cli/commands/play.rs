//! Playback command.

use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use super::DeviceTarget;
use crate::{AudioContext, LoadOptions};

/// Roughly one display frame
const TICK: Duration = Duration::from_millis(16);

/// Settings for [`cmd_play`]; `None` keeps the configured default.
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub volume: Option<f32>,
    pub pan: Option<f32>,
    pub speed: Option<f32>,
    pub looping: bool,
    pub stream: bool,
    pub fade_in: bool,
    pub fade_out_after_ms: Option<u64>,
    pub fade_ms: Option<u64>,
    pub seconds: Option<f32>,
}

/// Play a file on one device until it ends
pub fn cmd_play(ctx: &AudioContext, file: &str, target: &DeviceTarget, options: &PlayOptions) -> anyhow::Result<()> {
    let device = target.index(ctx)?;
    let mut player = ctx.player();
    player.load_with(file, device, LoadOptions { stream: options.stream })?;

    if let Some(pan) = options.pan {
        player.set_pan(pan);
    }
    if let Some(speed) = options.speed {
        player.set_speed(speed);
    }
    if let Some(fade_ms) = options.fade_ms {
        player.set_fade_duration_ms(fade_ms);
    }
    player.set_loop(options.looping);

    let target_volume = options.volume.unwrap_or(player.volume());
    if options.fade_in {
        // A fade always ends at full volume; anything but 1.0 starts it
        player.set_volume(0.0);
        player.fade_in();
    } else {
        player.set_volume(target_volume);
        player.play();
    }

    println!(
        "Playing {} on [{}] {} ({:.1} s)",
        file,
        player.device(),
        player.device_name(),
        player.length_ms() / 1000.0
    );

    let limit = options.seconds.map(Duration::from_secs_f32);
    let fade_out_at = options.fade_out_after_ms.map(Duration::from_millis);
    let started = Instant::now();
    let mut fade_out_started = false;

    loop {
        player.update();

        let elapsed = started.elapsed();
        if !fade_out_started && fade_out_at.is_some_and(|at| elapsed >= at) {
            info!("Fading out after {:?}", elapsed);
            player.fade_out();
            fade_out_started = true;
        }
        if limit.is_some_and(|limit| elapsed >= limit) {
            player.stop();
            break;
        }
        if !player.is_playing() {
            break;
        }
        thread::sleep(TICK);
    }

    println!("Stopped after {:.1} s", started.elapsed().as_secs_f32());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Event, test_context};

    #[test]
    fn test_play_stops_at_time_limit() {
        let (ctx, engine, _clock) = test_context();
        let options = PlayOptions {
            pan: Some(0.25),
            seconds: Some(0.0),
            ..Default::default()
        };

        cmd_play(&ctx, "click.wav", &DeviceTarget::Name("usb".to_string()), &options).unwrap();
        let started = engine
            .events()
            .iter()
            .filter(|e| matches!(e, Event::VoiceStarted { instance: 0, .. }))
            .count();
        assert_eq!(started, 1);
        assert_eq!(engine.stop_count(), 1);
        assert_eq!(engine.loaded_sounds(0), 0);
    }

    #[test]
    fn test_play_reports_load_failure() {
        let (ctx, _engine, _clock) = test_context();
        let result = cmd_play(&ctx, "missing.wav", &DeviceTarget::Index(0), &PlayOptions::default());
        assert!(result.is_err());
    }
}

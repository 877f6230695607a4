//! Device listing and file info commands.

use super::DeviceTarget;
use crate::AudioContext;

/// List output devices
pub fn cmd_devices(ctx: &AudioContext) -> anyhow::Result<()> {
    let devices = ctx.registry().list_devices()?;
    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }

    println!("Output devices:");
    for device in devices {
        println!("  [{}] {}  ({})", device.index, device.name, device.id);
    }
    Ok(())
}

/// Load a file and print what the engine knows about it
pub fn cmd_info(ctx: &AudioContext, file: &str, target: &DeviceTarget) -> anyhow::Result<()> {
    let device = target.index(ctx)?;
    let mut player = ctx.player();
    player.load(file, device)?;

    println!("File:        {}", ctx.resolver().resolve(file).display());
    println!("Device:      [{}] {}", player.device(), player.device_name());
    println!("Sample rate: {} Hz", player.base_frequency());
    println!("Length:      {} frames ({:.1} s)", player.length_frames(), player.length_ms() / 1000.0);
    Ok(())
}

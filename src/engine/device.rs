//! Audio device lookup helpers shared by the engine and `vmemo list-devices`.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait};

#[cfg(target_os = "linux")]
use std::fs::OpenOptions;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Resolves the configured input device.
///
/// `device_spec` is "default" for the system default, a numeric index as
/// printed by `vmemo list-devices`, or an exact device name.
///
/// # Errors
/// - If no device with the specified name/index is found
pub fn find_input_device(host: &cpal::Host, device_spec: &str) -> Result<cpal::Device> {
    if device_spec == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| anyhow!("No audio input device available"));
    }

    if let Ok(index) = device_spec.parse::<usize>() {
        let devices: Vec<_> = host
            .input_devices()
            .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?
            .collect();
        let count = devices.len();

        return devices.into_iter().nth(index).ok_or_else(|| {
            anyhow!(
                "Device index {} is out of range (0-{})",
                index,
                count.saturating_sub(1)
            )
        });
    }

    let devices = host
        .input_devices()
        .map_err(|e| anyhow!("Failed to enumerate devices: {e}"))?;

    for device in devices {
        if let Ok(name) = device.name() {
            if name == device_spec {
                return Ok(device);
            }
        }
    }

    Err(anyhow!(
        "Audio input device '{device_spec}' not found. Use 'vmemo list-devices' to see available devices."
    ))
}

/// Temporarily redirects stderr to /dev/null to suppress ALSA library warnings on Linux.
#[cfg(target_os = "linux")]
pub fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let dev_null = OpenOptions::new()
        .write(true)
        .open("/dev/null")
        .map_err(|e| anyhow!("Failed to open /dev/null: {e}"))?;

    let dev_null_fd = dev_null.as_raw_fd();

    let old_stderr = unsafe { libc::dup(libc::STDERR_FILENO) };
    if old_stderr == -1 {
        return Err(anyhow!("Failed to duplicate stderr"));
    }

    let redirect_result = unsafe { libc::dup2(dev_null_fd, libc::STDERR_FILENO) };
    if redirect_result == -1 {
        unsafe { libc::close(old_stderr) };
        return Err(anyhow!("Failed to redirect stderr"));
    }

    let result = f();

    unsafe {
        libc::dup2(old_stderr, libc::STDERR_FILENO);
        libc::close(old_stderr);
    }

    result
}

/// ALSA only exists on Linux; elsewhere this just runs the closure.
#[cfg(not(target_os = "linux"))]
pub fn suppress_alsa_warnings<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    f()
}

/// Converts an interleaved block to mono by averaging channels.
pub fn downmix_to_mono(data: &[i16], num_channels: usize, out: &mut Vec<i16>) {
    match num_channels {
        0 => {}
        1 => out.extend_from_slice(data),
        2 => {
            for chunk in data.chunks_exact(2) {
                let left = chunk[0] as i32;
                let right = chunk[1] as i32;
                out.push(((left + right) / 2) as i16);
            }
        }
        _ => {
            for chunk in data.chunks_exact(num_channels) {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                out.push((sum / num_channels as i32) as i16);
            }
        }
    }
}

/// RMS level of the most recent `window` samples in dBFS.
///
/// Silence (or no samples at all) reports -160 dB, the engine floor.
pub fn level_dbfs(samples: &[i16], window: usize) -> f32 {
    if samples.is_empty() || window == 0 {
        return -160.0;
    }

    let count = window.min(samples.len());
    let recent = &samples[samples.len() - count..];

    let sum_of_squares: i64 = recent.iter().map(|&x| (x as i64).pow(2)).sum();
    let mean_square = sum_of_squares / recent.len() as i64;
    let rms = (mean_square as f32).sqrt();

    if rms > 0.0 {
        (20.0 * (rms / 32767.0).log10()).max(-160.0)
    } else {
        -160.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo_averages_pairs() {
        let mut out = Vec::new();
        downmix_to_mono(&[100, 300, -50, 50], 2, &mut out);
        assert_eq!(out, vec![200, 0]);
    }

    #[test]
    fn test_downmix_multichannel() {
        let mut out = Vec::new();
        downmix_to_mono(&[3, 6, 9, 0, 0, 0], 3, &mut out);
        assert_eq!(out, vec![6, 0]);
    }

    #[test]
    fn test_level_of_silence_is_floor() {
        assert_eq!(level_dbfs(&[], 800), -160.0);
        assert_eq!(level_dbfs(&[0; 100], 800), -160.0);
    }

    #[test]
    fn test_level_of_full_scale_is_zero() {
        let level = level_dbfs(&[32767; 64], 64);
        assert!(level.abs() < 0.01, "got {level}");
    }

    #[test]
    fn test_level_uses_only_recent_window() {
        let mut samples = vec![32767; 100];
        samples.extend_from_slice(&[0; 10]);
        assert_eq!(level_dbfs(&samples, 10), -160.0);
    }
}

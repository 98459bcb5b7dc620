//! Configuration file management for vmemo.
//!
//! This module handles loading and saving application configuration from TOML files.
//! Configuration is stored in the user's config directory and written with
//! defaults on first run.

use crate::engine::QualityPreset;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Audio capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `vmemo list-devices`
    /// - device name from `vmemo list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Capture quality: "high" (device rate) or "low" (16 kHz)
    #[serde(default)]
    pub quality: QualityPreset,
    /// How often the input level is sampled while recording
    #[serde(default = "default_metering_interval_ms")]
    pub metering_interval_ms: u64,
}

impl AudioConfig {
    pub fn metering_interval(&self) -> Duration {
        Duration::from_millis(self.metering_interval_ms.max(1))
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            quality: QualityPreset::default(),
            metering_interval_ms: default_metering_interval_ms(),
        }
    }
}

fn default_device() -> String {
    "default".to_string()
}

fn default_metering_interval_ms() -> u64 {
    100
}

/// Playback configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Interval between playback status updates (16ms is roughly 60Hz)
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

impl PlaybackConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

fn default_status_interval_ms() -> u64 {
    16
}

/// Conversion of finished recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Convert recordings after capture; when off, memos keep the raw WAV
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// ffmpeg audio codec
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Target bitrate passed to `-b:a`
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    /// Target sample rate passed to `-ar`
    #[serde(default = "default_sample_rate")]
    pub sample_rate: String,
    /// Where converted files go. Defaults to ~/.local/share/vmemo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            codec: default_codec(),
            bitrate: default_bitrate(),
            sample_rate: default_sample_rate(),
            output_dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_codec() -> String {
    "libmp3lame".to_string()
}

fn default_bitrate() -> String {
    "128k".to_string()
}

fn default_sample_rate() -> String {
    "44.1k".to_string()
}

/// Waveform display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformConfig {
    /// Number of bars per memo
    #[serde(default = "default_bars")]
    pub bars: usize,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            bars: default_bars(),
        }
    }
}

fn default_bars() -> usize {
    crate::waveform::WAVEFORM_BARS
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmemoConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub waveform: WaveformConfig,
}

impl VmemoConfig {
    /// Loads configuration from the user's config directory, writing the
    /// defaults first if the file does not exist yet.
    ///
    /// # Errors
    /// - If the config directory cannot be determined or created
    /// - If the config file cannot be read or written
    /// - If the TOML is malformed
    pub fn load() -> anyhow::Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Default configuration written to {}", config_path.display());
            return Ok(config);
        }
        Self::load_from(&config_path)
    }

    /// Loads configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config_content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read {}: {e}", path.display()))?;
        let config: VmemoConfig = toml::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid configuration in {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Saves configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        tracing::debug!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Directory where transcoded memos are written.
    pub fn output_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.transcode.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => data_dir(),
        }
    }
}

/// Retrieves the path to the config file, creating its directory.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn get_config_path() -> anyhow::Result<PathBuf> {
    let config_dir = dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))?
        .join(".config")
        .join("vmemo");

    fs::create_dir_all(&config_dir)
        .map_err(|e| anyhow!("Failed to create config directory: {e}"))?;

    Ok(config_dir.join("vmemo.toml"))
}

/// Application data directory (~/.local/share/vmemo).
pub fn data_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow!("Could not determine home directory"))?
        .join(".local")
        .join("share")
        .join("vmemo"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VmemoConfig::default();
        assert_eq!(config.audio.device, "default");
        assert_eq!(config.audio.metering_interval(), Duration::from_millis(100));
        assert_eq!(config.playback.status_interval_ms, 16);
        assert!(config.transcode.enabled);
        assert_eq!(config.transcode.codec, "libmp3lame");
        assert_eq!(config.transcode.bitrate, "128k");
        assert_eq!(config.transcode.sample_rate, "44.1k");
        assert_eq!(config.waveform.bars, 50);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: VmemoConfig = toml::from_str(
            r#"
            [audio]
            device = "2"
            quality = "low"

            [transcode]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.device, "2");
        assert_eq!(config.audio.quality, QualityPreset::Low);
        assert_eq!(config.audio.metering_interval_ms, 100);
        assert!(!config.transcode.enabled);
        assert_eq!(config.transcode.bitrate, "128k");
        assert_eq!(config.playback, PlaybackConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("vmemo.toml");

        let mut config = VmemoConfig::default();
        config.waveform.bars = 32;
        config.transcode.output_dir = Some(PathBuf::from("/srv/memos"));
        config.save_to(&path).unwrap();

        let loaded = VmemoConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.output_dir().unwrap(), PathBuf::from("/srv/memos"));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmemo.toml");
        fs::write(&path, "[audio\ndevice = ").unwrap();

        let err = VmemoConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("vmemo.toml"));
    }
}

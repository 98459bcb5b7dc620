//! Audio engine abstraction.
//!
//! The recording session and the playback controllers never touch audio
//! devices directly. They talk to an [`AudioEngine`], which owns capture and
//! playback resources and reports their progress through status channels.
//!
//! Status updates are delivered over unbounded tokio channels returned from
//! the `open_*` calls; the owner of the handle drains its receiver on the
//! runtime, so status handling for a single resource is never reentrant.

pub mod cpal_engine;
pub mod decode;
pub mod device;
#[cfg(test)]
pub mod mock;

use crate::error::AudioResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

pub use cpal_engine::CpalEngine;

/// Result of a microphone permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Session-wide audio routing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioMode {
    /// Whether the input path is open for recording.
    pub recording_enabled: bool,
    /// Keep playback audible when the device is in silent mode.
    pub silent_mode_playback: bool,
}

/// Capture quality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// Device native rate, 16-bit mono.
    #[default]
    High,
    /// 16 kHz, 16-bit mono.
    Low,
}

impl QualityPreset {
    /// Requested sample rate, or `None` to use whatever the device offers.
    pub fn sample_rate(&self) -> Option<u32> {
        match self {
            QualityPreset::High => None,
            QualityPreset::Low => Some(16_000),
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Opaque handle to an open capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub u64);

/// Opaque handle to an open playback resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(pub u64);

/// Periodic status of an active capture.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CaptureStatus {
    /// Current input level in dBFS, if the engine could measure one.
    pub metering_db: Option<f32>,
    pub duration_millis: u64,
}

/// Periodic status of a playback resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub position_millis: u64,
    pub duration_millis: u64,
    pub did_just_finish: bool,
}

/// Capture and playback capabilities used by the memo workflow.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Asks for access to the microphone.
    async fn request_permission(&self) -> AudioResult<Permission>;

    /// Switches the audio session between recording and playback routing.
    async fn configure_mode(&self, mode: AudioMode) -> AudioResult<()>;

    /// Opens a capture and starts recording immediately.
    ///
    /// The receiver yields a status roughly every `metering_interval`.
    async fn open_capture(
        &self,
        preset: QualityPreset,
        metering_interval: Duration,
    ) -> AudioResult<(CaptureHandle, mpsc::UnboundedReceiver<CaptureStatus>)>;

    /// Stops the capture, writes it out and releases the device.
    ///
    /// Returns the location of the captured file.
    async fn finalize_capture(&self, handle: CaptureHandle) -> AudioResult<PathBuf>;

    /// Loads a file for playback, paused at position 0.
    ///
    /// The receiver yields a status roughly every `status_interval` and once
    /// more after each state change.
    async fn open_playback(
        &self,
        path: &Path,
        status_interval: Duration,
    ) -> AudioResult<(PlaybackHandle, mpsc::UnboundedReceiver<PlaybackStatus>)>;

    async fn play(&self, handle: PlaybackHandle) -> AudioResult<()>;

    async fn pause(&self, handle: PlaybackHandle) -> AudioResult<()>;

    async fn seek(&self, handle: PlaybackHandle, position_millis: u64) -> AudioResult<()>;

    /// Releases the resource. The status channel closes afterwards.
    async fn release(&self, handle: PlaybackHandle) -> AudioResult<()>;
}

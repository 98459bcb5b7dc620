//! Error taxonomy for the audio subsystem.
//!
//! Application-level code (CLI, config, terminal UI) works with `anyhow`;
//! the recording, playback and transcoding layers return [`AudioError`] so
//! callers can tell a denied microphone from a failed conversion.

use thiserror::Error;

/// Errors raised by the audio engine, the transcoder and the state machines
/// built on top of them.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Microphone access was refused.
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable capture device, or the capture stream could not be opened.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Conversion of a captured file failed. Always recovered locally.
    #[error("transcode failed: {0}")]
    Transcode(String),

    /// Engine-level failure during play/pause/seek/release/finalize.
    #[error("audio engine error: {0}")]
    Engine(String),

    /// The handle was already released by its owner.
    #[error("audio resource already released")]
    Released,
}

impl AudioError {
    /// True for the errors `start()` can fail with.
    pub fn is_permission_or_device(&self) -> bool {
        matches!(
            self,
            AudioError::PermissionDenied(_) | AudioError::DeviceUnavailable(_)
        )
    }
}

pub type AudioResult<T> = Result<T, AudioError>;

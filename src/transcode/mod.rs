//! Conversion of raw captures into the compressed delivery format.

pub mod ffmpeg;
#[cfg(test)]
pub mod mock;

use crate::error::AudioResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use ffmpeg::FfmpegTranscoder;

/// Converts a captured file, returning the location of the converted copy.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, input: &Path) -> AudioResult<PathBuf>;
}

/// Keeps captures in their original format.
///
/// Used when conversion is disabled in the config.
pub struct Passthrough;

#[async_trait]
impl Transcoder for Passthrough {
    async fn convert(&self, input: &Path) -> AudioResult<PathBuf> {
        Ok(input.to_path_buf())
    }
}

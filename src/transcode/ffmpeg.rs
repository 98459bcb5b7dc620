//! ffmpeg-backed transcoder.
//!
//! Converts raw captures to the delivery format by running the ffmpeg binary.
//! The binary is looked up in the usual install locations before falling back
//! to a PATH search, so it is found even when the app is started from a
//! launcher with a minimal environment.

use super::Transcoder;
use crate::config::TranscodeConfig;
use crate::error::{AudioError, AudioResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Locates the ffmpeg binary on the system.
///
/// Checks in this order:
/// 1. macOS homebrew locations: `/opt/homebrew/bin/ffmpeg`, `/usr/local/bin/ffmpeg`
/// 2. Linux standard locations: `/usr/bin/ffmpeg`, `/usr/local/bin/ffmpeg`, `/snap/bin/ffmpeg`
/// 3. Windows standard locations: `C:\ffmpeg\bin\ffmpeg.exe`
/// 4. Falls back to PATH search via `which` or `where` command
pub fn find_ffmpeg() -> Result<PathBuf> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/snap/bin/ffmpeg"),
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    } else {
        vec![]
    };

    if let Some(path) = candidates.into_iter().find(|p| p.exists()) {
        tracing::debug!("Found ffmpeg at: {}", path.display());
        return Ok(path);
    }

    let ffmpeg_path = find_in_path("ffmpeg")?;
    tracing::debug!("Found ffmpeg in PATH at: {}", ffmpeg_path.display());
    Ok(ffmpeg_path)
}

/// Searches for a binary in the system PATH.
fn find_in_path(binary_name: &str) -> Result<PathBuf> {
    let search_cmd = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };

    let output = std::process::Command::new(search_cmd)
        .arg(binary_name)
        .output()
        .map_err(|e| anyhow!("Failed to search PATH for {binary_name}: {e}"))?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        let path = PathBuf::from(path_str.lines().next().unwrap_or("").trim());
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }

    Err(anyhow!(
        "ffmpeg not found. Please install ffmpeg:\n\
         macOS: brew install ffmpeg\n\
         Linux: apt install ffmpeg (Debian/Ubuntu) or dnf install ffmpeg (Fedora)"
    ))
}

/// Transcodes captures to mp3 (or whatever codec is configured) with ffmpeg.
pub struct FfmpegTranscoder {
    codec: String,
    bitrate: String,
    sample_rate: String,
    extension: String,
    output_dir: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(config: &TranscodeConfig, output_dir: PathBuf) -> Self {
        Self {
            codec: config.codec.clone(),
            bitrate: config.bitrate.clone(),
            sample_rate: config.sample_rate.clone(),
            extension: extension_for_codec(&config.codec).to_string(),
            output_dir,
        }
    }

    /// Output location for a conversion started now.
    fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "audio_{}.{}",
            Local::now().timestamp_millis(),
            self.extension
        ))
    }

    /// ffmpeg arguments for converting `input` into `output`.
    fn arguments(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-c:a".to_string(),
            self.codec.clone(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            "-ar".to_string(),
            self.sample_rate.clone(),
            "-y".to_string(),
            output.display().to_string(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, input: &Path) -> AudioResult<PathBuf> {
        let ffmpeg_path = find_ffmpeg().map_err(|e| AudioError::Transcode(e.to_string()))?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AudioError::Transcode(format!("Failed to create output dir: {e}")))?;

        let output_path = self.output_path();
        let output = Command::new(&ffmpeg_path)
            .args(self.arguments(input, &output_path))
            .output()
            .await
            .map_err(|e| AudioError::Transcode(format!("Failed to run ffmpeg: {e}")))?;

        if output.status.success() {
            tracing::info!("Conversion successful: {}", output_path.display());
            Ok(output_path)
        } else {
            let error_msg = String::from_utf8_lossy(&output.stderr);
            tracing::error!("ffmpeg conversion failed: {}", error_msg.trim());
            Err(AudioError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                error_msg.trim()
            )))
        }
    }
}

/// File extension matching an ffmpeg audio codec name.
pub fn extension_for_codec(codec: &str) -> &str {
    match codec {
        "libmp3lame" | "mp3" => "mp3",
        "libopus" | "libvorbis" => "ogg",
        "flac" => "flac",
        "aac" => "m4a",
        "pcm_s16le" => "wav",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder() -> FfmpegTranscoder {
        FfmpegTranscoder::new(&TranscodeConfig::default(), PathBuf::from("/data/vmemo"))
    }

    #[test]
    fn test_find_ffmpeg() {
        // Passes whether or not ffmpeg is installed on this machine
        match find_ffmpeg() {
            Ok(path) => println!("Found ffmpeg at: {}", path.display()),
            Err(e) => println!("ffmpeg not found (expected on CI): {e}"),
        }
    }

    #[test]
    fn test_default_arguments_target_mp3_128k_44k() {
        let args = transcoder().arguments(
            Path::new("/tmp/capture.wav"),
            Path::new("/data/vmemo/audio_1.mp3"),
        );
        let joined = args.join(" ");
        assert_eq!(
            joined,
            "-loglevel error -i /tmp/capture.wav -c:a libmp3lame -b:a 128k -ar 44.1k -y /data/vmemo/audio_1.mp3"
        );
    }

    #[test]
    fn test_output_path_uses_codec_extension() {
        let path = transcoder().output_path();
        assert_eq!(path.parent(), Some(Path::new("/data/vmemo")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp3"));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("audio_")));
    }

    #[test]
    fn test_extension_for_codec() {
        assert_eq!(extension_for_codec("libmp3lame"), "mp3");
        assert_eq!(extension_for_codec("libopus"), "ogg");
        assert_eq!(extension_for_codec("aac"), "m4a");
        assert_eq!(extension_for_codec("wavpack"), "wavpack");
    }

    #[tokio::test]
    async fn test_convert_missing_input_fails_with_transcode_error() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder =
            FfmpegTranscoder::new(&TranscodeConfig::default(), dir.path().to_path_buf());
        let result = transcoder
            .convert(&dir.path().join("does-not-exist.wav"))
            .await;
        assert!(matches!(result, Err(AudioError::Transcode(_))));
    }
}

//! Configuration management for vmemo.
//!
//! Configuration lives in `~/.config/vmemo/vmemo.toml`. Every field has a
//! default, so a partial (or missing) file is always valid.

pub mod file;

pub use file::{
    data_dir, get_config_path, AudioConfig, PlaybackConfig, TranscodeConfig, VmemoConfig,
    WaveformConfig,
};

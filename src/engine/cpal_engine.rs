//! [`AudioEngine`] implementation on top of cpal.
//!
//! Capture records 16-bit mono PCM from the configured input device and
//! writes it out as WAV on finalize. Playback decodes the whole file up front
//! and streams it to the default output device.
//!
//! cpal streams are kept on dedicated threads (they are not `Send` on every
//! platform); the engine talks to them through shared atomics and a stop
//! channel. Status channels are fed by tokio interval tasks.

use super::decode::{decode_file, DecodedAudio};
use super::device::{downmix_to_mono, find_input_device, level_dbfs, suppress_alsa_warnings};
use super::{
    AudioEngine, AudioMode, CaptureHandle, CaptureStatus, Permission, PlaybackHandle,
    PlaybackStatus, QualityPreset,
};
use crate::error::{AudioError, AudioResult};
use crate::sync::lock;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Local;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::WavWriter;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// A capture in progress.
struct ActiveCapture {
    samples: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
    stopped: Arc<AtomicBool>,
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Decoded audio plus the transport state shared with the output callback.
struct PlayerShared {
    audio: DecodedAudio,
    /// Read position in source samples (fractional when resampling).
    cursor: Mutex<f64>,
    playing: AtomicBool,
    finished: AtomicBool,
}

impl PlayerShared {
    fn new(audio: DecodedAudio) -> Self {
        Self {
            audio,
            cursor: Mutex::new(0.0),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    fn status(&self, did_just_finish: bool) -> PlaybackStatus {
        let duration_millis = self.audio.duration_millis();
        let cursor = *lock(&self.cursor);
        let position_millis = if self.audio.sample_rate == 0 {
            0
        } else {
            ((cursor * 1000.0 / self.audio.sample_rate as f64) as u64).min(duration_millis)
        };

        PlaybackStatus {
            is_loaded: true,
            is_playing: self.playing.load(Ordering::Acquire),
            position_millis,
            duration_millis,
            did_just_finish,
        }
    }

    /// Fills an interleaved output block, advancing the cursor.
    fn render(&self, data: &mut [f32], channels: usize, output_rate: u32) {
        if !self.playing.load(Ordering::Acquire) || channels == 0 {
            data.fill(0.0);
            return;
        }

        let step = self.audio.sample_rate as f64 / output_rate.max(1) as f64;
        let mut cursor = lock(&self.cursor);

        for frame in data.chunks_mut(channels) {
            let sample = self
                .audio
                .samples
                .get(*cursor as usize)
                .copied()
                .unwrap_or(0.0);
            frame.fill(sample);
            *cursor += step;
        }

        if *cursor as usize >= self.audio.samples.len() {
            *cursor = self.audio.samples.len() as f64;
            self.playing.store(false, Ordering::Release);
            self.finished.store(true, Ordering::Release);
        }
    }
}

/// A loaded playback resource.
struct ActivePlayback {
    shared: Arc<PlayerShared>,
    released: Arc<AtomicBool>,
    stop_tx: std_mpsc::Sender<()>,
    status_tx: mpsc::UnboundedSender<PlaybackStatus>,
}

/// cpal-backed audio engine.
pub struct CpalEngine {
    /// Input device spec: "default", an index, or a device name
    device_name: String,
    /// Where finalized captures are written
    capture_dir: PathBuf,
    next_id: AtomicU64,
    mode: Mutex<AudioMode>,
    captures: Mutex<HashMap<u64, ActiveCapture>>,
    players: Mutex<HashMap<u64, ActivePlayback>>,
}

impl CpalEngine {
    /// Creates an engine recording from `device_name` into `capture_dir`.
    pub fn new(device_name: String, capture_dir: PathBuf) -> Self {
        Self {
            device_name,
            capture_dir,
            next_id: AtomicU64::new(1),
            mode: Mutex::new(AudioMode::default()),
            captures: Mutex::new(HashMap::new()),
            players: Mutex::new(HashMap::new()),
        }
    }

    /// Current routing flags.
    pub fn mode(&self) -> AudioMode {
        *lock(&self.mode)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Pushes an out-of-band status after a transport change.
    fn emit(&self, handle: PlaybackHandle) -> AudioResult<()> {
        let players = lock(&self.players);
        let player = players.get(&handle.0).ok_or(AudioError::Released)?;
        let _ = player.status_tx.send(player.shared.status(false));
        Ok(())
    }

    fn with_player<F>(&self, handle: PlaybackHandle, f: F) -> AudioResult<()>
    where
        F: FnOnce(&PlayerShared),
    {
        {
            let players = lock(&self.players);
            let player = players.get(&handle.0).ok_or(AudioError::Released)?;
            f(&player.shared);
        }
        self.emit(handle)
    }
}

#[async_trait]
impl AudioEngine for CpalEngine {
    async fn request_permission(&self) -> AudioResult<Permission> {
        // Desktop hosts have no permission prompt; an enumerable input
        // side is as close as we get to "granted".
        let result = tokio::task::spawn_blocking(|| {
            suppress_alsa_warnings(|| {
                let host = cpal::default_host();
                host.input_devices()
                    .map(|_| ())
                    .map_err(|e| anyhow!("Failed to enumerate input devices: {e}"))
            })
        })
        .await
        .map_err(|e| AudioError::Engine(e.to_string()))?;

        match result {
            Ok(()) => Ok(Permission::Granted),
            Err(e) => {
                tracing::warn!("Microphone access unavailable: {}", e);
                Ok(Permission::Denied)
            }
        }
    }

    async fn configure_mode(&self, mode: AudioMode) -> AudioResult<()> {
        tracing::debug!(
            "Audio mode: recording_enabled={}, silent_mode_playback={}",
            mode.recording_enabled,
            mode.silent_mode_playback
        );
        *lock(&self.mode) = mode;
        Ok(())
    }

    async fn open_capture(
        &self,
        preset: QualityPreset,
        metering_interval: Duration,
    ) -> AudioResult<(CaptureHandle, mpsc::UnboundedReceiver<CaptureStatus>)> {
        let samples = Arc::new(Mutex::new(Vec::new()));
        let device_name = self.device_name.clone();
        let thread_samples = Arc::clone(&samples);

        let (sample_rate, stop_tx, thread) = tokio::task::spawn_blocking(move || {
            spawn_capture_thread(device_name, preset, thread_samples)
        })
        .await
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

        let id = self.next_id();
        let stopped = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let meter_samples = Arc::clone(&samples);
        let meter_stopped = Arc::clone(&stopped);
        let window = (sample_rate / 20).max(1) as usize;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(metering_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if meter_stopped.load(Ordering::Acquire) {
                    break;
                }
                let status = {
                    let buf = lock(&meter_samples);
                    CaptureStatus {
                        metering_db: Some(level_dbfs(&buf, window)),
                        duration_millis: buf.len() as u64 * 1000 / sample_rate.max(1) as u64,
                    }
                };
                if tx.send(status).is_err() {
                    break;
                }
            }
        });

        lock(&self.captures).insert(
            id,
            ActiveCapture {
                samples,
                sample_rate,
                stopped,
                stop_tx,
                thread,
            },
        );

        tracing::debug!("Capture {} opened at {}Hz ({} preset)", id, sample_rate, preset);
        Ok((CaptureHandle(id), rx))
    }

    async fn finalize_capture(&self, handle: CaptureHandle) -> AudioResult<PathBuf> {
        let capture = lock(&self.captures)
            .remove(&handle.0)
            .ok_or(AudioError::Released)?;
        capture.stopped.store(true, Ordering::Release);

        let path = self.capture_dir.join(format!(
            "recording_{}_{}.wav",
            Local::now().timestamp_millis(),
            handle.0
        ));

        tokio::task::spawn_blocking(move || -> anyhow::Result<PathBuf> {
            let _ = capture.stop_tx.send(());
            if capture.thread.join().is_err() {
                tracing::warn!("Capture thread panicked; saving what was recorded");
            }

            let samples = std::mem::take(&mut *lock(&capture.samples));
            let duration_secs = samples.len() as f32 / capture.sample_rate.max(1) as f32;
            tracing::info!(
                "Recording stopped: {:.2}s ({} samples at {}Hz)",
                duration_secs,
                samples.len(),
                capture.sample_rate
            );

            save_wav(&samples, capture.sample_rate, &path)?;
            Ok(path)
        })
        .await
        .map_err(|e| AudioError::Engine(e.to_string()))?
        .map_err(|e| AudioError::Engine(e.to_string()))
    }

    async fn open_playback(
        &self,
        path: &Path,
        status_interval: Duration,
    ) -> AudioResult<(PlaybackHandle, mpsc::UnboundedReceiver<PlaybackStatus>)> {
        let path = path.to_path_buf();

        let (shared, stop_tx) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let audio = decode_file(&path)?;
            let shared = Arc::new(PlayerShared::new(audio));
            let stop_tx = spawn_output_thread(Arc::clone(&shared))?;
            Ok((shared, stop_tx))
        })
        .await
        .map_err(|e| AudioError::Engine(e.to_string()))?
        .map_err(|e| AudioError::Engine(e.to_string()))?;

        let id = self.next_id();
        let released = Arc::new(AtomicBool::new(false));
        let (status_tx, rx) = mpsc::unbounded_channel();
        let _ = status_tx.send(shared.status(false));

        let tick_shared = Arc::clone(&shared);
        let tick_released = Arc::clone(&released);
        let tick_tx = status_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(status_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tick_released.load(Ordering::Acquire) {
                    break;
                }
                let finished = tick_shared.finished.swap(false, Ordering::AcqRel);
                if tick_tx.send(tick_shared.status(finished)).is_err() {
                    break;
                }
            }
        });

        lock(&self.players).insert(
            id,
            ActivePlayback {
                shared,
                released,
                stop_tx,
                status_tx,
            },
        );

        tracing::debug!("Playback {} opened", id);
        Ok((PlaybackHandle(id), rx))
    }

    async fn play(&self, handle: PlaybackHandle) -> AudioResult<()> {
        self.with_player(handle, |shared| {
            shared.finished.store(false, Ordering::Release);
            shared.playing.store(true, Ordering::Release);
        })
    }

    async fn pause(&self, handle: PlaybackHandle) -> AudioResult<()> {
        self.with_player(handle, |shared| {
            shared.playing.store(false, Ordering::Release);
        })
    }

    async fn seek(&self, handle: PlaybackHandle, position_millis: u64) -> AudioResult<()> {
        self.with_player(handle, |shared| {
            let target = position_millis as f64 * shared.audio.sample_rate as f64 / 1000.0;
            *lock(&shared.cursor) = target.min(shared.audio.samples.len() as f64);
        })
    }

    async fn release(&self, handle: PlaybackHandle) -> AudioResult<()> {
        let player = lock(&self.players)
            .remove(&handle.0)
            .ok_or(AudioError::Released)?;
        player.released.store(true, Ordering::Release);
        player.shared.playing.store(false, Ordering::Release);
        let _ = player.stop_tx.send(());
        tracing::debug!("Playback {} released", handle.0);
        Ok(())
    }
}

/// Starts the thread owning the input stream.
///
/// Returns once the stream is running, with the actual sample rate.
fn spawn_capture_thread(
    device_name: String,
    preset: QualityPreset,
    samples: Arc<Mutex<Vec<i16>>>,
) -> anyhow::Result<(u32, std_mpsc::Sender<()>, JoinHandle<()>)> {
    let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<u32, String>>(1);
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    let thread = std::thread::spawn(move || {
        let stream = match build_capture_stream(&device_name, preset, samples) {
            Ok((stream, rate)) => {
                let _ = ready_tx.send(Ok(rate));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
        };
        // Blocks until finalize (or the engine is dropped).
        let _ = stop_rx.recv();
        drop(stream);
        tracing::debug!("Audio input stream closed");
    });

    let sample_rate = ready_rx
        .recv()
        .map_err(|_| anyhow!("Capture thread exited before the stream started"))?
        .map_err(|e| anyhow!(e))?;

    Ok((sample_rate, stop_tx, thread))
}

fn build_capture_stream(
    device_name: &str,
    preset: QualityPreset,
    samples: Arc<Mutex<Vec<i16>>>,
) -> anyhow::Result<(cpal::Stream, u32)> {
    let device = suppress_alsa_warnings(|| {
        let host = cpal::default_host();
        find_input_device(&host, device_name)
    })?;

    let name = device
        .name()
        .unwrap_or_else(|_| "Unknown device".to_string());
    tracing::info!("Recording device: {}", name);

    let default_config = device.default_input_config()?;
    let supported = match preset.sample_rate() {
        Some(rate) => {
            let matching = device.supported_input_configs()?.find(|range| {
                range.channels() == default_config.channels()
                    && range.min_sample_rate().0 <= rate
                    && rate <= range.max_sample_rate().0
                    && matches!(
                        range.sample_format(),
                        cpal::SampleFormat::I16 | cpal::SampleFormat::F32
                    )
            });
            match matching {
                Some(range) => range.with_sample_rate(cpal::SampleRate(rate)),
                None => {
                    tracing::warn!(
                        "Requested sample rate {}Hz but device uses {}Hz. Recording at device rate.",
                        rate,
                        default_config.sample_rate().0
                    );
                    default_config
                }
            }
        }
        None => default_config,
    };

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    tracing::debug!(
        "Device configuration: {}Hz, {} channels, {:?}",
        sample_rate,
        channels,
        sample_format
    );

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                downmix_to_mono(data, channels, &mut lock(&samples));
            },
            stream_error,
            None,
        )?,
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> = data
                    .iter()
                    .map(|&x| (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                downmix_to_mono(&converted, channels, &mut lock(&samples));
            },
            stream_error,
            None,
        )?,
        other => return Err(anyhow!("Unsupported input sample format: {other:?}")),
    };

    stream.play()?;
    tracing::debug!("Audio input stream started");
    Ok((stream, sample_rate))
}

/// Starts the thread owning the output stream for one playback resource.
fn spawn_output_thread(shared: Arc<PlayerShared>) -> anyhow::Result<std_mpsc::Sender<()>> {
    let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), String>>(1);
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    std::thread::spawn(move || {
        let stream = match build_output_stream(shared) {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
        };
        let _ = stop_rx.recv();
        drop(stream);
    });

    ready_rx
        .recv()
        .map_err(|_| anyhow!("Playback thread exited before the stream started"))?
        .map_err(|e| anyhow!(e))?;

    Ok(stop_tx)
}

fn build_output_stream(shared: Arc<PlayerShared>) -> anyhow::Result<cpal::Stream> {
    let device = suppress_alsa_warnings(|| {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| anyhow!("No audio output device available"))
    })?;

    let supported = device.default_output_config()?;
    let output_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                shared.render(data, channels, output_rate);
            },
            stream_error,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut block = vec![0.0f32; data.len()];
                shared.render(&mut block, channels, output_rate);
                for (out, sample) in data.iter_mut().zip(block) {
                    *out = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                }
            },
            stream_error,
            None,
        )?,
        other => return Err(anyhow!("Unsupported output sample format: {other:?}")),
    };

    stream.play()?;
    Ok(stream)
}

fn stream_error(err: cpal::StreamError) {
    tracing::error!("Audio stream error: {}", err);
}

/// Writes mono 16-bit PCM as a WAV file, creating the parent directory.
fn save_wav(samples: &[i16], sample_rate: u32, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let wav_spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, wav_spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    tracing::debug!("Capture written: {}", path.display());
    Ok(())
}

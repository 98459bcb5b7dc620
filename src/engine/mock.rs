//! Scripted in-memory engine for state machine tests.

use super::{
    AudioEngine, AudioMode, CaptureHandle, CaptureStatus, Permission, PlaybackHandle,
    PlaybackStatus, QualityPreset,
};
use crate::error::{AudioError, AudioResult};
use crate::sync::lock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Every engine call the mock saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    RequestPermission,
    ConfigureMode(AudioMode),
    OpenCapture(QualityPreset, Duration),
    FinalizeCapture(CaptureHandle),
    OpenPlayback(PathBuf),
    Play(PlaybackHandle),
    Pause(PlaybackHandle),
    Seek(PlaybackHandle, u64),
    Release(PlaybackHandle),
}

#[derive(Default)]
pub struct MockEngine {
    next_id: AtomicU64,
    deny_permission: AtomicBool,
    fail_capture: AtomicBool,
    fail_transport: AtomicBool,
    calls: Mutex<Vec<Call>>,
    capture_tx: Mutex<HashMap<u64, mpsc::UnboundedSender<CaptureStatus>>>,
    playback_tx: Mutex<HashMap<u64, mpsc::UnboundedSender<PlaybackStatus>>>,
    /// When set, `open_playback` waits for a notification before returning.
    playback_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        })
    }

    pub fn deny_permission(&self) {
        self.deny_permission.store(true, Ordering::SeqCst);
    }

    pub fn fail_capture(&self) {
        self.fail_capture.store(true, Ordering::SeqCst);
    }

    /// Makes play/pause/seek fail with an engine error.
    pub fn fail_transport(&self) {
        self.fail_transport.store(true, Ordering::SeqCst);
    }

    /// Holds every subsequent `open_playback` until the returned notify fires.
    pub fn gate_playback(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.playback_gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    /// Pushes a metering status to the most recently opened capture.
    pub fn send_metering(&self, metering_db: Option<f32>) {
        self.send_capture_status(CaptureStatus {
            metering_db,
            duration_millis: 0,
        });
    }

    pub fn send_capture_status(&self, status: CaptureStatus) {
        let senders = lock(&self.capture_tx);
        if let Some(tx) = senders.iter().max_by_key(|(id, _)| **id).map(|(_, tx)| tx) {
            let _ = tx.send(status);
        }
    }

    pub fn send_playback_status(&self, handle: PlaybackHandle, status: PlaybackStatus) {
        if let Some(tx) = lock(&self.playback_tx).get(&handle.0) {
            let _ = tx.send(status);
        }
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    fn transport(&self, call: Call) -> AudioResult<()> {
        self.record(call);
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(AudioError::Engine("scripted transport failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioEngine for MockEngine {
    async fn request_permission(&self) -> AudioResult<Permission> {
        self.record(Call::RequestPermission);
        if self.deny_permission.load(Ordering::SeqCst) {
            Ok(Permission::Denied)
        } else {
            Ok(Permission::Granted)
        }
    }

    async fn configure_mode(&self, mode: AudioMode) -> AudioResult<()> {
        self.record(Call::ConfigureMode(mode));
        Ok(())
    }

    async fn open_capture(
        &self,
        preset: QualityPreset,
        metering_interval: Duration,
    ) -> AudioResult<(CaptureHandle, mpsc::UnboundedReceiver<CaptureStatus>)> {
        self.record(Call::OpenCapture(preset, metering_interval));
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceUnavailable("no input device".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.capture_tx).insert(id, tx);
        Ok((CaptureHandle(id), rx))
    }

    async fn finalize_capture(&self, handle: CaptureHandle) -> AudioResult<PathBuf> {
        self.record(Call::FinalizeCapture(handle));
        // Suspend like a real device teardown would.
        tokio::task::yield_now().await;
        lock(&self.capture_tx)
            .remove(&handle.0)
            .ok_or(AudioError::Released)?;
        Ok(PathBuf::from(format!("/tmp/mock/capture_{}.wav", handle.0)))
    }

    async fn open_playback(
        &self,
        path: &Path,
        _status_interval: Duration,
    ) -> AudioResult<(PlaybackHandle, mpsc::UnboundedReceiver<PlaybackStatus>)> {
        self.record(Call::OpenPlayback(path.to_path_buf()));
        let gate = lock(&self.playback_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.playback_tx).insert(id, tx);
        Ok((PlaybackHandle(id), rx))
    }

    async fn play(&self, handle: PlaybackHandle) -> AudioResult<()> {
        self.transport(Call::Play(handle))
    }

    async fn pause(&self, handle: PlaybackHandle) -> AudioResult<()> {
        self.transport(Call::Pause(handle))
    }

    async fn seek(&self, handle: PlaybackHandle, position_millis: u64) -> AudioResult<()> {
        self.transport(Call::Seek(handle, position_millis))
    }

    async fn release(&self, handle: PlaybackHandle) -> AudioResult<()> {
        self.record(Call::Release(handle));
        lock(&self.playback_tx)
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(AudioError::Released)
    }
}

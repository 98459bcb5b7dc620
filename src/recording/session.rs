//! Lifecycle of the single in-progress recording.
//!
//! `Idle --start()--> Recording --stop()--> Idle`. While recording, metering
//! statuses from the engine accumulate into the live level history. Stopping
//! finalizes the capture, hands it to the transcoder and stores exactly one
//! memo, falling back to the raw capture if conversion fails.

use crate::engine::{
    AudioEngine, AudioMode, CaptureHandle, CaptureStatus, Permission, QualityPreset,
};
use crate::error::{AudioError, AudioResult};
use crate::memo::{Memo, MemoStore};
use crate::sync::lock;
use crate::transcode::Transcoder;
use crate::waveform::SILENCE_DB;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Externally visible recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Permission/device setup in flight; further starts are ignored
    Starting,
    Recording(CaptureHandle),
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    /// Bumped on every start so stale status pumps can be told apart
    generation: u64,
    metering: Vec<f32>,
    /// Capture length reported by the engine
    elapsed_millis: u64,
    /// Bumped on every stop; orders memos by when recording ended
    stop_sequence: u64,
    /// Last input level, for the record button animation only
    last_level: f32,
}

/// Handle to the recording session. Clones share the same session.
#[derive(Clone)]
pub struct RecordingSession {
    engine: Arc<dyn AudioEngine>,
    transcoder: Arc<dyn Transcoder>,
    store: MemoStore,
    preset: QualityPreset,
    metering_interval: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl RecordingSession {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        transcoder: Arc<dyn Transcoder>,
        store: MemoStore,
        preset: QualityPreset,
        metering_interval: Duration,
    ) -> Self {
        Self {
            engine,
            transcoder,
            store,
            preset,
            metering_interval,
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                generation: 0,
                metering: Vec::new(),
                elapsed_millis: 0,
                stop_sequence: 0,
                last_level: SILENCE_DB,
            })),
        }
    }

    pub fn state(&self) -> RecordingState {
        match lock(&self.inner).phase {
            Phase::Recording(_) => RecordingState::Recording,
            Phase::Idle | Phase::Starting => RecordingState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    /// Level history of the current (or last) recording.
    pub fn live_metering(&self) -> Vec<f32> {
        lock(&self.inner).metering.clone()
    }

    /// Most recent input level, or -100 dB when idle.
    pub fn last_level(&self) -> f32 {
        lock(&self.inner).last_level
    }

    /// Length of the current recording as reported by the engine.
    pub fn recording_millis(&self) -> u64 {
        lock(&self.inner).elapsed_millis
    }

    pub fn store(&self) -> &MemoStore {
        &self.store
    }

    /// Starts a new recording. Does nothing if one is already running.
    ///
    /// # Errors
    /// - `PermissionDenied` if microphone access is refused
    /// - `DeviceUnavailable` if the capture cannot be opened
    pub async fn start(&self) -> AudioResult<()> {
        let generation = {
            let mut inner = lock(&self.inner);
            if inner.phase != Phase::Idle {
                tracing::debug!("Start ignored: recording already active");
                return Ok(());
            }
            inner.phase = Phase::Starting;
            inner.generation += 1;
            inner.metering.clear();
            inner.elapsed_millis = 0;
            inner.generation
        };

        match self.open_capture().await {
            Ok((handle, status_rx)) => {
                {
                    let mut inner = lock(&self.inner);
                    inner.phase = Phase::Recording(handle);
                    inner.last_level = SILENCE_DB;
                }
                self.spawn_status_pump(generation, status_rx);
                tracing::info!("Recording started (capture {})", handle.0);
                Ok(())
            }
            Err(e) => {
                lock(&self.inner).phase = Phase::Idle;
                tracing::error!("Failed to start recording: {}", e);
                Err(e)
            }
        }
    }

    async fn open_capture(
        &self,
    ) -> AudioResult<(CaptureHandle, mpsc::UnboundedReceiver<CaptureStatus>)> {
        match self.engine.request_permission().await {
            Ok(Permission::Granted) => {}
            Ok(Permission::Denied) => {
                return Err(AudioError::PermissionDenied(
                    "microphone access was refused".to_string(),
                ))
            }
            Err(e) => return Err(as_device_error(e)),
        }

        self.engine
            .configure_mode(AudioMode {
                recording_enabled: true,
                silent_mode_playback: true,
            })
            .await
            .map_err(as_device_error)?;

        match self
            .engine
            .open_capture(self.preset, self.metering_interval)
            .await
        {
            Ok(opened) => Ok(opened),
            Err(e) => {
                self.restore_mode().await;
                Err(as_device_error(e))
            }
        }
    }

    fn spawn_status_pump(
        &self,
        generation: u64,
        mut status_rx: mpsc::UnboundedReceiver<CaptureStatus>,
    ) {
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(status) = status_rx.recv().await {
                session.on_capture_status(generation, status);
            }
            tracing::trace!("Capture status stream {} closed", generation);
        });
    }

    /// Applies one capture status. Returns false if no level was recorded.
    pub(crate) fn on_capture_status(&self, generation: u64, status: CaptureStatus) -> bool {
        let mut inner = lock(&self.inner);
        if inner.generation != generation || !matches!(inner.phase, Phase::Recording(_)) {
            return false;
        }
        inner.elapsed_millis = status.duration_millis;

        let Some(db) = status.metering_db else {
            return false;
        };
        inner.metering.push(db);
        inner.last_level = db;
        true
    }

    /// Stops the recording and stores the resulting memo.
    ///
    /// Returns `Ok(None)` if nothing was recording. The session is idle
    /// before this first suspends, so a second concurrent call is a no-op.
    ///
    /// # Errors
    /// - If the engine cannot finalize the capture (no file to keep)
    pub async fn stop(&self) -> AudioResult<Option<Arc<Memo>>> {
        let (handle, metering, sequence) = {
            let mut inner = lock(&self.inner);
            let Phase::Recording(handle) = inner.phase else {
                tracing::debug!("Stop ignored: not recording");
                return Ok(None);
            };
            inner.phase = Phase::Idle;
            inner.stop_sequence += 1;
            (handle, inner.metering.clone(), inner.stop_sequence)
        };

        tracing::info!("Stopping recording...");
        let finalized = self.engine.finalize_capture(handle).await;
        self.restore_mode().await;
        lock(&self.inner).last_level = SILENCE_DB;

        let captured = finalized.map_err(|e| {
            tracing::error!("Failed to finalize recording: {}", e);
            e
        })?;
        tracing::info!("Recording stopped and stored at {}", captured.display());

        let uri = match self.transcoder.convert(&captured).await {
            Ok(converted) => converted,
            Err(e) => {
                tracing::warn!("Error converting audio, keeping original file: {}", e);
                captured
            }
        };

        let memo = self.store.insert(sequence, Memo::new(uri, metering));
        tracing::info!(
            "Memo added: {} ({} metering samples)",
            memo.uri.display(),
            memo.metering.len()
        );
        Ok(Some(memo))
    }

    async fn restore_mode(&self) {
        if let Err(e) = self
            .engine
            .configure_mode(AudioMode {
                recording_enabled: false,
                silent_mode_playback: true,
            })
            .await
        {
            tracing::warn!("Failed to restore audio mode: {}", e);
        }
    }
}

fn as_device_error(err: AudioError) -> AudioError {
    match err {
        AudioError::PermissionDenied(_) | AudioError::DeviceUnavailable(_) => err,
        other => AudioError::DeviceUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{Call, MockEngine};
    use crate::transcode::mock::MockTranscoder;
    use crate::transcode::Passthrough;
    use std::path::PathBuf;

    fn session_with(engine: Arc<MockEngine>, transcoder: Arc<MockTranscoder>) -> RecordingSession {
        RecordingSession::new(
            engine,
            transcoder,
            MemoStore::new(),
            QualityPreset::High,
            Duration::from_millis(100),
        )
    }

    /// Lets spawned status pumps drain their channels.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_metering_is_recorded_in_order() {
        let engine = MockEngine::new();
        let session = session_with(engine.clone(), MockTranscoder::new());

        session.start().await.unwrap();
        assert_eq!(session.state(), RecordingState::Recording);
        for db in [-40.0, -30.0, -20.0] {
            engine.send_metering(Some(db));
        }
        settle().await;
        assert_eq!(session.live_metering(), vec![-40.0, -30.0, -20.0]);
        assert_eq!(session.last_level(), -20.0);

        let memo = session.stop().await.unwrap().unwrap();
        assert_eq!(memo.metering, vec![-40.0, -30.0, -20.0]);
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(session.last_level(), SILENCE_DB);
    }

    #[tokio::test]
    async fn test_status_without_metering_is_ignored() {
        let engine = MockEngine::new();
        let session = session_with(engine.clone(), MockTranscoder::new());

        session.start().await.unwrap();
        engine.send_metering(None);
        engine.send_metering(Some(-12.5));
        settle().await;
        assert_eq!(session.live_metering(), vec![-12.5]);
    }

    #[tokio::test]
    async fn test_concurrent_stop_stores_one_memo() {
        let engine = MockEngine::new();
        let session = session_with(engine.clone(), MockTranscoder::new());
        session.start().await.unwrap();

        let (first, second) = tokio::join!(session.stop(), session.stop());
        assert!(first.unwrap().is_some());
        assert!(second.unwrap().is_none());
        assert_eq!(session.store().len(), 1);
        assert_eq!(engine.count(|c| matches!(c, Call::FinalizeCapture(_))), 1);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let engine = MockEngine::new();
        let session = session_with(engine.clone(), MockTranscoder::new());
        assert!(session.stop().await.unwrap().is_none());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transcode_success_uses_converted_file() {
        let transcoder = MockTranscoder::new();
        let session = session_with(MockEngine::new(), transcoder.clone());
        session.start().await.unwrap();

        let memo = session.stop().await.unwrap().unwrap();
        assert_eq!(memo.uri, PathBuf::from("/tmp/mock/capture_1.mp3"));
        assert_eq!(transcoder.inputs(), vec![PathBuf::from("/tmp/mock/capture_1.wav")]);
    }

    #[tokio::test]
    async fn test_transcode_failure_keeps_original_capture() {
        let session = session_with(MockEngine::new(), MockTranscoder::failing());
        session.start().await.unwrap();

        let memo = session.stop().await.unwrap().unwrap();
        assert_eq!(memo.uri, PathBuf::from("/tmp/mock/capture_1.wav"));
        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn test_memos_are_most_recent_first() {
        let session = session_with(MockEngine::new(), MockTranscoder::new());

        session.start().await.unwrap();
        let first = session.stop().await.unwrap().unwrap();
        session.start().await.unwrap();
        let second = session.stop().await.unwrap().unwrap();

        let stored = session.store().list();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].uri, second.uri);
        assert_eq!(stored[1].uri, first.uri);
    }

    #[tokio::test]
    async fn test_slow_conversion_keeps_stop_order() {
        let transcoder = MockTranscoder::new();
        let gate = transcoder.gate_input("/tmp/mock/capture_1.wav");
        let session = session_with(MockEngine::new(), transcoder);

        session.start().await.unwrap();
        let stopping = session.clone();
        let first = tokio::spawn(async move { stopping.stop().await });
        settle().await;
        assert!(!session.is_recording());

        session.start().await.unwrap();
        let second = session.stop().await.unwrap().unwrap();
        assert_eq!(session.store().len(), 1);

        gate.notify_one();
        let first = first.await.unwrap().unwrap().unwrap();

        let stored = session.store().list();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].uri, second.uri);
        assert_eq!(stored[1].uri, first.uri);
        assert_eq!(first.uri, PathBuf::from("/tmp/mock/capture_1.mp3"));
    }

    #[tokio::test]
    async fn test_passthrough_keeps_capture() {
        let session = RecordingSession::new(
            MockEngine::new(),
            Arc::new(Passthrough),
            MemoStore::new(),
            QualityPreset::High,
            Duration::from_millis(100),
        );
        session.start().await.unwrap();

        let memo = session.stop().await.unwrap().unwrap();
        assert_eq!(memo.uri, PathBuf::from("/tmp/mock/capture_1.wav"));
    }

    #[tokio::test]
    async fn test_recording_length_comes_from_engine() {
        let engine = MockEngine::new();
        let session = session_with(engine.clone(), MockTranscoder::new());

        session.start().await.unwrap();
        engine.send_capture_status(CaptureStatus {
            metering_db: None,
            duration_millis: 1500,
        });
        settle().await;
        assert_eq!(session.recording_millis(), 1500);
        assert!(session.live_metering().is_empty());

        session.stop().await.unwrap();
        session.start().await.unwrap();
        assert_eq!(session.recording_millis(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_stays_idle() {
        let engine = MockEngine::new();
        engine.deny_permission();
        let session = session_with(engine.clone(), MockTranscoder::new());

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, AudioError::PermissionDenied(_)));
        assert!(err.is_permission_or_device());
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(engine.count(|c| matches!(c, Call::OpenCapture(..))), 0);
    }

    #[tokio::test]
    async fn test_device_failure_stays_idle_and_restores_mode() {
        let engine = MockEngine::new();
        engine.fail_capture();
        let session = session_with(engine.clone(), MockTranscoder::new());

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, AudioError::DeviceUnavailable(_)));
        assert_eq!(session.state(), RecordingState::Idle);
        assert_eq!(
            engine.calls().last(),
            Some(&Call::ConfigureMode(AudioMode {
                recording_enabled: false,
                silent_mode_playback: true,
            }))
        );
    }

    #[tokio::test]
    async fn test_start_while_recording_is_noop() {
        let engine = MockEngine::new();
        let session = session_with(engine.clone(), MockTranscoder::new());

        session.start().await.unwrap();
        session.start().await.unwrap();
        assert_eq!(engine.count(|c| matches!(c, Call::OpenCapture(..))), 1);
    }

    #[tokio::test]
    async fn test_engine_call_order() {
        let engine = MockEngine::new();
        let session = session_with(engine.clone(), MockTranscoder::new());
        session.start().await.unwrap();
        session.stop().await.unwrap();

        assert_eq!(
            engine.calls(),
            vec![
                Call::RequestPermission,
                Call::ConfigureMode(AudioMode {
                    recording_enabled: true,
                    silent_mode_playback: true,
                }),
                Call::OpenCapture(QualityPreset::High, Duration::from_millis(100)),
                Call::FinalizeCapture(CaptureHandle(1)),
                Call::ConfigureMode(AudioMode {
                    recording_enabled: false,
                    silent_mode_playback: true,
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_new_recording_resets_metering() {
        let engine = MockEngine::new();
        let session = session_with(engine.clone(), MockTranscoder::new());

        session.start().await.unwrap();
        engine.send_metering(Some(-10.0));
        settle().await;
        session.stop().await.unwrap();
        assert_eq!(session.live_metering(), vec![-10.0]);

        session.start().await.unwrap();
        assert!(session.live_metering().is_empty());
    }

    #[tokio::test]
    async fn test_stale_generation_is_ignored() {
        let session = session_with(MockEngine::new(), MockTranscoder::new());
        session.start().await.unwrap();

        let stale = CaptureStatus {
            metering_db: Some(-5.0),
            duration_millis: 0,
        };
        assert!(!session.on_capture_status(0, stale));
        assert!(session.on_capture_status(1, stale));
        assert_eq!(session.live_metering(), vec![-5.0]);
    }
}

//! Interactive memo session.
//!
//! Records memos, lists them most recent first and plays them back. Supports
//! an external recording toggle via SIGUSR1.

use crate::config::VmemoConfig;
use crate::engine::{AudioEngine, CpalEngine};
use crate::error::AudioError;
use crate::memo::MemoStore;
use crate::playback::PlaybackController;
use crate::recording::RecordingSession;
use crate::transcode::{FfmpegTranscoder, Passthrough, Transcoder};
use crate::ui::{ErrorScreen, MemoRow, MemoTui, SessionCommand, SessionView};
use crate::waveform;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Runs the interactive session until the user quits.
///
/// # Errors
/// - If the configuration cannot be loaded
/// - If the terminal cannot be initialized
/// - If input handling or rendering fails
pub async fn handle_session() -> anyhow::Result<()> {
    tracing::info!("=== vmemo session started ===");

    let config_data = match VmemoConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load configuration: {err}");
            show_error(
                "Configuration Error",
                &format!("{err}\n\nPlease check your ~/.config/vmemo/vmemo.toml file and try again."),
            )?;
            return Err(anyhow::anyhow!("Configuration error: {err}"));
        }
    };

    tracing::info!(
        "Configuration loaded: device={}, quality={}, transcode={}",
        config_data.audio.device,
        config_data.audio.quality,
        if config_data.transcode.enabled {
            config_data.transcode.codec.as_str()
        } else {
            "off"
        }
    );

    let capture_dir = if config_data.transcode.enabled {
        std::env::temp_dir().join("vmemo")
    } else {
        config_data.output_dir()?
    };
    let engine: Arc<dyn AudioEngine> = Arc::new(CpalEngine::new(
        config_data.audio.device.clone(),
        capture_dir,
    ));
    let transcoder = build_transcoder(&config_data)?;
    let session = RecordingSession::new(
        Arc::clone(&engine),
        transcoder,
        MemoStore::new(),
        config_data.audio.quality,
        config_data.audio.metering_interval(),
    );

    let toggle_signal = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&toggle_signal))
        .map_err(|e| anyhow::anyhow!("Failed to register signal handler: {e}"))?;

    let mut tui = MemoTui::new()?;
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<String>();
    let mut controllers: Vec<PlaybackController> = Vec::new();
    let mut pending_stops: JoinSet<()> = JoinSet::new();

    tracing::debug!("Entering session loop");

    loop {
        if toggle_signal.swap(false, Ordering::Relaxed) {
            tracing::info!("Received SIGUSR1: toggling recording");
            toggle_recording(&session, &notice_tx, &mut pending_stops).await;
        }
        while let Some(joined) = pending_stops.try_join_next() {
            log_stop_join(joined);
        }

        while let Ok(message) = notice_rx.try_recv() {
            tui.notify(message);
        }

        let added = sync_controllers(
            session.store(),
            &mut controllers,
            &engine,
            config_data.playback.status_interval(),
        );
        if added > 0 {
            tui.select_first();
        }

        let is_recording = session.is_recording();
        let view = SessionView {
            rows: memo_rows(&controllers, config_data.waveform.bars),
            is_recording,
            recording_millis: session.recording_millis(),
            level_db: session.last_level(),
            live_metering: if is_recording {
                session.live_metering()
            } else {
                Vec::new()
            },
        };
        tui.draw(&view)?;

        match tui.handle_input(controllers.len())? {
            SessionCommand::Continue => {}
            SessionCommand::ToggleRecording => {
                toggle_recording(&session, &notice_tx, &mut pending_stops).await
            }
            SessionCommand::TogglePlayback => {
                let selected = tui.selected().and_then(|i| controllers.get(i)).cloned();
                if let Some(controller) = selected {
                    if let Err(e) = controller.toggle().await {
                        tui.notify(format!("Playback failed: {e}"));
                    }
                }
            }
            SessionCommand::Quit => break,
        }
    }

    if session.is_recording() {
        tracing::info!("Quitting while recording; finishing the memo first");
        if let Err(e) = session.stop().await {
            tracing::error!("Failed to finish recording on exit: {}", e);
        }
    }
    finish_pending_stops(&mut pending_stops).await;
    for controller in &controllers {
        controller.unload().await;
    }

    tui.cleanup()?;
    tracing::info!(
        "=== vmemo session exited ({} memo(s) recorded) ===",
        session.store().len()
    );
    Ok(())
}

fn build_transcoder(config_data: &VmemoConfig) -> anyhow::Result<Arc<dyn Transcoder>> {
    if !config_data.transcode.enabled {
        tracing::info!("Transcoding disabled; memos keep the captured WAV");
        return Ok(Arc::new(Passthrough));
    }
    Ok(Arc::new(FfmpegTranscoder::new(
        &config_data.transcode,
        config_data.output_dir()?,
    )))
}

/// Starts recording when idle. Stopping runs on `pending_stops` so the UI
/// stays responsive while the capture is transcoded.
async fn toggle_recording(
    session: &RecordingSession,
    notices: &mpsc::UnboundedSender<String>,
    pending_stops: &mut JoinSet<()>,
) {
    if session.is_recording() {
        let session = session.clone();
        let notices = notices.clone();
        pending_stops.spawn(async move {
            match session.stop().await {
                Ok(Some(memo)) => tracing::info!("Memo saved: {}", memo.uri.display()),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Recording could not be finalized: {}", e);
                    let _ = notices.send(format!("Recording lost: {e}"));
                }
            }
        });
        return;
    }

    if let Err(e) = session.start().await {
        if e.is_permission_or_device() {
            tracing::warn!("Recording unavailable: {}", e);
        } else {
            tracing::error!("Failed to start recording: {}", e);
        }
        let _ = notices.send(start_failure_message(&e));
    }
}

/// Waits for every background stop so no capture is dropped on exit.
async fn finish_pending_stops(pending_stops: &mut JoinSet<()>) {
    if !pending_stops.is_empty() {
        tracing::info!("Waiting for {} memo(s) to finish saving", pending_stops.len());
    }
    while let Some(joined) = pending_stops.join_next().await {
        log_stop_join(joined);
    }
}

fn log_stop_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Stop task failed: {}", e);
    }
}

fn start_failure_message(error: &AudioError) -> String {
    match error {
        AudioError::PermissionDenied(_) => {
            "Microphone access denied. Check your audio permissions.".to_string()
        }
        AudioError::DeviceUnavailable(reason) => {
            format!("No recording device: {reason}. Run 'vmemo list-devices'.")
        }
        other => format!("Recording failed: {other}"),
    }
}

/// Creates and loads a controller for every memo added since the last call.
///
/// `controllers` mirrors the store: index `i` plays memo `i`, newest first.
/// A memo may land behind existing ones, so controllers are matched to memos
/// by identity. Returns how many controllers were added.
fn sync_controllers(
    store: &MemoStore,
    controllers: &mut Vec<PlaybackController>,
    engine: &Arc<dyn AudioEngine>,
    status_interval: Duration,
) -> usize {
    let memos = store.list();
    if memos.len() == controllers.len() {
        return 0;
    }

    let mut existing = std::mem::take(controllers);
    let mut added = 0;
    for memo in &memos {
        let reused = existing
            .iter()
            .position(|c| Arc::ptr_eq(c.memo(), memo))
            .map(|i| existing.swap_remove(i));
        let controller = match reused {
            Some(controller) => controller,
            None => {
                added += 1;
                spawn_load(PlaybackController::new(
                    Arc::clone(memo),
                    Arc::clone(engine),
                    status_interval,
                ))
            }
        };
        controllers.push(controller);
    }

    added
}

fn spawn_load(controller: PlaybackController) -> PlaybackController {
    let loading = controller.clone();
    tokio::spawn(async move {
        if let Err(e) = loading.load().await {
            tracing::warn!("Memo {} cannot be played: {}", loading.memo().uri.display(), e);
        }
    });
    controller
}

fn memo_rows(controllers: &[PlaybackController], bars: usize) -> Vec<MemoRow> {
    controllers
        .iter()
        .map(|controller| {
            let memo = controller.memo();
            MemoRow {
                title: memo.created_at.format("%H:%M:%S").to_string(),
                bars: waveform::downsample(&memo.metering, bars),
                progress: controller.progress_ratio(),
                is_playing: controller.is_playing(),
                position_millis: controller.position_millis(),
                duration_millis: controller.duration_millis(),
            }
        })
        .collect()
}

fn show_error(title: &str, message: &str) -> anyhow::Result<()> {
    let mut error_screen = ErrorScreen::new()?;
    error_screen.show_error(title, message)?;
    error_screen.cleanup()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{Call, MockEngine};
    use crate::engine::QualityPreset;
    use crate::memo::Memo;
    use crate::transcode::mock::MockTranscoder;
    use std::path::PathBuf;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_sync_controllers_mirrors_store_order() {
        let mock = MockEngine::new();
        let engine: Arc<dyn AudioEngine> = mock.clone();
        let store = MemoStore::new();
        let mut controllers = Vec::new();
        let interval = Duration::from_millis(16);

        store.insert(1, Memo::new(PathBuf::from("a.mp3"), vec![-10.0]));
        assert_eq!(sync_controllers(&store, &mut controllers, &engine, interval), 1);

        store.insert(2, Memo::new(PathBuf::from("b.mp3"), vec![-20.0]));
        store.insert(3, Memo::new(PathBuf::from("c.mp3"), vec![-30.0]));
        assert_eq!(sync_controllers(&store, &mut controllers, &engine, interval), 2);
        assert_eq!(sync_controllers(&store, &mut controllers, &engine, interval), 0);

        let uris: Vec<PathBuf> = controllers.iter().map(|c| c.memo().uri.clone()).collect();
        assert_eq!(
            uris,
            vec![
                PathBuf::from("c.mp3"),
                PathBuf::from("b.mp3"),
                PathBuf::from("a.mp3")
            ]
        );

        settle().await;
        assert_eq!(mock.count(|c| matches!(c, Call::OpenPlayback(_))), 3);
        assert!(controllers.iter().all(|c| c.is_loaded()));
    }

    #[tokio::test]
    async fn test_sync_controllers_places_late_memo_by_order() {
        let mock = MockEngine::new();
        let engine: Arc<dyn AudioEngine> = mock.clone();
        let store = MemoStore::new();
        let mut controllers = Vec::new();
        let interval = Duration::from_millis(16);

        store.insert(2, Memo::new(PathBuf::from("second.mp3"), vec![]));
        assert_eq!(sync_controllers(&store, &mut controllers, &engine, interval), 1);
        let second = controllers[0].clone();

        store.insert(1, Memo::new(PathBuf::from("first.mp3"), vec![]));
        assert_eq!(sync_controllers(&store, &mut controllers, &engine, interval), 1);

        let uris: Vec<PathBuf> = controllers.iter().map(|c| c.memo().uri.clone()).collect();
        assert_eq!(
            uris,
            vec![PathBuf::from("second.mp3"), PathBuf::from("first.mp3")]
        );
        assert!(Arc::ptr_eq(controllers[0].memo(), second.memo()));

        settle().await;
        assert_eq!(mock.count(|c| matches!(c, Call::OpenPlayback(_))), 2);
    }

    #[tokio::test]
    async fn test_pending_stops_finish_before_exit() {
        let session = RecordingSession::new(
            MockEngine::new(),
            MockTranscoder::new(),
            MemoStore::new(),
            QualityPreset::High,
            Duration::from_millis(100),
        );
        let (notice_tx, _notice_rx) = mpsc::unbounded_channel();
        let mut pending_stops = JoinSet::new();

        toggle_recording(&session, &notice_tx, &mut pending_stops).await;
        assert!(session.is_recording());
        toggle_recording(&session, &notice_tx, &mut pending_stops).await;
        assert_eq!(session.store().len(), 0);
        assert_eq!(pending_stops.len(), 1);

        finish_pending_stops(&mut pending_stops).await;
        assert!(pending_stops.is_empty());
        assert!(!session.is_recording());
        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn test_memo_rows_downsample_metering() {
        let mock = MockEngine::new();
        let engine: Arc<dyn AudioEngine> = mock;
        let memo = Arc::new(Memo::new(PathBuf::from("a.mp3"), vec![-30.0; 200]));
        let controller = PlaybackController::new(memo, engine, Duration::from_millis(16));

        let rows = memo_rows(&[controller], 50);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bars, vec![-30.0; 50]);
        assert_eq!(rows[0].progress, 0.0);
        assert!(!rows[0].is_playing);
    }

    #[test]
    fn test_start_failure_messages() {
        let denied = start_failure_message(&AudioError::PermissionDenied("no".to_string()));
        assert!(denied.contains("denied"));
        let device = start_failure_message(&AudioError::DeviceUnavailable("busy".to_string()));
        assert!(device.contains("busy"));
        assert!(device.contains("list-devices"));
    }
}

//! Per-memo playback state machine.
//!
//! ```text
//! Unloaded --load()--> Loaded(paused, pos=0)
//! Loaded(paused)  --toggle()--> Loaded(playing)   resumes, or restarts if finished
//! Loaded(playing) --toggle()--> Loaded(paused)
//! Loaded(playing) --finished--> Loaded(paused, finished, pos=0)
//! Loaded(any)     --unload()--> Unloaded          terminal
//! ```
//!
//! Every controller owns its playback resource exclusively. A liveness flag
//! set by `unload()` guards every deferred result: late status updates and
//! opens that complete after teardown never touch the controller's state.

use crate::engine::{AudioEngine, PlaybackHandle, PlaybackStatus};
use crate::error::AudioResult;
use crate::memo::Memo;
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Latest reported transport state of a loaded memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackSnapshot {
    pub position_millis: u64,
    pub duration_millis: u64,
    pub is_playing: bool,
    /// Playback reached the end; the next toggle starts over
    pub is_finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Unloaded,
    Loaded(PlaybackSnapshot),
}

#[derive(Debug)]
struct Inner {
    state: PlaybackState,
    handle: Option<PlaybackHandle>,
    alive: bool,
    loading: bool,
}

enum Transport {
    Paused,
    Resumed,
    Restarted,
}

/// Playback controller for one memo. Clones share the same controller.
#[derive(Clone)]
pub struct PlaybackController {
    memo: Arc<Memo>,
    engine: Arc<dyn AudioEngine>,
    status_interval: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl PlaybackController {
    pub fn new(memo: Arc<Memo>, engine: Arc<dyn AudioEngine>, status_interval: Duration) -> Self {
        Self {
            memo,
            engine,
            status_interval,
            inner: Arc::new(Mutex::new(Inner {
                state: PlaybackState::Unloaded,
                handle: None,
                alive: true,
                loading: false,
            })),
        }
    }

    pub fn memo(&self) -> &Arc<Memo> {
        &self.memo
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.inner).state
    }

    pub fn snapshot(&self) -> Option<PlaybackSnapshot> {
        match self.state() {
            PlaybackState::Loaded(snapshot) => Some(snapshot),
            PlaybackState::Unloaded => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }

    /// False once `unload()` has run.
    pub fn is_alive(&self) -> bool {
        lock(&self.inner).alive
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot().is_some_and(|s| s.is_playing)
    }

    pub fn position_millis(&self) -> u64 {
        self.snapshot().map_or(0, |s| s.position_millis)
    }

    pub fn duration_millis(&self) -> u64 {
        self.snapshot().map_or(0, |s| s.duration_millis)
    }

    /// Played fraction in [0, 1]; 0 while the duration is unknown.
    pub fn progress_ratio(&self) -> f64 {
        progress_ratio(self.position_millis(), self.duration_millis())
    }

    /// Opens the memo's file for playback.
    ///
    /// Does nothing if already loaded, loading, or unloaded for good. If
    /// `unload()` runs while the open is pending, the new resource is
    /// released straight away.
    ///
    /// # Errors
    /// - If the engine cannot open the file
    pub async fn load(&self) -> AudioResult<()> {
        {
            let mut inner = lock(&self.inner);
            if !inner.alive || inner.loading || inner.handle.is_some() {
                return Ok(());
            }
            inner.loading = true;
        }

        let opened = self
            .engine
            .open_playback(&self.memo.uri, self.status_interval)
            .await;

        let (handle, status_rx) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                lock(&self.inner).loading = false;
                tracing::warn!("Failed to load {}: {}", self.memo.uri.display(), e);
                return Err(e);
            }
        };

        let kept = {
            let mut inner = lock(&self.inner);
            inner.loading = false;
            if inner.alive {
                inner.handle = Some(handle);
                inner.state = PlaybackState::Loaded(PlaybackSnapshot::default());
            }
            inner.alive
        };

        if !kept {
            tracing::debug!(
                "Controller for {} unloaded before open completed; releasing",
                self.memo.uri.display()
            );
            if let Err(e) = self.engine.release(handle).await {
                tracing::debug!("Release after teardown failed: {}", e);
            }
            return Ok(());
        }

        self.spawn_status_pump(status_rx);
        tracing::debug!("Loaded {} (playback {})", self.memo.uri.display(), handle.0);
        Ok(())
    }

    fn spawn_status_pump(&self, mut status_rx: mpsc::UnboundedReceiver<PlaybackStatus>) {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(status) = status_rx.recv().await {
                if !controller.is_alive() {
                    break;
                }
                controller.on_status(status).await;
            }
        });
    }

    /// Applies an engine status update.
    ///
    /// Stores the snapshot as reported. When the engine reports the end of
    /// the file, marks the memo finished and rewinds it to 0. A status that
    /// is not loaded drops the controller back to `Unloaded` until the
    /// engine reports it loaded again; the handle is kept for `unload()`.
    pub async fn on_status(&self, status: PlaybackStatus) {
        let rewind = {
            let mut inner = lock(&self.inner);
            if !inner.alive {
                tracing::trace!("Status for unloaded controller ignored");
                return;
            }
            let Some(handle) = inner.handle else {
                return;
            };
            if !status.is_loaded {
                tracing::debug!("Engine reports {} not loaded", self.memo.uri.display());
                inner.state = PlaybackState::Unloaded;
                return;
            }

            let was_finished = match inner.state {
                PlaybackState::Loaded(previous) => previous.is_finished,
                PlaybackState::Unloaded => false,
            };

            let snapshot = if status.did_just_finish {
                PlaybackSnapshot {
                    position_millis: 0,
                    duration_millis: status.duration_millis,
                    is_playing: false,
                    is_finished: true,
                }
            } else {
                PlaybackSnapshot {
                    position_millis: status.position_millis,
                    duration_millis: status.duration_millis,
                    is_playing: status.is_playing,
                    is_finished: was_finished && !status.is_playing,
                }
            };
            inner.state = PlaybackState::Loaded(snapshot);

            status.did_just_finish.then_some(handle)
        };

        if let Some(handle) = rewind {
            tracing::debug!("Playback of {} finished", self.memo.uri.display());
            if let Err(e) = self.engine.seek(handle, 0).await {
                tracing::warn!("Failed to rewind finished playback: {}", e);
            }
        }
    }

    /// Play/pause. Playing pauses; finished restarts from 0; anything else
    /// resumes at the current position. No-op unless loaded.
    ///
    /// # Errors
    /// - If the engine rejects the command; state is left as it was
    pub async fn toggle(&self) -> AudioResult<()> {
        let (handle, snapshot) = {
            let inner = lock(&self.inner);
            if !inner.alive {
                return Ok(());
            }
            match (inner.handle, inner.state) {
                (Some(handle), PlaybackState::Loaded(snapshot)) => (handle, snapshot),
                _ => return Ok(()),
            }
        };

        let result = if snapshot.is_playing {
            self.engine.pause(handle).await.map(|_| Transport::Paused)
        } else if snapshot.is_finished {
            match self.engine.seek(handle, 0).await {
                Ok(()) => self.engine.play(handle).await.map(|_| Transport::Restarted),
                Err(e) => Err(e),
            }
        } else {
            self.engine.play(handle).await.map(|_| Transport::Resumed)
        };

        let transport = result.map_err(|e| {
            tracing::warn!("Playback command failed for {}: {}", self.memo.uri.display(), e);
            e
        })?;

        let mut inner = lock(&self.inner);
        if !inner.alive {
            return Ok(());
        }
        if let PlaybackState::Loaded(current) = &mut inner.state {
            match transport {
                Transport::Paused => current.is_playing = false,
                Transport::Resumed => current.is_playing = true,
                Transport::Restarted => {
                    current.position_millis = 0;
                    current.is_finished = false;
                    current.is_playing = true;
                }
            }
        }
        Ok(())
    }

    /// Releases the playback resource. Terminal: the controller ignores
    /// everything afterwards.
    pub async fn unload(&self) {
        let handle = {
            let mut inner = lock(&self.inner);
            if !inner.alive {
                return;
            }
            inner.alive = false;
            inner.state = PlaybackState::Unloaded;
            inner.handle.take()
        };

        if let Some(handle) = handle {
            tracing::debug!("Unloading sound {}", self.memo.uri.display());
            if let Err(e) = self.engine.release(handle).await {
                tracing::warn!("Failed to release playback {}: {}", handle.0, e);
            }
        }
    }
}

/// `position / duration` clamped to [0, 1], or 0 for an unknown duration.
pub fn progress_ratio(position_millis: u64, duration_millis: u64) -> f64 {
    if duration_millis == 0 {
        return 0.0;
    }
    (position_millis as f64 / duration_millis as f64).clamp(0.0, 1.0)
}

//! Scripted transcoder for session tests.

use super::Transcoder;
use crate::error::{AudioError, AudioResult};
use crate::sync::lock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
pub struct MockTranscoder {
    fail: AtomicBool,
    inputs: Mutex<Vec<PathBuf>>,
    /// Conversions of these inputs wait for a notification first.
    gates: Mutex<HashMap<PathBuf, Arc<Notify>>>,
}

impl MockTranscoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let transcoder = Self::default();
        transcoder.fail.store(true, Ordering::SeqCst);
        Arc::new(transcoder)
    }

    /// Holds the conversion of `input` until the returned notify fires.
    pub fn gate_input(&self, input: impl Into<PathBuf>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.gates).insert(input.into(), Arc::clone(&gate));
        gate
    }

    pub fn inputs(&self) -> Vec<PathBuf> {
        lock(&self.inputs).clone()
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn convert(&self, input: &Path) -> AudioResult<PathBuf> {
        lock(&self.inputs).push(input.to_path_buf());
        let gate = lock(&self.gates).remove(input);
        match gate {
            Some(gate) => gate.notified().await,
            None => tokio::task::yield_now().await,
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AudioError::Transcode("scripted failure".to_string()));
        }
        Ok(input.with_extension("mp3"))
    }
}

//! Completed recordings and the in-memory list that holds them.
//!
//! Memos live only for the lifetime of the process.

use crate::sync::lock;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One completed recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Memo {
    /// Playable audio file
    pub uri: PathBuf,
    /// Input level history in dB, in arrival order
    pub metering: Vec<f32>,
    /// When the recording was stopped
    pub created_at: DateTime<Local>,
}

impl Memo {
    pub fn new(uri: PathBuf, metering: Vec<f32>) -> Self {
        Self {
            uri,
            metering,
            created_at: Local::now(),
        }
    }
}

/// Ordered list of memos, most recent first.
///
/// Each memo carries the sequence number of the stop that produced it.
/// Memos can arrive out of order (a short recording may finish converting
/// before a longer one stopped earlier), so the list is kept sorted by
/// sequence rather than by arrival. Cloning the store yields another handle
/// to the same list.
#[derive(Debug, Clone, Default)]
pub struct MemoStore {
    entries: Arc<Mutex<Vec<Entry>>>,
}

#[derive(Debug)]
struct Entry {
    sequence: u64,
    memo: Arc<Memo>,
}

impl MemoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a memo after every memo with a higher sequence.
    pub fn insert(&self, sequence: u64, memo: Memo) -> Arc<Memo> {
        insert_sorted(&mut lock(&self.entries), sequence, memo)
    }

    /// Snapshot of the list, most recent first.
    pub fn list(&self) -> Vec<Arc<Memo>> {
        lock(&self.entries)
            .iter()
            .map(|entry| Arc::clone(&entry.memo))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

fn insert_sorted(entries: &mut Vec<Entry>, sequence: u64, memo: Memo) -> Arc<Memo> {
    let memo = Arc::new(memo);
    let index = entries
        .iter()
        .position(|entry| entry.sequence < sequence)
        .unwrap_or(entries.len());
    entries.insert(
        index,
        Entry {
            sequence,
            memo: Arc::clone(&memo),
        },
    );
    tracing::debug!("Memo stored at {}: {}", index, memo.uri.display());
    memo
}

//! In-memory tone player

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::adapters::{ToneError, ToneHandle, ToneService};

#[derive(Debug, Default)]
struct TonesInner {
    next_handle: AtomicU64,
    started: AtomicUsize,
    stopped: AtomicUsize,
    resumed: AtomicUsize,
    active: Mutex<HashMap<ToneHandle, String>>,
}

/// Records which tones are playing
#[derive(Debug, Clone, Default)]
pub struct LoopbackTones {
    inner: Arc<TonesInner>,
}

impl LoopbackTones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started_count(&self) -> usize {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn stopped_count(&self) -> usize {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> usize {
        self.inner.resumed.load(Ordering::SeqCst)
    }

    /// Names of the tones still playing
    pub fn active_tones(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.active.lock().values().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ToneService for LoopbackTones {
    async fn start(&self, tone: &str) -> Result<ToneHandle, ToneError> {
        if tone.trim().is_empty() {
            return Err(ToneError::UnknownTone(tone.to_string()));
        }
        let handle = ToneHandle(self.inner.next_handle.fetch_add(1, Ordering::SeqCst));
        self.inner.started.fetch_add(1, Ordering::SeqCst);
        self.inner.active.lock().insert(handle, tone.to_string());
        Ok(handle)
    }

    fn stop(&self, handle: ToneHandle) {
        if self.inner.active.lock().remove(&handle).is_some() {
            self.inner.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn resume_output(&self) -> Result<(), ToneError> {
        self.inner.resumed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

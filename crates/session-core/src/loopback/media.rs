//! In-memory capture device

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::adapters::{CaptureStream, LocalStream, MediaEndpoint, MediaError, RemoteStream};
use crate::types::{CallId, MediaKind};

#[derive(Debug)]
struct LoopbackStream {
    id: String,
    kind: MediaKind,
    audio_enabled: AtomicBool,
    stopped: AtomicBool,
    released: Arc<AtomicUsize>,
}

impl CaptureStream for LoopbackStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn has_audio_track(&self) -> bool {
        true
    }

    fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    fn set_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.released.fetch_add(1, Ordering::SeqCst);
            debug!("Stopped capture stream {}", self.id);
        }
    }
}

#[derive(Debug, Default)]
struct MediaInner {
    deny: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    next_stream: AtomicU64,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
    attached: Mutex<HashMap<CallId, RemoteStream>>,
    attach_count: AtomicUsize,
}

/// Capture device that can deny permission or hold acquisitions pending
#[derive(Debug, Clone)]
pub struct LoopbackMedia {
    name: String,
    inner: Arc<MediaInner>,
}

impl LoopbackMedia {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(MediaInner::default()),
        }
    }

    /// Make every following acquisition fail with `PermissionDenied`
    pub fn deny_permission(&self, deny: bool) {
        self.inner.deny.store(deny, Ordering::SeqCst);
    }

    /// Hold acquisitions pending until [`release_acquisitions`](Self::release_acquisitions)
    pub fn hold_acquisitions(&self) {
        *self.inner.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held acquisitions complete
    pub fn release_acquisitions(&self, count: usize) {
        if let Some(gate) = self.inner.gate.lock().as_ref() {
            gate.add_permits(count);
        }
    }

    /// Stop holding; pending and future acquisitions complete
    pub fn open_gate(&self) {
        if let Some(gate) = self.inner.gate.lock().take() {
            gate.close();
        }
    }

    pub fn acquired_count(&self) -> usize {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Streams acquired and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.acquired_count().saturating_sub(self.released_count())
    }

    pub fn attached_remote(&self, call_id: &CallId) -> Option<RemoteStream> {
        self.inner.attached.lock().get(call_id).cloned()
    }

    pub fn attached_count(&self) -> usize {
        self.inner.attached.lock().len()
    }

    /// Total attach calls, including streams since detached
    pub fn attach_calls(&self) -> usize {
        self.inner.attach_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEndpoint for LoopbackMedia {
    async fn acquire(&self, kind: MediaKind) -> Result<LocalStream, MediaError> {
        let gate = self.inner.gate.lock().clone();
        if let Some(gate) = gate {
            // A closed gate means it was opened for good
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.inner.deny.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied(format!("{} denied {} capture", self.name, kind)));
        }

        let n = self.inner.next_stream.fetch_add(1, Ordering::SeqCst);
        self.inner.acquired.fetch_add(1, Ordering::SeqCst);
        let stream = LoopbackStream {
            id: format!("{}-{}-{}", self.name, kind, n),
            kind,
            audio_enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            released: self.inner.released.clone(),
        };
        debug!("Acquired capture stream {}", stream.id);
        Ok(Arc::new(stream))
    }

    fn attach_remote(&self, call_id: &CallId, stream: &RemoteStream) {
        self.inner.attach_count.fetch_add(1, Ordering::SeqCst);
        self.inner.attached.lock().insert(call_id.clone(), stream.clone());
    }

    fn detach_remote(&self, call_id: &CallId) {
        self.inner.attached.lock().remove(call_id);
    }
}

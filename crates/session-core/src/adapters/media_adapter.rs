//! Media adapter
//!
//! Wraps the local capture device and remote stream rendering. Capture
//! acquisition can suspend indefinitely (permission prompts), so it runs in
//! its own task and re-enters the machine as [`SessionEvent::CaptureResolved`]
//! tagged with the generation that requested it.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::state_machine::events::{InputSender, MachineInput, SessionEvent};
use crate::types::{CallId, MediaKind};

/// Errors raised while acquiring local capture
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no capture device for {0}")]
    NoDevice(MediaKind),

    #[error("capture failed: {0}")]
    Failed(String),
}

/// A live local capture stream
///
/// `stop` must be idempotent: it is called on every cleanup path and may be
/// reached twice when termination races with acquisition.
pub trait CaptureStream: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn kind(&self) -> MediaKind;
    fn has_audio_track(&self) -> bool;
    fn audio_enabled(&self) -> bool;
    fn set_audio_enabled(&self, enabled: bool);
    /// Stop every track and release the device
    fn stop(&self);
}

/// Shared handle to a local capture stream
pub type LocalStream = Arc<dyn CaptureStream>;

/// A stream received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub id: String,
    pub has_video: bool,
}

/// Capture device and remote rendering surface
#[async_trait]
pub trait MediaEndpoint: Send + Sync + 'static {
    /// Acquire microphone (and camera for video calls)
    async fn acquire(&self, kind: MediaKind) -> Result<LocalStream, MediaError>;

    /// Render the peer's stream for `call_id`
    fn attach_remote(&self, call_id: &CallId, stream: &RemoteStream);

    /// Stop rendering the peer's stream for `call_id`. Safe when nothing is attached
    fn detach_remote(&self, call_id: &CallId);
}

/// Adapter between the state machine and a [`MediaEndpoint`]
#[derive(Clone)]
pub struct MediaAdapter {
    endpoint: Arc<dyn MediaEndpoint>,
}

impl MediaAdapter {
    pub fn new(endpoint: Arc<dyn MediaEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Start acquisition; the result re-enters the machine tagged with `generation`
    pub fn spawn_acquire(&self, kind: MediaKind, generation: u64, input: InputSender) {
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            debug!("Acquiring {} capture (generation {})", kind, generation);
            let result = endpoint.acquire(kind).await;
            let resolved = MachineInput::notify(SessionEvent::CaptureResolved { generation, result });

            // The machine is gone; nobody else will release this stream
            if let Err(rejected) = input.send(resolved) {
                if let SessionEvent::CaptureResolved { result: Ok(stream), .. } = rejected.0.event {
                    stream.stop();
                }
            }
        });
    }

    /// Stop a capture stream that is not (or no longer) part of a session
    pub fn release(&self, stream: &LocalStream) {
        debug!("Releasing capture stream {}", stream.id());
        stream.stop();
    }

    /// Flip the audio track; returns the new muted flag
    pub fn toggle_mute(&self, stream: &LocalStream) -> bool {
        if !stream.has_audio_track() {
            warn!("Capture stream {} has no audio track", stream.id());
            return false;
        }
        let enabled = !stream.audio_enabled();
        stream.set_audio_enabled(enabled);
        !enabled
    }

    pub fn attach_remote(&self, call_id: &CallId, stream: &RemoteStream) {
        debug!("Attaching remote stream {} for call {}", stream.id, call_id);
        self.endpoint.attach_remote(call_id, stream);
    }

    pub fn detach_remote(&self, call_id: &CallId) {
        self.endpoint.detach_remote(call_id);
    }
}

//! Feedback tone adapter

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::state_machine::events::{InputSender, MachineInput, SessionEvent};

/// Errors raised by the tone player
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToneError {
    #[error("unknown tone: {0}")]
    UnknownTone(String),

    #[error("audio output is locked until the first user interaction")]
    OutputLocked,

    #[error("tone playback failed: {0}")]
    Failed(String),
}

/// Handle to a playing tone
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct ToneHandle(pub u64);

/// Plays audible cues
#[async_trait]
pub trait ToneService: Send + Sync + 'static {
    async fn start(&self, tone: &str) -> Result<ToneHandle, ToneError>;

    /// Stop a tone. Safe on a handle that already stopped
    fn stop(&self, handle: ToneHandle);

    /// Resume audio output after the first user gesture
    async fn resume_output(&self) -> Result<(), ToneError>;
}

#[derive(Clone)]
pub struct ToneAdapter {
    tones: Arc<dyn ToneService>,
}

impl ToneAdapter {
    pub fn new(tones: Arc<dyn ToneService>) -> Self {
        Self { tones }
    }

    /// Start a tone; the handle re-enters the machine tagged with `generation`
    pub fn spawn_start(&self, tone: String, generation: u64, input: InputSender) {
        let tones = self.tones.clone();
        tokio::spawn(async move {
            let result = tones.start(&tone).await;
            let started = MachineInput::notify(SessionEvent::ToneStarted { generation, result });
            if let Err(rejected) = input.send(started) {
                if let SessionEvent::ToneStarted { result: Ok(handle), .. } = rejected.0.event {
                    tones.stop(handle);
                }
            }
        });
    }

    pub fn stop(&self, handle: ToneHandle) {
        debug!("Stopping tone {:?}", handle);
        self.tones.stop(handle);
    }

    pub fn spawn_resume_output(&self) {
        let tones = self.tones.clone();
        tokio::spawn(async move {
            if let Err(e) = tones.resume_output().await {
                warn!("Failed to resume audio output: {}", e);
            }
        });
    }
}

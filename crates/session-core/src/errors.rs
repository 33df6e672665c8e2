//! Error types for call-session coordination

use thiserror::Error;

use crate::adapters::{MediaError, SignalingError, ToneError, TransportError};
use crate::types::CallStatus;

/// Result type for call-session operations
pub type Result<T> = std::result::Result<T, CallError>;

/// Errors surfaced by [`CallSession`](crate::api::CallSession) commands and
/// reported through [`CallEvent::CallFailed`](crate::api::CallEvent).
///
/// None of these are fatal: every failure path runs the session cleanup and
/// leaves the machine `Idle`.
#[derive(Debug, Error)]
pub enum CallError {
    /// Local capture permission was refused or no device was available
    #[error("Capture denied: {0}")]
    CaptureDenied(#[from] MediaError),

    /// The transport could not reach the target
    #[error("Call placement failed: {0}")]
    PlacementFailed(#[source] TransportError),

    /// The transport channel reported an error mid-call
    #[error("Transport error: {message}")]
    TransportError { message: String },

    /// The transport channel closed without a local request
    #[error("Transport closed unexpectedly")]
    TransportClosed,

    /// A signaling message referenced a call that is not current
    #[error("Stale signaling message for call {call_id}")]
    StaleMessage { call_id: String },

    /// A session is already active for this user
    #[error("Session busy: call {call_id} is {status}")]
    SessionBusy { call_id: String, status: CallStatus },

    /// The command has no transition from the current state
    #[error("Invalid state: cannot {command} while {status}")]
    InvalidState { command: String, status: CallStatus },

    /// The call target is empty or the local user
    #[error("Invalid call target: {target}")]
    InvalidTarget { target: String },

    /// The signaling gateway rejected a send or subscription
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// A feedback tone could not be played
    #[error("Tone error: {0}")]
    Tone(#[from] ToneError),

    /// Configuration is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The session has been shut down
    #[error("Call session has shut down")]
    Shutdown,

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CallError {
    /// Create an invalid state error
    pub fn invalid_state(command: impl Into<String>, status: CallStatus) -> Self {
        Self::InvalidState {
            command: command.into(),
            status,
        }
    }

    /// Create an invalid target error
    pub fn invalid_target(target: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<rtcall_infra_common::Error> for CallError {
    fn from(err: rtcall_infra_common::Error) -> Self {
        Self::config(err.to_string())
    }
}

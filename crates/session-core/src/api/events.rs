//! Events published by a [`CallSession`](super::CallSession)

use serde::{Deserialize, Serialize};

use crate::types::{CallId, CallRecord, CallStatus, MediaKind, UserId};

/// Notifications for the UI layer and call history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEvent {
    /// The session status changed
    StatusChanged {
        call_id: Option<CallId>,
        from: CallStatus,
        to: CallStatus,
    },

    /// A remote user is ringing us
    IncomingCall {
        call_id: CallId,
        from: UserId,
        media_kind: MediaKind,
    },

    /// The peer's media is being rendered
    RemoteStreamAttached { call_id: CallId, stream_id: String },

    MuteChanged { call_id: CallId, muted: bool },

    /// The call ended because something failed
    CallFailed { call_id: CallId, error: String },

    /// Emitted exactly once per session, after cleanup
    CallEnded(CallRecord),

    /// A second caller was turned away while busy
    BusyRejected { call_id: CallId, from: UserId },
}

impl CallEvent {
    /// The call this event refers to, if any
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            CallEvent::StatusChanged { call_id, .. } => call_id.as_ref(),
            CallEvent::IncomingCall { call_id, .. }
            | CallEvent::RemoteStreamAttached { call_id, .. }
            | CallEvent::MuteChanged { call_id, .. }
            | CallEvent::CallFailed { call_id, .. }
            | CallEvent::BusyRejected { call_id, .. } => Some(call_id),
            CallEvent::CallEnded(record) => Some(&record.call_id),
        }
    }
}

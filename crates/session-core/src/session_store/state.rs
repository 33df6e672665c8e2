//! Per-call session state and the resources it owns

use chrono::{DateTime, Utc};

use crate::adapters::{ChannelRef, LocalStream, RemoteStream, ToneHandle};
use crate::state_table::Role;
use crate::types::{CallDirection, CallId, CallRecord, CallStatus, MediaKind, SessionSnapshot, TerminationReason, UserId};

/// Resource handles held for the lifetime of one session
#[derive(Debug, Default)]
pub struct SessionResources {
    pub capture: Option<LocalStream>,
    pub channel: Option<ChannelRef>,
    pub tones: Vec<ToneHandle>,
    pub remote_stream: Option<RemoteStream>,
}

/// Everything taken out of [`SessionResources`] by one release
#[derive(Debug, Default)]
pub struct ReleasedResources {
    pub capture: Option<LocalStream>,
    pub channel: Option<ChannelRef>,
    pub tones: Vec<ToneHandle>,
    pub remote_stream: Option<RemoteStream>,
}

impl ReleasedResources {
    pub fn is_empty(&self) -> bool {
        self.capture.is_none() && self.channel.is_none() && self.tones.is_empty() && self.remote_stream.is_none()
    }
}

impl SessionResources {
    /// Move every handle out. A second call returns nothing
    pub fn take_all(&mut self) -> ReleasedResources {
        ReleasedResources {
            capture: self.capture.take(),
            channel: self.channel.take(),
            tones: std::mem::take(&mut self.tones),
            remote_stream: self.remote_stream.take(),
        }
    }
}

/// State of the single active session
#[derive(Debug)]
pub struct SessionState {
    pub call_id: CallId,
    pub role: Role,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub local_user: UserId,
    pub remote_user: UserId,
    pub media_kind: MediaKind,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub muted: bool,

    /// `call-user` has gone out, so the remote side knows about the call
    pub call_user_sent: bool,

    /// Tones were stopped; late tone starts must be stopped on arrival
    pub tones_silenced: bool,

    pub resources: SessionResources,
}

impl SessionState {
    pub fn outgoing(call_id: CallId, local_user: UserId, remote_user: UserId, media_kind: MediaKind) -> Self {
        Self::new(call_id, Role::Caller, CallDirection::Outgoing, local_user, remote_user, media_kind)
    }

    pub fn incoming(call_id: CallId, local_user: UserId, remote_user: UserId, media_kind: MediaKind) -> Self {
        Self::new(call_id, Role::Callee, CallDirection::Incoming, local_user, remote_user, media_kind)
    }

    fn new(
        call_id: CallId,
        role: Role,
        direction: CallDirection,
        local_user: UserId,
        remote_user: UserId,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            call_id,
            role,
            direction,
            status: CallStatus::Idle,
            local_user,
            remote_user,
            media_kind,
            created_at: Utc::now(),
            started_at: None,
            muted: false,
            call_user_sent: false,
            tones_silenced: false,
            resources: SessionResources::default(),
        }
    }

    pub fn remote_stream_attached(&self) -> bool {
        self.resources.remote_stream.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let ringing_in = self.status == CallStatus::Ringing && self.direction == CallDirection::Incoming;
        SessionSnapshot {
            local_user: self.local_user.clone(),
            status: self.status,
            call_id: Some(self.call_id.clone()),
            direction: Some(self.direction),
            remote_user: Some(self.remote_user.clone()),
            incoming_caller: ringing_in.then(|| self.remote_user.clone()),
            media_kind: self.media_kind,
            started_at: self.started_at,
            muted: self.muted,
            remote_stream_attached: self.remote_stream_attached(),
        }
    }

    pub fn record(&self, ended_at: DateTime<Utc>, reason: TerminationReason) -> CallRecord {
        CallRecord {
            call_id: self.call_id.clone(),
            direction: self.direction,
            local_user: self.local_user.clone(),
            remote_user: self.remote_user.clone(),
            media_kind: self.media_kind,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at,
            duration_secs: crate::types::duration_since(self.started_at, ended_at),
            reason,
        }
    }
}

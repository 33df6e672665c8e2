//! Core types for rtcall-session-core
//!
//! Identifiers, call status, the read-only session snapshot exposed to the UI
//! layer and the call detail record produced when a session ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a local or remote participant
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque call identifier shared by both ends of a call
#[derive(Debug, Clone, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    /// Generate a fresh identifier for an outgoing call
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What the call carries; determines local capture constraints
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

impl MediaKind {
    /// Whether local capture must include a camera track
    pub fn includes_video(&self) -> bool {
        matches!(self, MediaKind::Video)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// Which side originated the call
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Observable session status
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Idle,
    Ringing,
    Connected,
    Ended,
}

impl CallStatus {
    /// A session exists and owns resources
    pub fn is_active(&self) -> bool {
        matches!(self, CallStatus::Ringing | CallStatus::Connected)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStatus::Idle => "idle",
            CallStatus::Ringing => "ringing",
            CallStatus::Connected => "connected",
            CallStatus::Ended => "ended",
        };
        write!(f, "{}", name)
    }
}

/// Why a session reached `Ended`
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum TerminationReason {
    LocalHangup,
    LocalDecline,
    RemoteDeclined,
    RemoteEnded,
    RemoteStopped,
    RemoteMissed,
    Timeout,
    CaptureDenied,
    PlacementFailed,
    TransportClosed,
    TransportError,
    Shutdown,
}

impl TerminationReason {
    /// Reasons that are reported as failures rather than normal hangups
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TerminationReason::CaptureDenied
                | TerminationReason::PlacementFailed
                | TerminationReason::TransportClosed
                | TerminationReason::TransportError
        )
    }
}

/// Read-only view of the session rendered by the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The local user owning this session
    pub local_user: UserId,
    /// Current status
    pub status: CallStatus,
    /// Current call id, if a session exists
    pub call_id: Option<CallId>,
    /// Direction of the current call
    pub direction: Option<CallDirection>,
    /// The other participant
    pub remote_user: Option<UserId>,
    /// Caller of an incoming call that has not been answered yet
    pub incoming_caller: Option<UserId>,
    /// Media kind of the current (or last) call
    pub media_kind: MediaKind,
    /// When the call connected
    pub started_at: Option<DateTime<Utc>>,
    /// Whether the local audio track is disabled
    pub muted: bool,
    /// Whether a remote stream is attached
    pub remote_stream_attached: bool,
}

impl SessionSnapshot {
    /// Snapshot of a user with no session
    pub fn idle(local_user: UserId) -> Self {
        Self {
            local_user,
            status: CallStatus::Idle,
            call_id: None,
            direction: None,
            remote_user: None,
            incoming_caller: None,
            media_kind: MediaKind::Audio,
            started_at: None,
            muted: false,
            remote_stream_attached: false,
        }
    }
}

/// Call detail record emitted once per ended session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: CallId,
    pub direction: CallDirection,
    pub local_user: UserId,
    pub remote_user: UserId,
    pub media_kind: MediaKind,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    /// Whole seconds between `started_at` and `ended_at`, 0 if never connected
    pub duration_secs: u64,
    pub reason: TerminationReason,
}

/// Whole seconds elapsed since `started_at`, or 0 when the call never connected
pub fn duration_since(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    started_at
        .map(|start| (now - start).num_seconds().max(0) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_duration_before_connect_is_zero() {
        assert_eq!(duration_since(None, Utc::now()), 0);
    }

    #[test]
    fn test_duration_truncates_to_whole_seconds() {
        let start = Utc::now();
        let now = start + Duration::milliseconds(65_900);
        assert_eq!(duration_since(Some(start), now), 65);
    }

    #[test]
    fn test_duration_never_negative() {
        let start = Utc::now();
        let earlier = start - Duration::seconds(3);
        assert_eq!(duration_since(Some(start), earlier), 0);
    }

    #[test]
    fn test_media_kind_parsing() {
        assert_eq!("VIDEO".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!("fax".parse::<MediaKind>().is_err());
        assert_eq!(serde_json::to_string(&MediaKind::Audio).unwrap(), "\"audio\"");
    }

    #[test]
    fn test_call_ids_are_unique() {
        assert_ne!(CallId::new(), CallId::new());
    }
}

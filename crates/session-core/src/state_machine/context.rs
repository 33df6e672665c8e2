//! Payload carried from an event into the actions of its transition
//!
//! Resource-bearing payloads (capture streams, transport channels) are moved
//! into the session by the action that needs them. Whatever is still here
//! when the transition finishes was not wanted and gets released.

use crate::adapters::{LocalStream, PeerChannel, RemoteStream};
use crate::errors::CallError;
use crate::state_machine::events::SessionEvent;
use crate::types::{CallId, MediaKind, UserId};

#[derive(Debug, Default)]
pub struct ActionContext {
    /// Target of a local `StartCall`
    pub target: Option<(UserId, MediaKind)>,
    /// Caller, call id and kind of an incoming notice
    pub incoming: Option<(UserId, CallId, MediaKind)>,
    pub capture: Option<LocalStream>,
    pub channel: Option<PeerChannel>,
    pub remote_stream: Option<RemoteStream>,
    /// Failure reported when this event ends the session
    pub failure: Option<CallError>,
}

impl ActionContext {
    pub fn from_event(event: SessionEvent) -> Self {
        let mut ctx = Self::default();
        match event {
            SessionEvent::StartCall { target, kind } => ctx.target = Some((target, kind)),
            SessionEvent::IncomingCall { from, call_id, kind } => {
                ctx.incoming = Some((from, call_id, kind))
            }
            SessionEvent::InboundOffer(channel) => ctx.channel = Some(channel),
            SessionEvent::RemoteStream { stream, .. } => ctx.remote_stream = Some(stream),
            SessionEvent::CloseGraceElapsed { .. } => ctx.failure = Some(CallError::TransportClosed),
            SessionEvent::ChannelError { message, .. } => {
                ctx.failure = Some(CallError::TransportError { message })
            }
            SessionEvent::CaptureResolved { result, .. } => match result {
                Ok(stream) => ctx.capture = Some(stream),
                Err(e) => ctx.failure = Some(CallError::CaptureDenied(e)),
            },
            SessionEvent::PlacementResolved { result, .. } => match result {
                Ok(channel) => ctx.channel = Some(channel),
                Err(e) => ctx.failure = Some(CallError::PlacementFailed(e)),
            },
            SessionEvent::AnswerResolved { result: Err(e), .. } => {
                ctx.failure = Some(CallError::TransportError {
                    message: e.to_string(),
                })
            }
            _ => {}
        }
        ctx
    }

    /// Whether the context still holds something that must be released
    pub fn holds_resources(&self) -> bool {
        self.capture.is_some() || self.channel.is_some()
    }
}

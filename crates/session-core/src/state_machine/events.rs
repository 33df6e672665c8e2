//! Inputs accepted by the session state machine
//!
//! Local commands, signaling notices, transport events and the completions of
//! suspended operations all arrive as a [`SessionEvent`] on one queue.
//! Completions carry the generation that started them; the machine drops
//! any completion whose generation is no longer current.

use tokio::sync::{mpsc, oneshot};

use crate::adapters::{
    ChannelId, LocalStream, MediaError, PeerChannel, RemoteStream, ToneError, ToneHandle,
    TransportError,
};
use crate::errors::Result;
use crate::types::{CallId, MediaKind, UserId};

#[derive(Debug)]
pub enum SessionEvent {
    // Local commands
    StartCall { target: UserId, kind: MediaKind },
    AcceptCall,
    DeclineCall,
    EndCall,
    ToggleMute,
    UnlockAudio,
    Shutdown,

    // Signaling notices
    IncomingCall { from: UserId, call_id: CallId, kind: MediaKind },
    RemoteAccepted { call_id: CallId },
    RemoteDeclined { call_id: CallId },
    RemoteEnded { call_id: CallId },
    RemoteStopped { call_id: CallId },
    RemoteMissed { call_id: CallId },

    // Transport events
    InboundOffer(PeerChannel),
    RemoteStream { channel: ChannelId, stream: RemoteStream },
    ChannelClosed { channel: ChannelId },
    ChannelError { channel: ChannelId, message: String },

    // Completions of suspended operations
    CaptureResolved { generation: u64, result: std::result::Result<LocalStream, MediaError> },
    PlacementResolved { generation: u64, result: std::result::Result<PeerChannel, TransportError> },
    AnswerResolved { generation: u64, result: std::result::Result<(), TransportError> },
    ToneStarted { generation: u64, result: std::result::Result<ToneHandle, ToneError> },
    RingTimeout { generation: u64 },
    /// The channel closed and no termination notice followed in time
    CloseGraceElapsed { generation: u64 },
}

/// Payload-free event discriminant used as the state table key
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventKind {
    StartCall,
    AcceptCall,
    DeclineCall,
    EndCall,
    ToggleMute,
    Shutdown,
    IncomingCall,
    RemoteAccepted,
    RemoteDeclined,
    RemoteEnded,
    RemoteStopped,
    RemoteMissed,
    InboundOffer,
    RemoteStream,
    ChannelClosed,
    ChannelError,
    CaptureReady,
    CaptureFailed,
    PlacementReady,
    PlacementFailed,
    AnswerReady,
    AnswerFailed,
    RingTimeout,
    TransportLost,
}

impl SessionEvent {
    /// Table key for this event. `None` for events handled outside the table
    pub fn kind(&self) -> Option<EventKind> {
        let kind = match self {
            SessionEvent::StartCall { .. } => EventKind::StartCall,
            SessionEvent::AcceptCall => EventKind::AcceptCall,
            SessionEvent::DeclineCall => EventKind::DeclineCall,
            SessionEvent::EndCall => EventKind::EndCall,
            SessionEvent::ToggleMute => EventKind::ToggleMute,
            SessionEvent::Shutdown => EventKind::Shutdown,
            SessionEvent::IncomingCall { .. } => EventKind::IncomingCall,
            SessionEvent::RemoteAccepted { .. } => EventKind::RemoteAccepted,
            SessionEvent::RemoteDeclined { .. } => EventKind::RemoteDeclined,
            SessionEvent::RemoteEnded { .. } => EventKind::RemoteEnded,
            SessionEvent::RemoteStopped { .. } => EventKind::RemoteStopped,
            SessionEvent::RemoteMissed { .. } => EventKind::RemoteMissed,
            SessionEvent::InboundOffer(_) => EventKind::InboundOffer,
            SessionEvent::RemoteStream { .. } => EventKind::RemoteStream,
            SessionEvent::ChannelClosed { .. } => EventKind::ChannelClosed,
            SessionEvent::ChannelError { .. } => EventKind::ChannelError,
            SessionEvent::CaptureResolved { result: Ok(_), .. } => EventKind::CaptureReady,
            SessionEvent::CaptureResolved { result: Err(_), .. } => EventKind::CaptureFailed,
            SessionEvent::PlacementResolved { result: Ok(_), .. } => EventKind::PlacementReady,
            SessionEvent::PlacementResolved { result: Err(_), .. } => EventKind::PlacementFailed,
            SessionEvent::AnswerResolved { result: Ok(_), .. } => EventKind::AnswerReady,
            SessionEvent::AnswerResolved { result: Err(_), .. } => EventKind::AnswerFailed,
            SessionEvent::RingTimeout { .. } => EventKind::RingTimeout,
            SessionEvent::CloseGraceElapsed { .. } => EventKind::TransportLost,
            SessionEvent::UnlockAudio | SessionEvent::ToneStarted { .. } => return None,
        };
        Some(kind)
    }

    /// Generation tag carried by completions and timer firings
    pub fn generation(&self) -> Option<u64> {
        match self {
            SessionEvent::CaptureResolved { generation, .. }
            | SessionEvent::PlacementResolved { generation, .. }
            | SessionEvent::AnswerResolved { generation, .. }
            | SessionEvent::ToneStarted { generation, .. }
            | SessionEvent::RingTimeout { generation }
            | SessionEvent::CloseGraceElapsed { generation } => Some(*generation),
            _ => None,
        }
    }

    /// Call id named by a signaling notice
    pub fn signaled_call_id(&self) -> Option<&CallId> {
        match self {
            SessionEvent::RemoteAccepted { call_id }
            | SessionEvent::RemoteDeclined { call_id }
            | SessionEvent::RemoteEnded { call_id }
            | SessionEvent::RemoteStopped { call_id }
            | SessionEvent::RemoteMissed { call_id } => Some(call_id),
            _ => None,
        }
    }

    /// Channel named by a transport event
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            SessionEvent::RemoteStream { channel, .. }
            | SessionEvent::ChannelClosed { channel }
            | SessionEvent::ChannelError { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Name used for `InvalidState` errors
    pub fn command_name(&self) -> &'static str {
        match self {
            SessionEvent::StartCall { .. } => "start call",
            SessionEvent::AcceptCall => "accept call",
            SessionEvent::DeclineCall => "decline call",
            SessionEvent::EndCall => "end call",
            SessionEvent::ToggleMute => "toggle mute",
            SessionEvent::UnlockAudio => "unlock audio",
            SessionEvent::Shutdown => "shut down",
            _ => "handle event",
        }
    }
}

/// Successful result of a local command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A call was started with this id
    Started(CallId),
    /// The new muted flag
    Muted(bool),
    Done,
}

pub type CommandReply = oneshot::Sender<Result<CommandOutcome>>;

/// One entry on the machine's input queue
#[derive(Debug)]
pub struct MachineInput {
    pub event: SessionEvent,
    pub reply: Option<CommandReply>,
}

impl MachineInput {
    /// An event nobody waits on
    pub fn notify(event: SessionEvent) -> Self {
        Self { event, reply: None }
    }

    /// A command whose outcome is sent back on the returned receiver
    pub fn command(event: SessionEvent) -> (Self, oneshot::Receiver<Result<CommandOutcome>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                event,
                reply: Some(tx),
            },
            rx,
        )
    }
}

pub type InputSender = mpsc::UnboundedSender<MachineInput>;
pub type InputReceiver = mpsc::UnboundedReceiver<MachineInput>;

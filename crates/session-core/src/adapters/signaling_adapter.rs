//! Signaling adapter
//!
//! Thin translation layer between a [`SignalingGateway`] and the state
//! machine. Outbound notices are queued to a single pump task so they reach
//! the gateway in the order the machine produced them; inbound notices are
//! mapped to [`SessionEvent`]s and funnelled into the machine's input queue.
//!
//! A notice that ends a call can carry the call's transport channel, which
//! the pump closes only after the gateway accepted the notice.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::transport_adapter::ChannelRef;
use crate::signaling::SignalingMessage;
use crate::state_machine::events::{InputSender, MachineInput, SessionEvent};
use crate::types::UserId;

/// Errors raised by the signaling codec or gateway
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("Unknown signaling event: {0}")]
    UnknownEvent(String),

    #[error("Missing field `{field}` in {event}")]
    MissingField { event: String, field: &'static str },

    #[error("Malformed {event} payload: {message}")]
    Malformed { event: String, message: String },

    #[error("User {0} is already subscribed")]
    AlreadySubscribed(UserId),

    #[error("Signaling gateway unavailable: {0}")]
    Unavailable(String),
}

impl SignalingError {
    pub fn malformed(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            event: event.into(),
            message: message.into(),
        }
    }
}

/// Reliable message bus between users
#[async_trait]
pub trait SignalingGateway: Send + Sync + 'static {
    /// Deliver a notice to `message.envelope().to`
    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError>;

    /// Receive notices addressed to `user`. Each user may subscribe once
    fn subscribe(&self, user: &UserId) -> Result<mpsc::UnboundedReceiver<SignalingMessage>, SignalingError>;
}

/// A queued notice and the channel to close once it is sent
#[derive(Debug)]
struct Outbound {
    message: SignalingMessage,
    close_after: Option<ChannelRef>,
}

/// Queues outbound notices and pumps inbound ones into the machine
#[derive(Clone)]
pub struct SignalingAdapter {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SignalingAdapter {
    /// Subscribe `local_user` and start both pumps
    pub fn start(
        gateway: Arc<dyn SignalingGateway>,
        local_user: &UserId,
        input: InputSender,
    ) -> Result<Self, SignalingError> {
        let inbound = gateway.subscribe(local_user)?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::outbound_pump(gateway, outbound_rx));
        tokio::spawn(Self::inbound_pump(inbound, input));

        Ok(Self { outbound })
    }

    /// Queue a notice. Sends are fire-and-forget from the machine's view
    pub fn send(&self, message: SignalingMessage) {
        self.enqueue(Outbound {
            message,
            close_after: None,
        });
    }

    /// Queue a notice, then close `channel` once the notice has been sent
    pub fn send_then_close(&self, message: SignalingMessage, channel: Option<ChannelRef>) {
        self.enqueue(Outbound {
            message,
            close_after: channel,
        });
    }

    fn enqueue(&self, outbound: Outbound) {
        debug!(
            "Queueing {} for call {}",
            outbound.message.event_name(),
            outbound.message.call_id()
        );
        if let Err(rejected) = self.outbound.send(outbound) {
            warn!("Signaling pump has stopped, dropping outbound notice");
            if let Some(channel) = rejected.0.close_after {
                channel.close();
            }
        }
    }

    async fn outbound_pump(gateway: Arc<dyn SignalingGateway>, mut rx: mpsc::UnboundedReceiver<Outbound>) {
        while let Some(Outbound { message, close_after }) = rx.recv().await {
            let event = message.event_name();
            let call_id = message.call_id().clone();
            if let Err(e) = gateway.send(message).await {
                error!("Failed to send {} for call {}: {}", event, call_id, e);
            }
            if let Some(channel) = close_after {
                debug!("Closing channel {} after {} for call {}", channel.id(), event, call_id);
                channel.close();
            }
        }
        debug!("Outbound signaling pump finished");
    }

    async fn inbound_pump(
        mut inbound: mpsc::UnboundedReceiver<SignalingMessage>,
        input: InputSender,
    ) {
        while let Some(message) = inbound.recv().await {
            debug!("Inbound {} for call {}", message.event_name(), message.call_id());
            if input.send(MachineInput::notify(to_session_event(message))).is_err() {
                break;
            }
        }
        debug!("Inbound signaling pump finished");
    }
}

/// Map an inbound notice to the event the machine understands
pub fn to_session_event(message: SignalingMessage) -> SessionEvent {
    match message {
        SignalingMessage::CallUser {
            envelope,
            call_type,
        } => SessionEvent::IncomingCall {
            from: envelope.from,
            call_id: envelope.call_id,
            kind: call_type,
        },
        SignalingMessage::AcceptCall(envelope) => SessionEvent::RemoteAccepted {
            call_id: envelope.call_id,
        },
        SignalingMessage::DeclineCall(envelope) => SessionEvent::RemoteDeclined {
            call_id: envelope.call_id,
        },
        SignalingMessage::EndCall { envelope, .. } => SessionEvent::RemoteEnded {
            call_id: envelope.call_id,
        },
        SignalingMessage::CallStopped(envelope) => SessionEvent::RemoteStopped {
            call_id: envelope.call_id,
        },
        SignalingMessage::MissedCall(envelope) => SessionEvent::RemoteMissed {
            call_id: envelope.call_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::Envelope;
    use crate::types::{CallId, MediaKind};

    #[test]
    fn test_call_user_maps_to_incoming_call() {
        let event = to_session_event(SignalingMessage::CallUser {
            envelope: Envelope::new(UserId::from("userA"), UserId::from("userB"), CallId::from("c1")),
            call_type: MediaKind::Video,
        });

        match event {
            SessionEvent::IncomingCall { from, call_id, kind } => {
                assert_eq!(from, UserId::from("userA"));
                assert_eq!(call_id, CallId::from("c1"));
                assert_eq!(kind, MediaKind::Video);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_termination_notices_keep_call_id() {
        let envelope = Envelope::new(UserId::from("a"), UserId::from("b"), CallId::from("c9"));
        let event = to_session_event(SignalingMessage::CallStopped(envelope));
        assert!(matches!(event, SessionEvent::RemoteStopped { call_id } if call_id == CallId::from("c9")));
    }
}

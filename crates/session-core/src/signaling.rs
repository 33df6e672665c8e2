//! Signaling message set and its wire codec
//!
//! Messages travel as `(event name, JSON payload)` pairs over a socket-style
//! bus. Payload fields are camelCase: `from`, `to`, `callId`, `callType`,
//! `duration`. Every message is scoped by its call id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapters::SignalingError;
use crate::types::{CallId, MediaKind, UserId};

/// Event names as they appear on the wire
pub mod event_names {
    pub const CALL_USER: &str = "call-user";
    pub const MISSED_CALL: &str = "missed-call";
    pub const ACCEPT_CALL: &str = "accept-call";
    pub const DECLINE_CALL: &str = "decline-call";
    pub const END_CALL: &str = "end-call";
    pub const CALL_STOPPED: &str = "call-stopped";

    // Names used by the relay when forwarding to the other party
    pub const INCOMING_CALL: &str = "incoming-call";
    pub const CALL_ACCEPTED: &str = "call-accepted";
    pub const CALL_DECLINED: &str = "call-declined";
    pub const CALL_ENDED: &str = "call-ended";
}

/// Addressing shared by every message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub from: UserId,
    #[serde(default)]
    pub to: UserId,
    pub call_id: CallId,
}

impl Envelope {
    pub fn new(from: UserId, to: UserId, call_id: CallId) -> Self {
        Self { from, to, call_id }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallUserPayload {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(default)]
    call_type: MediaKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndCallPayload {
    #[serde(flatten)]
    envelope: Envelope,
    #[serde(default)]
    duration: u64,
}

/// A signaling notice exchanged between the two ends of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    /// Caller rings the callee
    CallUser { envelope: Envelope, call_type: MediaKind },
    /// Caller gave up before the callee answered
    MissedCall(Envelope),
    AcceptCall(Envelope),
    DeclineCall(Envelope),
    /// Either side hung up; `duration` is whole seconds since connect
    EndCall { envelope: Envelope, duration: u64 },
    /// The relay force-terminated the call
    CallStopped(Envelope),
}

impl SignalingMessage {
    pub fn envelope(&self) -> &Envelope {
        match self {
            SignalingMessage::CallUser { envelope, .. }
            | SignalingMessage::EndCall { envelope, .. } => envelope,
            SignalingMessage::MissedCall(envelope)
            | SignalingMessage::AcceptCall(envelope)
            | SignalingMessage::DeclineCall(envelope)
            | SignalingMessage::CallStopped(envelope) => envelope,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.envelope().call_id
    }

    /// Outbound event name
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalingMessage::CallUser { .. } => event_names::CALL_USER,
            SignalingMessage::MissedCall(_) => event_names::MISSED_CALL,
            SignalingMessage::AcceptCall(_) => event_names::ACCEPT_CALL,
            SignalingMessage::DeclineCall(_) => event_names::DECLINE_CALL,
            SignalingMessage::EndCall { .. } => event_names::END_CALL,
            SignalingMessage::CallStopped(_) => event_names::CALL_STOPPED,
        }
    }

    /// Encode into an event name and JSON payload
    pub fn encode(&self) -> Result<(&'static str, Value), SignalingError> {
        let payload = match self {
            SignalingMessage::CallUser {
                envelope,
                call_type,
            } => serde_json::to_value(CallUserPayload {
                envelope: envelope.clone(),
                call_type: *call_type,
            }),
            SignalingMessage::EndCall { envelope, duration } => {
                serde_json::to_value(EndCallPayload {
                    envelope: envelope.clone(),
                    duration: *duration,
                })
            }
            other => serde_json::to_value(other.envelope()),
        }
        .map_err(|e| SignalingError::malformed(self.event_name(), e.to_string()))?;

        Ok((self.event_name(), payload))
    }

    /// Decode an inbound event. Both relayed and outbound names are accepted
    pub fn decode(event: &str, payload: Value) -> Result<Self, SignalingError> {
        use event_names::*;

        let message = match event {
            CALL_USER | INCOMING_CALL => {
                let body: CallUserPayload = parse(event, payload)?;
                if body.envelope.from.is_empty() {
                    return Err(SignalingError::MissingField {
                        event: event.to_string(),
                        field: "from",
                    });
                }
                SignalingMessage::CallUser {
                    envelope: body.envelope,
                    call_type: body.call_type,
                }
            }
            END_CALL | CALL_ENDED => {
                let body: EndCallPayload = parse(event, payload)?;
                SignalingMessage::EndCall {
                    envelope: body.envelope,
                    duration: body.duration,
                }
            }
            MISSED_CALL => SignalingMessage::MissedCall(parse(event, payload)?),
            ACCEPT_CALL | CALL_ACCEPTED => SignalingMessage::AcceptCall(parse(event, payload)?),
            DECLINE_CALL | CALL_DECLINED => SignalingMessage::DeclineCall(parse(event, payload)?),
            CALL_STOPPED => SignalingMessage::CallStopped(parse(event, payload)?),
            unknown => return Err(SignalingError::UnknownEvent(unknown.to_string())),
        };

        Ok(message)
    }
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, payload: Value) -> Result<T, SignalingError> {
    serde_json::from_value(payload).map_err(|e| {
        if e.to_string().contains("missing field `callId`") {
            SignalingError::MissingField {
                event: event.to_string(),
                field: "callId",
            }
        } else {
            SignalingError::malformed(event, e.to_string())
        }
    })
}

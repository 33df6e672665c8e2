use std::collections::HashMap;

use crate::state_machine::events::EventKind;
use crate::types::{CallStatus, TerminationReason};

/// Role of the local user in the current session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Role {
    /// No session exists
    Unassigned,
    /// Local user placed the call
    Caller,
    /// Local user is being called
    Callee,
}

/// Key for looking up transitions in the state table
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct StateKey {
    pub role: Role,
    pub status: CallStatus,
    pub event: EventKind,
}

impl StateKey {
    pub fn new(role: Role, status: CallStatus, event: EventKind) -> Self {
        Self { role, status, event }
    }
}

/// Transition definition - what happens when an event occurs in a state
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Conditions that must hold, otherwise the event is discarded
    pub guards: Vec<Guard>,

    /// Actions to execute, in order
    pub actions: Vec<Action>,

    /// Next status (if changing)
    pub next_status: Option<CallStatus>,

    /// Reason recorded when `next_status` is `Ended`
    pub reason: Option<TerminationReason>,
}

impl Transition {
    /// A transition that runs actions and stays in place
    pub fn stay(actions: Vec<Action>) -> Self {
        Self {
            guards: vec![],
            actions,
            next_status: None,
            reason: None,
        }
    }

    pub fn to(next: CallStatus, actions: Vec<Action>) -> Self {
        Self {
            guards: vec![],
            actions,
            next_status: Some(next),
            reason: None,
        }
    }

    /// A transition into `Ended`
    pub fn end(reason: TerminationReason, actions: Vec<Action>) -> Self {
        Self {
            guards: vec![],
            actions,
            next_status: Some(CallStatus::Ended),
            reason: Some(reason),
        }
    }

    pub fn guarded(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn ends_session(&self) -> bool {
        self.next_status == Some(CallStatus::Ended)
    }
}

/// Guards that must be satisfied for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The session holds a local capture stream
    HasLocalCapture,
    /// An inbound offer comes from the session's remote user
    OfferFromRemote,
    /// No remote stream is attached yet
    RemoteStreamNotAttached,
    /// The session has no transport channel yet
    NoChannel,
}

/// Which cue a tone action plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneCue {
    /// Ringback heard by the caller
    Outgoing,
    /// Ringtone heard by the callee
    Incoming,
}

/// Actions to execute during a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    // Session lifecycle
    CreateOutgoingSession,
    CreateIncomingSession,
    MarkConnected,

    // Media
    AcquireCapture,
    AttachCapture,
    AttachRemoteStream,
    ToggleMute,
    ResumeAudioOutput,

    // Transport
    PlaceTransportCall,
    AdoptChannel,
    AnswerTransport,
    StashOffer,
    AdoptPendingOffer,
    DiscardPendingOffer,
    CloseTransport,

    // Signaling
    SendCallUser,
    SendAcceptCall,
    SendDeclineCall,
    SendMissedCall,
    SendEndCall,
    RejectBusy,

    // Tones and timers
    StartTone(ToneCue),
    StopTones,
    ArmRingTimer,
    CancelRingTimer,
    ArmCloseGrace,
}

/// Master state table containing all transitions
#[derive(Debug, Default)]
pub struct MasterStateTable {
    transitions: HashMap<StateKey, Transition>,
}

impl MasterStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: StateKey, transition: Transition) {
        self.transitions.insert(key, transition);
    }

    pub fn get(&self, key: &StateKey) -> Option<&Transition> {
        self.transitions.get(key)
    }

    pub fn has_transition(&self, key: &StateKey) -> bool {
        self.transitions.contains_key(key)
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &Transition)> {
        self.transitions.iter()
    }

    /// Check the table's structural invariants
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (key, transition) in &self.transitions {
            if key.status == CallStatus::Ended
                || (key.status == CallStatus::Idle && key.role != Role::Unassigned)
            {
                errors.push(format!("{:?} is keyed on a state no session can be in", key));
            }

            if transition.ends_session() && transition.reason.is_none() {
                errors.push(format!("{:?} ends the session without a reason", key));
            }

            // Leaving Ringing must not leave a live timer behind
            let leaves_ringing = key.status == CallStatus::Ringing
                && transition.next_status == Some(CallStatus::Connected);
            if leaves_ringing && !transition.actions.contains(&Action::CancelRingTimer) {
                errors.push(format!("{:?} leaves Ringing without cancelling the ring timer", key));
            }

            if transition.next_status == Some(CallStatus::Ringing)
                && !transition.actions.contains(&Action::ArmRingTimer)
            {
                errors.push(format!("{:?} enters Ringing without arming the ring timer", key));
            }
        }

        for role in [Role::Caller, Role::Callee] {
            for status in [CallStatus::Ringing, CallStatus::Connected] {
                for event in [EventKind::EndCall, EventKind::Shutdown] {
                    if !self.has_transition(&StateKey::new(role, status, event)) {
                        errors.push(format!("{:?} {:?} cannot handle {:?}", role, status, event));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

use crate::state_machine::events::EventKind;
use crate::state_table::{Action, Role, StateTableBuilder, ToneCue, Transition};
use crate::types::CallStatus;

/// Add transitions out of `Idle`, before a role is assigned
pub fn add_idle_transitions(builder: &mut StateTableBuilder) {
    // Idle -> Ringing: local user places a call
    builder.add_transition(
        Role::Unassigned,
        CallStatus::Idle,
        EventKind::StartCall,
        Transition::to(
            CallStatus::Ringing,
            vec![
                Action::DiscardPendingOffer,
                Action::CreateOutgoingSession,
                Action::ResumeAudioOutput,
                Action::AcquireCapture,
                Action::ArmRingTimer,
            ],
        ),
    );

    // Idle -> Ringing: remote user rings us
    builder.add_transition(
        Role::Unassigned,
        CallStatus::Idle,
        EventKind::IncomingCall,
        Transition::to(
            CallStatus::Ringing,
            vec![
                Action::CreateIncomingSession,
                Action::AdoptPendingOffer,
                Action::StartTone(ToneCue::Incoming),
                Action::ArmRingTimer,
            ],
        ),
    );

    // Offer arrived ahead of its notice
    builder.add_transition(
        Role::Unassigned,
        CallStatus::Idle,
        EventKind::InboundOffer,
        Transition::stay(vec![Action::StashOffer]),
    );
}

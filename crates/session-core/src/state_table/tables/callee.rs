use crate::state_machine::events::EventKind;
use crate::state_table::{Action, Guard, Role, StateTableBuilder, Transition};
use crate::types::{CallStatus, TerminationReason};

/// Add transitions for the side being called
pub fn add_callee_transitions(builder: &mut StateTableBuilder) {
    let role = Role::Callee;

    // Ringing -> Connected: local user accepts; capture is acquired after
    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::AcceptCall,
        Transition::to(
            CallStatus::Connected,
            vec![
                Action::StopTones,
                Action::CancelRingTimer,
                Action::ResumeAudioOutput,
                Action::MarkConnected,
                Action::AcquireCapture,
            ],
        ),
    );

    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::DeclineCall,
        Transition::end(
            TerminationReason::LocalDecline,
            vec![Action::SendDeclineCall, Action::CloseTransport],
        ),
    );

    // The caller's own timer reports the missed call
    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::RingTimeout,
        Transition::end(TerminationReason::Timeout, vec![Action::CloseTransport]),
    );

    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::RemoteMissed,
        Transition::end(TerminationReason::RemoteMissed, vec![Action::CloseTransport]),
    );

    // Offer arrives after its notice
    for status in [CallStatus::Ringing, CallStatus::Connected] {
        let actions = if status == CallStatus::Ringing {
            vec![Action::AdoptChannel]
        } else {
            vec![Action::AdoptChannel, Action::AnswerTransport]
        };
        builder.add_transition(
            role,
            status,
            EventKind::InboundOffer,
            Transition::stay(actions)
                .guarded(Guard::OfferFromRemote)
                .guarded(Guard::NoChannel),
        );
    }

    // Connected: capture granted, answer and tell the caller
    builder.add_transition(
        role,
        CallStatus::Connected,
        EventKind::CaptureReady,
        Transition::stay(vec![
            Action::AttachCapture,
            Action::AnswerTransport,
            Action::SendAcceptCall,
        ]),
    );

    // The caller is still ringing; decline on its behalf
    builder.add_transition(
        role,
        CallStatus::Connected,
        EventKind::CaptureFailed,
        Transition::end(
            TerminationReason::CaptureDenied,
            vec![Action::SendDeclineCall, Action::CloseTransport],
        ),
    );

    builder.add_transition(
        role,
        CallStatus::Connected,
        EventKind::AnswerReady,
        Transition::stay(vec![]),
    );

    builder.add_transition(
        role,
        CallStatus::Connected,
        EventKind::AnswerFailed,
        Transition::end(
            TerminationReason::TransportError,
            vec![Action::SendEndCall, Action::CloseTransport],
        ),
    );

    builder.add_transition(
        role,
        CallStatus::Connected,
        EventKind::RemoteStream,
        Transition::stay(vec![Action::AttachRemoteStream]).guarded(Guard::RemoteStreamNotAttached),
    );
}

use crate::state_machine::events::EventKind;
use crate::state_table::{Action, Guard, Role, StateTableBuilder, ToneCue, Transition};
use crate::types::{CallStatus, TerminationReason};

/// Add transitions for the side that placed the call
pub fn add_caller_transitions(builder: &mut StateTableBuilder) {
    let role = Role::Caller;

    // Ringing: capture granted, place the transport call
    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::CaptureReady,
        Transition::stay(vec![Action::AttachCapture, Action::PlaceTransportCall]),
    );

    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::CaptureFailed,
        Transition::end(TerminationReason::CaptureDenied, vec![]),
    );

    // Ringing: transport call placed, ring the remote user
    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::PlacementReady,
        Transition::stay(vec![
            Action::AdoptChannel,
            Action::SendCallUser,
            Action::StartTone(ToneCue::Outgoing),
        ]),
    );

    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::PlacementFailed,
        Transition::end(TerminationReason::PlacementFailed, vec![]),
    );

    // Ringing -> Connected: the peer's stream arrived
    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::RemoteStream,
        Transition::to(
            CallStatus::Connected,
            vec![
                Action::StopTones,
                Action::CancelRingTimer,
                Action::MarkConnected,
                Action::AttachRemoteStream,
            ],
        ),
    );

    // Ringing -> Connected: the remote user accepted
    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::RemoteAccepted,
        Transition::to(
            CallStatus::Connected,
            vec![Action::StopTones, Action::CancelRingTimer, Action::MarkConnected],
        ),
    );

    // Ringing -> Ended: nobody answered
    builder.add_transition(
        role,
        CallStatus::Ringing,
        EventKind::RingTimeout,
        Transition::end(
            TerminationReason::Timeout,
            vec![Action::SendMissedCall, Action::CloseTransport],
        ),
    );

    // Connected: accept notice after the stream already connected us
    builder.add_transition(
        role,
        CallStatus::Connected,
        EventKind::RemoteAccepted,
        Transition::stay(vec![]),
    );

    // Connected: stream arrives after the accept notice
    builder.add_transition(
        role,
        CallStatus::Connected,
        EventKind::RemoteStream,
        Transition::stay(vec![Action::AttachRemoteStream]).guarded(Guard::RemoteStreamNotAttached),
    );
}

use crate::state_machine::events::EventKind;
use crate::state_table::{Action, Guard, Role, StateTableBuilder, Transition};
use crate::types::{CallStatus, TerminationReason};

const ACTIVE: [CallStatus; 2] = [CallStatus::Ringing, CallStatus::Connected];

/// Add transitions that apply to both roles while a session is active
pub fn add_common_transitions(builder: &mut StateTableBuilder) {
    for role in [Role::Caller, Role::Callee] {
        // Local hangup
        builder.add_for_statuses(
            role,
            &ACTIVE,
            EventKind::EndCall,
            Transition::end(
                TerminationReason::LocalHangup,
                vec![Action::SendEndCall, Action::CloseTransport],
            ),
        );

        builder.add_for_statuses(
            role,
            &ACTIVE,
            EventKind::Shutdown,
            Transition::end(
                TerminationReason::Shutdown,
                vec![Action::SendEndCall, Action::CloseTransport],
            ),
        );

        // Remote termination: the other side already knows
        for (event, reason) in [
            (EventKind::RemoteDeclined, TerminationReason::RemoteDeclined),
            (EventKind::RemoteEnded, TerminationReason::RemoteEnded),
            (EventKind::RemoteStopped, TerminationReason::RemoteStopped),
        ] {
            builder.add_for_statuses(
                role,
                &ACTIVE,
                event,
                Transition::end(reason, vec![Action::CloseTransport]),
            );
        }

        // A peer hanging up closes the channel right behind its notice, and
        // the two can arrive in either order. Wait for the notice first.
        builder.add_for_statuses(
            role,
            &ACTIVE,
            EventKind::ChannelClosed,
            Transition::stay(vec![Action::CloseTransport, Action::ArmCloseGrace]),
        );

        // Transport loss: report the duration once the call was up
        for (event, reason) in [
            (EventKind::TransportLost, TerminationReason::TransportClosed),
            (EventKind::ChannelError, TerminationReason::TransportError),
        ] {
            builder.add_transition(
                role,
                CallStatus::Ringing,
                event,
                Transition::end(reason, vec![Action::CloseTransport]),
            );
            builder.add_transition(
                role,
                CallStatus::Connected,
                event,
                Transition::end(reason, vec![Action::SendEndCall, Action::CloseTransport]),
            );
        }

        // A second caller while busy
        builder.add_for_statuses(
            role,
            &ACTIVE,
            EventKind::IncomingCall,
            Transition::stay(vec![Action::RejectBusy]),
        );

        builder.add_for_statuses(
            role,
            &ACTIVE,
            EventKind::ToggleMute,
            Transition::stay(vec![Action::ToggleMute]).guarded(Guard::HasLocalCapture),
        );
    }
}

use super::context::ActionContext;
use crate::session_store::SessionState;
use crate::state_table::Guard;

/// Check a transition guard against the current session
pub fn check_guard(guard: Guard, session: Option<&SessionState>, ctx: &ActionContext) -> bool {
    let Some(session) = session else {
        return false;
    };

    match guard {
        Guard::HasLocalCapture => session.resources.capture.is_some(),
        Guard::OfferFromRemote => ctx
            .channel
            .as_ref()
            .map(|offer| offer.handle.peer() == &session.remote_user)
            .unwrap_or(false),
        Guard::RemoteStreamNotAttached => !session.remote_stream_attached(),
        Guard::NoChannel => session.resources.channel.is_none(),
    }
}

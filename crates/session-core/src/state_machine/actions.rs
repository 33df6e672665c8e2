use chrono::Utc;
use tracing::{debug, info};

use super::context::ActionContext;
use super::events::{CommandOutcome, MachineInput, SessionEvent};
use super::executor::SessionMachine;
use crate::api::CallEvent;
use crate::config::BusyPolicy;
use crate::errors::{CallError, Result};
use crate::session_store::SessionState;
use crate::signaling::{Envelope, SignalingMessage};
use crate::state_table::{Action, Role, ToneCue};
use crate::timer::TimerKind;
use crate::types::{duration_since, CallId};

impl SessionMachine {
    /// Execute an action from the state table
    ///
    /// Returns the command outcome when the action produces one.
    pub(super) fn execute_action(
        &mut self,
        action: Action,
        ctx: &mut ActionContext,
    ) -> Result<Option<CommandOutcome>> {
        debug!("Executing action: {:?}", action);

        match action {
            // Session lifecycle
            Action::CreateOutgoingSession => {
                let (target, kind) = ctx
                    .target
                    .take()
                    .ok_or_else(|| CallError::internal("start call without a target"))?;
                let call_id = CallId::new();
                info!("Calling {} ({}) as call {}", target, kind, call_id);
                self.session = Some(SessionState::outgoing(
                    call_id.clone(),
                    self.local_user.clone(),
                    target,
                    kind,
                ));
                return Ok(Some(CommandOutcome::Started(call_id)));
            }
            Action::CreateIncomingSession => {
                let (from, call_id, kind) = ctx
                    .incoming
                    .take()
                    .ok_or_else(|| CallError::internal("incoming call without a caller"))?;
                info!("Incoming {} call {} from {}", kind, call_id, from);
                self.session = Some(SessionState::incoming(
                    call_id.clone(),
                    self.local_user.clone(),
                    from.clone(),
                    kind,
                ));
                self.emit(CallEvent::IncomingCall {
                    call_id,
                    from,
                    media_kind: kind,
                });
            }
            Action::MarkConnected => {
                let session = self.session_mut()?;
                session.started_at = Some(Utc::now());
            }

            // Media
            Action::AcquireCapture => {
                let kind = self.session_ref()?.media_kind;
                self.adapters
                    .media
                    .spawn_acquire(kind, self.generation, self.input.clone());
            }
            Action::AttachCapture => {
                let stream = ctx
                    .capture
                    .take()
                    .ok_or_else(|| CallError::internal("no capture stream to attach"))?;
                let session = self.session_mut()?;
                debug!("Attached capture {} to call {}", stream.id(), session.call_id);
                if let Some(previous) = session.resources.capture.replace(stream) {
                    self.adapters.media.release(&previous);
                }
            }
            Action::AttachRemoteStream => {
                let stream = ctx
                    .remote_stream
                    .take()
                    .ok_or_else(|| CallError::internal("no remote stream to attach"))?;
                let call_id = self.session_ref()?.call_id.clone();
                self.adapters.media.attach_remote(&call_id, &stream);
                let stream_id = stream.id.clone();
                self.session_mut()?.resources.remote_stream = Some(stream);
                self.emit(CallEvent::RemoteStreamAttached { call_id, stream_id });
            }
            Action::ToggleMute => {
                let session = self.session.as_mut().ok_or_else(|| CallError::internal("no session"))?;
                let stream = session
                    .resources
                    .capture
                    .as_ref()
                    .ok_or_else(|| CallError::internal("no capture stream to mute"))?;
                let muted = self.adapters.media.toggle_mute(stream);
                session.muted = muted;
                let call_id = session.call_id.clone();
                info!("Call {} {}", call_id, if muted { "muted" } else { "unmuted" });
                self.emit(CallEvent::MuteChanged { call_id, muted });
                return Ok(Some(CommandOutcome::Muted(muted)));
            }
            Action::ResumeAudioOutput => self.resume_output(),

            // Transport
            Action::PlaceTransportCall => {
                let session = self.session_ref()?;
                let stream = session
                    .resources
                    .capture
                    .clone()
                    .ok_or_else(|| CallError::internal("placing a call without capture"))?;
                let target = session.remote_user.clone();
                self.adapters
                    .transport
                    .spawn_place(target, stream, self.generation, self.input.clone());
            }
            Action::AdoptChannel => {
                let channel = ctx
                    .channel
                    .take()
                    .ok_or_else(|| CallError::internal("no channel to adopt"))?;
                let handle = self.adapters.transport.adopt(channel, self.input.clone());
                let session = self.session_mut()?;
                debug!("Call {} owns channel {}", session.call_id, handle.id());
                if let Some(previous) = session.resources.channel.replace(handle) {
                    self.adapters.transport.close(&previous);
                }
            }
            Action::AnswerTransport => {
                let session = self.session_ref()?;
                match (&session.resources.channel, &session.resources.capture) {
                    (Some(channel), Some(stream)) => {
                        self.adapters.transport.spawn_answer(
                            channel.clone(),
                            stream.clone(),
                            self.generation,
                            self.input.clone(),
                        );
                    }
                    (None, _) => debug!("Call {}: answer deferred until the offer arrives", session.call_id),
                    (_, None) => debug!("Call {}: answer deferred until capture resolves", session.call_id),
                }
            }
            Action::StashOffer => {
                let offer = ctx
                    .channel
                    .take()
                    .ok_or_else(|| CallError::internal("no offer to stash"))?;
                debug!("Holding offer {} from {}", offer.id(), offer.handle.peer());
                if let Some(previous) = self.pending_offer.replace(offer) {
                    self.adapters.transport.close(&previous.handle);
                }
            }
            Action::AdoptPendingOffer => {
                let Some(offer) = self.pending_offer.take() else {
                    return Ok(None);
                };
                let remote = self.session_ref()?.remote_user.clone();
                if offer.handle.peer() == &remote {
                    ctx.channel = Some(offer);
                    return self.execute_action(Action::AdoptChannel, ctx);
                }
                debug!("Closing held offer from {}; call is from {}", offer.handle.peer(), remote);
                self.adapters.transport.close(&offer.handle);
            }
            Action::DiscardPendingOffer => {
                if let Some(offer) = self.pending_offer.take() {
                    self.adapters.transport.close(&offer.handle);
                }
            }
            Action::CloseTransport => {
                let session = self.session_mut()?;
                if let Some(channel) = session.resources.channel.take() {
                    self.adapters.transport.close(&channel);
                }
            }

            // Signaling
            Action::SendCallUser => {
                let session = self.session_mut()?;
                session.call_user_sent = true;
                let message = SignalingMessage::CallUser {
                    envelope: envelope(session),
                    call_type: session.media_kind,
                };
                self.adapters.signaling.send(message);
            }
            Action::SendAcceptCall => {
                let message = SignalingMessage::AcceptCall(envelope(self.session_ref()?));
                self.adapters.signaling.send(message);
            }
            Action::SendDeclineCall => {
                let message = SignalingMessage::DeclineCall(envelope(self.session_ref()?));
                self.send_final(message)?;
            }
            Action::SendMissedCall => {
                let session = self.session_ref()?;
                if session.call_user_sent {
                    let message = SignalingMessage::MissedCall(envelope(session));
                    self.send_final(message)?;
                }
            }
            Action::SendEndCall => {
                let session = self.session_ref()?;
                // The callee never heard of a call whose call-user was not sent
                if session.role == Role::Caller && !session.call_user_sent {
                    return Ok(None);
                }
                let message = SignalingMessage::EndCall {
                    envelope: envelope(session),
                    duration: duration_since(session.started_at, Utc::now()),
                };
                self.send_final(message)?;
            }
            Action::RejectBusy => {
                let (from, call_id, _) = ctx
                    .incoming
                    .take()
                    .ok_or_else(|| CallError::internal("busy reject without a caller"))?;
                if self.config.busy_policy == BusyPolicy::Ignore {
                    debug!("Busy: ignoring call {} from {}", call_id, from);
                    return Ok(None);
                }
                info!("Busy: declining call {} from {}", call_id, from);
                let message = SignalingMessage::DeclineCall(Envelope::new(
                    self.local_user.clone(),
                    from.clone(),
                    call_id.clone(),
                ));
                self.adapters.signaling.send(message);
                self.emit(CallEvent::BusyRejected { call_id, from });
            }

            // Tones and timers
            Action::StartTone(cue) => {
                let tone = match cue {
                    ToneCue::Outgoing => self.config.outgoing_tone.clone(),
                    ToneCue::Incoming => self.config.incoming_tone.clone(),
                };
                self.adapters
                    .tones
                    .spawn_start(tone, self.generation, self.input.clone());
            }
            Action::StopTones => {
                let session = self.session_mut()?;
                session.tones_silenced = true;
                for tone in std::mem::take(&mut session.resources.tones) {
                    self.adapters.tones.stop(tone);
                }
            }
            Action::ArmRingTimer => {
                let call_id = self.session_ref()?.call_id.clone();
                let input = self.input.clone();
                let generation = self.generation;
                self.timers.arm(call_id, TimerKind::Ring, self.config.ring_timeout(), move || {
                    let _ = input.send(MachineInput::notify(SessionEvent::RingTimeout { generation }));
                });
            }
            Action::CancelRingTimer => {
                let call_id = &self.session_ref()?.call_id;
                self.timers.cancel(call_id, TimerKind::Ring);
            }
            Action::ArmCloseGrace => {
                let call_id = self.session_ref()?.call_id.clone();
                debug!("Call {}: channel closed, waiting for the peer's notice", call_id);
                let input = self.input.clone();
                let generation = self.generation;
                self.timers.arm(call_id, TimerKind::CloseGrace, self.config.close_grace(), move || {
                    let _ = input.send(MachineInput::notify(SessionEvent::CloseGraceElapsed { generation }));
                });
            }
        }

        Ok(None)
    }

    /// Send a notice that ends the call for the peer. The session's channel
    /// goes with it and is closed by the signaling pump once the notice is out.
    fn send_final(&mut self, message: SignalingMessage) -> Result<()> {
        let channel = self.session_mut()?.resources.channel.take();
        self.adapters.signaling.send_then_close(message, channel);
        Ok(())
    }

    fn session_ref(&self) -> Result<&SessionState> {
        self.session
            .as_ref()
            .ok_or_else(|| CallError::internal("no active session"))
    }

    fn session_mut(&mut self) -> Result<&mut SessionState> {
        self.session
            .as_mut()
            .ok_or_else(|| CallError::internal("no active session"))
    }
}

fn envelope(session: &SessionState) -> Envelope {
    Envelope::new(
        session.local_user.clone(),
        session.remote_user.clone(),
        session.call_id.clone(),
    )
}

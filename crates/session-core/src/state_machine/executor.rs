//! Session state machine executor
//!
//! Owns the single session of one local user. Every input is handled to
//! completion before the next one is read, so transitions never interleave.
//! Work that suspends (capture, placement, answer, tones) is spawned by the
//! adapters and re-enters through the input queue tagged with the generation
//! that started it; cleanup bumps the generation so late completions are
//! released instead of applied.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::context::ActionContext;
use super::events::{CommandOutcome, EventKind, InputReceiver, InputSender, MachineInput, SessionEvent};
use super::guards::check_guard;
use crate::adapters::{MediaAdapter, PeerChannel, SignalingAdapter, ToneAdapter, ToneError, ToneHandle, TransportAdapter};
use crate::api::CallEvent;
use crate::config::CallSessionConfig;
use crate::errors::{CallError, Result};
use crate::session_store::SessionState;
use crate::state_table::{MasterStateTable, Role, StateKey, Transition, MASTER_TABLE};
use crate::timer::TimerService;
use crate::types::{CallStatus, SessionSnapshot, TerminationReason, UserId};

/// Collaborator adapters used by the machine
#[derive(Clone)]
pub struct MachineAdapters {
    pub signaling: SignalingAdapter,
    pub media: MediaAdapter,
    pub transport: TransportAdapter,
    pub tones: ToneAdapter,
}

/// The per-user session state machine
pub struct SessionMachine {
    pub(super) local_user: UserId,
    pub(super) config: CallSessionConfig,
    pub(super) session: Option<SessionState>,
    /// Bumped on every cleanup; completions from older generations are stale
    pub(super) generation: u64,
    /// Inbound offer received while idle, waiting for its notice
    pub(super) pending_offer: Option<PeerChannel>,
    pub(super) output_unlocked: bool,
    pub(super) adapters: MachineAdapters,
    pub(super) timers: TimerService,
    pub(super) input: InputSender,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<CallEvent>,
    table: Arc<MasterStateTable>,
}

impl SessionMachine {
    pub fn new(
        local_user: UserId,
        config: CallSessionConfig,
        adapters: MachineAdapters,
        timers: TimerService,
        input: InputSender,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        events_tx: broadcast::Sender<CallEvent>,
    ) -> Self {
        Self {
            local_user,
            config,
            session: None,
            generation: 0,
            pending_offer: None,
            output_unlocked: false,
            adapters,
            timers,
            input,
            snapshot_tx,
            events_tx,
            table: MASTER_TABLE.clone(),
        }
    }

    /// Process inputs until a `Shutdown` has been handled
    pub async fn run(mut self, mut rx: InputReceiver) {
        info!("Call session started for {}", self.local_user);

        while let Some(input) = rx.recv().await {
            let stop = matches!(input.event, SessionEvent::Shutdown);
            self.handle(input);
            if stop {
                break;
            }
        }

        // Completions already queued would be dropped with the receiver
        rx.close();
        while let Ok(input) = rx.try_recv() {
            if let Some(reply) = input.reply {
                let _ = reply.send(Err(CallError::Shutdown));
            }
            self.release_context(ActionContext::from_event(input.event));
        }

        if let Some(offer) = self.pending_offer.take() {
            self.adapters.transport.close(&offer.handle);
        }
        info!("Call session stopped for {}", self.local_user);
    }

    /// Handle one input to completion
    pub fn handle(&mut self, input: MachineInput) {
        let MachineInput { event, reply } = input;
        let outcome = self.dispatch(event);

        if let Err(e) = &outcome {
            debug!("Command rejected: {}", e);
        }
        self.publish_snapshot();

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        match &self.session {
            Some(session) => session.snapshot(),
            None => SessionSnapshot::idle(self.local_user.clone()),
        }
    }

    fn status(&self) -> CallStatus {
        self.session.as_ref().map(|s| s.status).unwrap_or(CallStatus::Idle)
    }

    fn role(&self) -> Role {
        self.session.as_ref().map(|s| s.role).unwrap_or(Role::Unassigned)
    }

    fn dispatch(&mut self, event: SessionEvent) -> Result<CommandOutcome> {
        match event {
            SessionEvent::UnlockAudio => {
                self.resume_output();
                return Ok(CommandOutcome::Done);
            }
            SessionEvent::ToneStarted { generation, result } => {
                self.on_tone_started(generation, result);
                return Ok(CommandOutcome::Done);
            }
            _ => {}
        }

        if let Some(generation) = event.generation() {
            if generation != self.generation {
                debug!(
                    "Discarding {:?} from generation {} (current {})",
                    event.kind(),
                    generation,
                    self.generation
                );
                self.release_context(ActionContext::from_event(event));
                return Ok(CommandOutcome::Done);
            }
        }

        if let Some(call_id) = event.signaled_call_id() {
            let current = self.session.as_ref().map(|s| &s.call_id);
            if current != Some(call_id) {
                debug!("{}", CallError::StaleMessage { call_id: call_id.to_string() });
                return Ok(CommandOutcome::Done);
            }
        }

        if let SessionEvent::IncomingCall { call_id, from, .. } = &event {
            if self.session.as_ref().map(|s| &s.call_id) == Some(call_id) {
                debug!("Ignoring duplicate incoming call {} from {}", call_id, from);
                return Ok(CommandOutcome::Done);
            }
        }

        if let Some(channel) = event.channel() {
            let owned = self
                .session
                .as_ref()
                .and_then(|s| s.resources.channel.as_ref())
                .map(|c| c.id());
            if owned != Some(channel) {
                debug!("Discarding event from channel {} not owned by the session", channel);
                return Ok(CommandOutcome::Done);
            }
        }

        let Some(kind) = event.kind() else {
            return Ok(CommandOutcome::Done);
        };
        let key = StateKey::new(self.role(), self.status(), kind);

        let Some(transition) = self.table.get(&key).cloned() else {
            return self.unhandled(event, kind);
        };

        let mut ctx = ActionContext::from_event(event);
        if let Some(guard) = transition
            .guards
            .iter()
            .find(|guard| !check_guard(**guard, self.session.as_ref(), &ctx))
        {
            debug!("Guard {:?} failed for {:?}", guard, key);
            self.release_context(ctx);
            return Ok(self.declined_outcome(kind));
        }

        debug!("Transition {:?} -> {:?}", key, transition.next_status);
        let outcome = self.apply(&transition, kind, &mut ctx);
        self.release_context(ctx);
        outcome
    }

    fn apply(&mut self, transition: &Transition, kind: EventKind, ctx: &mut ActionContext) -> Result<CommandOutcome> {
        let mut outcome = CommandOutcome::Done;

        for action in &transition.actions {
            match self.execute_action(*action, ctx) {
                Ok(Some(result)) => outcome = result,
                Ok(None) => {}
                Err(e) => error!("Action {:?} failed on {:?}: {}", action, kind, e),
            }
        }

        match transition.next_status {
            Some(CallStatus::Ended) => {
                let reason = transition.reason.unwrap_or(TerminationReason::LocalHangup);
                self.end_session(reason, ctx.failure.take());
            }
            Some(next) => self.set_status(next),
            None => {}
        }

        Ok(outcome)
    }

    /// Outcome for an event with no transition from the current state
    fn unhandled(&mut self, event: SessionEvent, kind: EventKind) -> Result<CommandOutcome> {
        let status = self.status();
        let command = event.command_name();
        self.release_context(ActionContext::from_event(event));

        match kind {
            EventKind::StartCall if status.is_active() => Err(CallError::SessionBusy {
                call_id: self
                    .session
                    .as_ref()
                    .map(|s| s.call_id.to_string())
                    .unwrap_or_default(),
                status,
            }),
            EventKind::ToggleMute | EventKind::Shutdown => Ok(self.declined_outcome(kind)),
            EventKind::StartCall | EventKind::AcceptCall | EventKind::DeclineCall | EventKind::EndCall => {
                Err(CallError::invalid_state(command, status))
            }
            _ => {
                debug!("No transition for {:?} while {:?} {}", kind, self.role(), status);
                Ok(CommandOutcome::Done)
            }
        }
    }

    fn declined_outcome(&self, kind: EventKind) -> CommandOutcome {
        match kind {
            EventKind::ToggleMute => {
                CommandOutcome::Muted(self.session.as_ref().map(|s| s.muted).unwrap_or(false))
            }
            _ => CommandOutcome::Done,
        }
    }

    fn set_status(&mut self, next: CallStatus) {
        let Some(session) = self.session.as_mut() else {
            warn!("Status change to {} without a session", next);
            return;
        };
        if session.status == next {
            return;
        }

        let from = session.status;
        session.status = next;
        info!("Call {} {} -> {}", session.call_id, from, next);
        let call_id = Some(session.call_id.clone());
        self.emit(CallEvent::StatusChanged { call_id, from, to: next });
    }

    /// Enter `Ended`, run cleanup, report the call and return to `Idle`
    fn end_session(&mut self, reason: TerminationReason, failure: Option<CallError>) {
        if self.session.is_none() {
            debug!("End requested with no session ({:?})", reason);
            return;
        }

        self.set_status(CallStatus::Ended);
        self.publish_snapshot();
        self.cleanup();

        let Some(session) = self.session.take() else {
            return;
        };
        let record = session.record(chrono::Utc::now(), reason);
        info!(
            "Call {} ended ({:?}, {}s)",
            record.call_id, record.reason, record.duration_secs
        );

        if reason.is_failure() {
            let error = failure
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("{:?}", reason));
            warn!("Call {} failed: {}", session.call_id, error);
            self.emit(CallEvent::CallFailed {
                call_id: session.call_id.clone(),
                error,
            });
        }
        self.emit(CallEvent::CallEnded(record));
        self.emit(CallEvent::StatusChanged {
            call_id: Some(session.call_id),
            from: CallStatus::Ended,
            to: CallStatus::Idle,
        });
    }

    /// Release everything the session holds. Safe to call repeatedly
    pub(super) fn cleanup(&mut self) {
        self.generation += 1;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        self.timers.cancel_all(&session.call_id);

        let released = session.resources.take_all();
        if released.is_empty() {
            debug!("Cleanup for call {}: nothing left to release", session.call_id);
            return;
        }

        for tone in released.tones {
            self.adapters.tones.stop(tone);
        }
        if let Some(stream) = released.capture {
            self.adapters.media.release(&stream);
        }
        if let Some(channel) = released.channel {
            self.adapters.transport.close(&channel);
        }
        if released.remote_stream.is_some() {
            self.adapters.media.detach_remote(&session.call_id);
        }
        info!("Cleaned up call {}", session.call_id);
    }

    /// Release resources an event brought in that no session took
    fn release_context(&self, ctx: ActionContext) {
        if !ctx.holds_resources() {
            return;
        }
        if let Some(stream) = ctx.capture {
            debug!("Releasing unclaimed capture stream {}", stream.id());
            self.adapters.media.release(&stream);
        }
        if let Some(channel) = ctx.channel {
            debug!("Closing unclaimed channel {}", channel.id());
            self.adapters.transport.close(&channel.handle);
        }
    }

    fn on_tone_started(&mut self, generation: u64, result: std::result::Result<ToneHandle, ToneError>) {
        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                warn!("{}", CallError::Tone(e));
                return;
            }
        };

        let current = generation == self.generation;
        match self.session.as_mut() {
            Some(session) if current && session.status == CallStatus::Ringing && !session.tones_silenced => {
                session.resources.tones.push(handle);
            }
            _ => self.adapters.tones.stop(handle),
        }
    }

    pub(super) fn resume_output(&mut self) {
        if self.output_unlocked {
            return;
        }
        self.output_unlocked = true;
        debug!("Resuming audio output");
        self.adapters.tones.spawn_resume_output();
    }

    pub(super) fn emit(&self, event: CallEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }
}

//! The per-user call session handle

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info_span, Instrument};

use crate::adapters::{
    MediaAdapter, MediaEndpoint, PeerTransport, SignalingAdapter, SignalingGateway, ToneAdapter,
    ToneService, TransportAdapter,
};
use crate::config::CallSessionConfig;
use crate::errors::{CallError, Result};
use crate::state_machine::{CommandOutcome, InputSender, MachineAdapters, MachineInput, SessionEvent, SessionMachine};
use crate::timer::TimerService;
use crate::types::{CallId, MediaKind, SessionSnapshot, UserId};

use super::events::CallEvent;

/// The four external collaborators a session talks to
#[derive(Clone)]
pub struct Collaborators {
    pub signaling: Arc<dyn SignalingGateway>,
    pub media: Arc<dyn MediaEndpoint>,
    pub transport: Arc<dyn PeerTransport>,
    pub tones: Arc<dyn ToneService>,
}

/// Handle to one user's call session
///
/// Cheap to clone; every clone drives the same serialized state machine.
#[derive(Clone)]
pub struct CallSession {
    local_user: UserId,
    input: InputSender,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    events_tx: broadcast::Sender<CallEvent>,
    timers: TimerService,
}

impl CallSession {
    /// Start the session's event loop and collaborator pumps
    pub fn spawn(
        local_user: UserId,
        collaborators: Collaborators,
        config: CallSessionConfig,
    ) -> Result<Self> {
        if local_user.is_empty() {
            return Err(CallError::invalid_target(local_user.to_string()));
        }
        config.validate()?;

        let (input, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::idle(local_user.clone()));
        let (events_tx, _) = broadcast::channel(config.event_broadcast_capacity);
        let timers = TimerService::new();

        let signaling = SignalingAdapter::start(collaborators.signaling, &local_user, input.clone())?;
        let transport = TransportAdapter::new(collaborators.transport);
        transport.spawn_inbound_pump(input.clone());

        let adapters = MachineAdapters {
            signaling,
            media: MediaAdapter::new(collaborators.media),
            transport,
            tones: ToneAdapter::new(collaborators.tones),
        };

        let machine = SessionMachine::new(
            local_user.clone(),
            config,
            adapters,
            timers.clone(),
            input.clone(),
            snapshot_tx,
            events_tx.clone(),
        );
        let span = info_span!("call_session", user = %local_user);
        tokio::spawn(machine.run(rx).instrument(span));

        Ok(Self {
            local_user,
            input,
            snapshot_rx,
            events_tx,
            timers,
        })
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Call `target`; resolves once the session is `Ringing`
    pub async fn start_call(&self, target: impl Into<UserId>, kind: MediaKind) -> Result<CallId> {
        let target = target.into();
        if target.is_empty() || target == self.local_user {
            return Err(CallError::invalid_target(target.to_string()));
        }

        match self.command(SessionEvent::StartCall { target, kind }).await? {
            CommandOutcome::Started(call_id) => Ok(call_id),
            other => Err(CallError::internal(format!("unexpected outcome {:?}", other))),
        }
    }

    pub async fn accept_call(&self) -> Result<()> {
        self.command(SessionEvent::AcceptCall).await.map(|_| ())
    }

    pub async fn decline_call(&self) -> Result<()> {
        self.command(SessionEvent::DeclineCall).await.map(|_| ())
    }

    pub async fn end_call(&self) -> Result<()> {
        self.command(SessionEvent::EndCall).await.map(|_| ())
    }

    /// Flip the local audio track; returns the new muted flag
    pub async fn toggle_mute(&self) -> Result<bool> {
        match self.command(SessionEvent::ToggleMute).await? {
            CommandOutcome::Muted(muted) => Ok(muted),
            _ => Ok(self.snapshot().muted),
        }
    }

    /// First user gesture: resume audio output. Idempotent
    pub async fn unlock_audio(&self) -> Result<()> {
        self.command(SessionEvent::UnlockAudio).await.map(|_| ())
    }

    /// End any active call and stop the event loop
    pub async fn shutdown(&self) -> Result<()> {
        match self.command(SessionEvent::Shutdown).await {
            Ok(_) | Err(CallError::Shutdown) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events_tx.subscribe()
    }

    /// Number of ring timers currently armed
    pub fn armed_timers(&self) -> usize {
        self.timers.armed_count()
    }

    pub fn is_running(&self) -> bool {
        !self.input.is_closed()
    }

    async fn command(&self, event: SessionEvent) -> Result<CommandOutcome> {
        debug!("Command {} for {}", event.command_name(), self.local_user);
        let (input, reply) = MachineInput::command(event);
        self.input.send(input).map_err(|_| CallError::Shutdown)?;
        reply.await.map_err(|_| CallError::Shutdown)?
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("local_user", &self.local_user)
            .field("status", &self.snapshot_rx.borrow().status)
            .finish()
    }
}

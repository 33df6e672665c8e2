//! Shared helpers for session integration tests

#![allow(dead_code)]

use std::time::Duration;

use rtcall_session_core::loopback::{LoopbackEndpoint, LoopbackHub};
use rtcall_session_core::{
    CallEvent, CallSession, CallSessionConfig, CallStatus, MediaKind, SessionSnapshot, TerminationReason,
};
use tokio::sync::broadcast;

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// A logged-in user: its loopback collaborators, session and event feed
pub struct Peer {
    pub endpoint: LoopbackEndpoint,
    pub session: CallSession,
    pub events: broadcast::Receiver<CallEvent>,
}

/// Configuration with a ring timeout long enough not to interfere
pub fn test_config() -> CallSessionConfig {
    CallSessionConfig::default()
        .with_ring_timeout(Duration::from_secs(10))
        .with_close_grace(Duration::from_millis(200))
        .with_event_broadcast_capacity(256)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rtcall_session_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn peer(hub: &LoopbackHub, name: &str, config: CallSessionConfig) -> Peer {
    let endpoint = hub.endpoint(name);
    let session = CallSession::spawn(endpoint.user.clone(), endpoint.collaborators(), config)
        .expect("session should spawn");
    let events = session.subscribe();
    Peer {
        endpoint,
        session,
        events,
    }
}

/// Wait until the session's snapshot satisfies `predicate`
pub async fn wait_until<F>(session: &CallSession, predicate: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    let mut rx = session.watch();
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("{} timed out, last snapshot {:?}", session.local_user(), session.snapshot()))
        .expect("session stopped");
    snapshot.clone()
}

pub async fn wait_for_status(session: &CallSession, status: CallStatus) -> SessionSnapshot {
    wait_until(session, |snapshot| snapshot.status == status).await
}

/// Receive events until one matches `predicate`
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<CallEvent>, mut predicate: F) -> CallEvent
where
    F: FnMut(&CallEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Everything already queued on the feed
pub fn drain(events: &mut broadcast::Receiver<CallEvent>) -> Vec<CallEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return drained,
        }
    }
}

pub fn count_ended(events: &[CallEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, CallEvent::CallEnded(_)))
        .count()
}

/// Termination reasons of every `CallEnded` in `events`
pub fn ended_reasons(events: &[CallEvent]) -> Vec<TerminationReason> {
    events
        .iter()
        .filter_map(|event| match event {
            CallEvent::CallEnded(record) => Some(record.reason),
            _ => None,
        })
        .collect()
}

/// Poll `check` until it holds
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

/// `caller` calls `callee`, who answers; returns once both are connected
pub async fn connect(caller: &Peer, callee: &Peer, kind: MediaKind) {
    caller
        .session
        .start_call(callee.endpoint.user.clone(), kind)
        .await
        .expect("start_call");
    wait_for_status(&callee.session, CallStatus::Ringing).await;
    callee.session.accept_call().await.expect("accept_call");
    wait_until(&caller.session, |s| s.status == CallStatus::Connected && s.remote_stream_attached).await;
    wait_until(&callee.session, |s| s.remote_stream_attached).await;
}

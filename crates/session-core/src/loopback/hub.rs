//! In-memory signaling relay and peer transport switch
//!
//! Every registered user gets a mailbox for signaling notices and an offer
//! queue for inbound transport calls. Outbound notices go through the wire
//! codec and are renamed the way a relay forwards them (`call-user` arrives
//! as `incoming-call`, `accept-call` as `call-accepted`, and so on).

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use super::media::LoopbackMedia;
use super::tones::LoopbackTones;
use crate::adapters::{
    ChannelEvent, ChannelHandle, ChannelId, LocalStream, PeerChannel, PeerTransport, RemoteStream,
    SignalingError, SignalingGateway, TransportError,
};
use crate::api::Collaborators;
use crate::signaling::{event_names, Envelope, SignalingMessage};
use crate::types::{CallId, UserId};

/// A notice as it crossed the relay
#[derive(Debug, Clone, PartialEq)]
pub struct RelayedMessage {
    pub from: UserId,
    pub to: UserId,
    /// Event name as sent
    pub event: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
struct HubInner {
    mailboxes: DashMap<UserId, mpsc::UnboundedSender<SignalingMessage>>,
    offers: DashMap<UserId, mpsc::UnboundedSender<PeerChannel>>,
    relayed: Mutex<Vec<RelayedMessage>>,
    /// Calls placed through the switch, by caller and callee
    links: Mutex<Vec<(UserId, UserId, Weak<Link>)>>,
    next_channel: AtomicU64,
}

/// Relay and transport switch shared by all loopback endpoints
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

/// Everything one user needs to run a session against the hub
#[derive(Debug, Clone)]
pub struct LoopbackEndpoint {
    pub user: UserId,
    pub signaling: Arc<LoopbackSignaling>,
    pub transport: Arc<LoopbackTransport>,
    pub media: LoopbackMedia,
    pub tones: LoopbackTones,
}

impl LoopbackEndpoint {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            signaling: self.signaling.clone(),
            media: Arc::new(self.media.clone()),
            transport: self.transport.clone(),
            tones: Arc::new(self.tones.clone()),
        }
    }
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user` and build its collaborators
    pub fn endpoint(&self, user: impl Into<UserId>) -> LoopbackEndpoint {
        let user = user.into();
        LoopbackEndpoint {
            signaling: Arc::new(LoopbackSignaling { hub: self.clone() }),
            transport: Arc::new(self.transport(user.clone())),
            media: LoopbackMedia::new(user.to_string()),
            tones: LoopbackTones::new(),
            user,
        }
    }

    fn transport(&self, user: UserId) -> LoopbackTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.offers.insert(user.clone(), tx);
        LoopbackTransport {
            hub: self.clone(),
            user,
            incoming: Mutex::new(Some(rx)),
        }
    }

    /// Notices sent through the relay so far
    pub fn relayed(&self) -> Vec<RelayedMessage> {
        self.inner.relayed.lock().clone()
    }

    /// Event names sent by `user`, in order
    pub fn events_from(&self, user: &UserId) -> Vec<String> {
        self.inner
            .relayed
            .lock()
            .iter()
            .filter(|m| &m.from == user)
            .map(|m| m.event.clone())
            .collect()
    }

    /// Force-terminate a call, as the relay does when a user disconnects
    pub fn stop_call(&self, to: &UserId, call_id: &CallId) -> bool {
        let envelope = Envelope::new(UserId::default(), to.clone(), call_id.clone());
        self.deliver(SignalingMessage::CallStopped(envelope))
    }

    /// Inject a raw `(event, payload)` pair addressed to `to`
    pub fn inject(&self, to: &UserId, event: &str, payload: Value) -> Result<(), SignalingError> {
        let message = SignalingMessage::decode(event, payload)?;
        let mailbox = self
            .inner
            .mailboxes
            .get(to)
            .ok_or_else(|| SignalingError::Unavailable(format!("{} is offline", to)))?;
        mailbox
            .send(message)
            .map_err(|_| SignalingError::Unavailable(format!("{} is offline", to)))
    }

    /// Report a transport failure on every open channel end held by `user`.
    /// Returns how many channels were failed
    pub fn fail_channel(&self, user: &UserId, message: &str) -> usize {
        let mut links = self.inner.links.lock();
        links.retain(|(_, _, link)| link.upgrade().is_some_and(|link| !link.closed.load(Ordering::SeqCst)));

        let mut failed = 0;
        for (caller, callee, link) in links.iter() {
            let Some(link) = link.upgrade() else {
                continue;
            };
            for (end, side) in [(caller, Side::Caller), (callee, Side::Callee)] {
                if end == user && link.events_for(side).send(ChannelEvent::Error(message.to_string())).is_ok() {
                    debug!("Failed {:?} end of a call for {}: {}", side, user, message);
                    failed += 1;
                }
            }
        }
        failed
    }

    fn deliver(&self, message: SignalingMessage) -> bool {
        let to = message.envelope().to.clone();
        match self.inner.mailboxes.get(&to) {
            Some(mailbox) => mailbox.send(message).is_ok(),
            None => {
                debug!("No mailbox for {}, dropping {}", to, message.event_name());
                false
            }
        }
    }

    fn next_channel_id(&self) -> ChannelId {
        ChannelId(self.inner.next_channel.fetch_add(1, Ordering::SeqCst))
    }
}

/// Name a relay forwards an outbound event under
fn relay_name(event: &str) -> &str {
    match event {
        event_names::CALL_USER => event_names::INCOMING_CALL,
        event_names::ACCEPT_CALL => event_names::CALL_ACCEPTED,
        event_names::DECLINE_CALL => event_names::CALL_DECLINED,
        event_names::END_CALL => event_names::CALL_ENDED,
        other => other,
    }
}

/// Signaling gateway backed by the hub
#[derive(Debug)]
pub struct LoopbackSignaling {
    hub: LoopbackHub,
}

#[async_trait]
impl SignalingGateway for LoopbackSignaling {
    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError> {
        let (event, payload) = message.encode()?;
        let envelope = message.envelope();
        self.hub.inner.relayed.lock().push(RelayedMessage {
            from: envelope.from.clone(),
            to: envelope.to.clone(),
            event: event.to_string(),
            payload: payload.clone(),
        });

        let forwarded = SignalingMessage::decode(relay_name(event), payload)?;
        self.hub.deliver(forwarded);
        Ok(())
    }

    fn subscribe(&self, user: &UserId) -> Result<mpsc::UnboundedReceiver<SignalingMessage>, SignalingError> {
        if let Some(existing) = self.hub.inner.mailboxes.get(user) {
            if !existing.is_closed() {
                return Err(SignalingError::AlreadySubscribed(user.clone()));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub.inner.mailboxes.insert(user.clone(), tx);
        Ok(rx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Caller,
    Callee,
}

/// Shared state of one call between two channel ends
#[derive(Debug)]
struct Link {
    closed: AtomicBool,
    caller_events: mpsc::UnboundedSender<ChannelEvent>,
    callee_events: mpsc::UnboundedSender<ChannelEvent>,
    caller_stream: RemoteStream,
}

impl Link {
    fn events_for(&self, side: Side) -> &mpsc::UnboundedSender<ChannelEvent> {
        match side {
            Side::Caller => &self.caller_events,
            Side::Callee => &self.callee_events,
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.caller_events.send(ChannelEvent::Close);
            let _ = self.callee_events.send(ChannelEvent::Close);
        }
    }
}

/// One end of a loopback call
#[derive(Debug)]
pub struct LoopbackChannel {
    id: ChannelId,
    peer: UserId,
    side: Side,
    link: Arc<Link>,
}

#[async_trait]
impl ChannelHandle for LoopbackChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn peer(&self) -> &UserId {
        &self.peer
    }

    async fn answer(&self, local: LocalStream) -> Result<(), TransportError> {
        if self.side != Side::Callee {
            return Err(TransportError::Failed("only the called side can answer".to_string()));
        }
        if self.link.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let callee_stream = RemoteStream {
            id: local.id().to_string(),
            has_video: local.kind().includes_video(),
        };
        let _ = self
            .link
            .events_for(Side::Callee)
            .send(ChannelEvent::Stream(self.link.caller_stream.clone()));
        let _ = self
            .link
            .events_for(Side::Caller)
            .send(ChannelEvent::Stream(callee_stream));
        Ok(())
    }

    fn close(&self) {
        self.link.close();
    }
}

/// Peer transport for one registered user
#[derive(Debug)]
pub struct LoopbackTransport {
    hub: LoopbackHub,
    user: UserId,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<PeerChannel>>>,
}

impl LoopbackTransport {
    pub fn user(&self) -> &UserId {
        &self.user
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn place(&self, target: &UserId, local: LocalStream) -> Result<PeerChannel, TransportError> {
        let offers = self
            .hub
            .inner
            .offers
            .get(target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::Unreachable(target.clone()))?;

        let (caller_tx, caller_rx) = mpsc::unbounded_channel();
        let (callee_tx, callee_rx) = mpsc::unbounded_channel();
        let link = Arc::new(Link {
            closed: AtomicBool::new(false),
            caller_events: caller_tx,
            callee_events: callee_tx,
            caller_stream: RemoteStream {
                id: local.id().to_string(),
                has_video: local.kind().includes_video(),
            },
        });

        let offer = PeerChannel {
            handle: Arc::new(LoopbackChannel {
                id: self.hub.next_channel_id(),
                peer: self.user.clone(),
                side: Side::Callee,
                link: link.clone(),
            }),
            events: callee_rx,
        };
        offers
            .send(offer)
            .map_err(|_| TransportError::Unreachable(target.clone()))?;
        self.hub
            .inner
            .links
            .lock()
            .push((self.user.clone(), target.clone(), Arc::downgrade(&link)));

        Ok(PeerChannel {
            handle: Arc::new(LoopbackChannel {
                id: self.hub.next_channel_id(),
                peer: target.clone(),
                side: Side::Caller,
                link,
            }),
            events: caller_rx,
        })
    }

    fn incoming(&self) -> Option<mpsc::UnboundedReceiver<PeerChannel>> {
        self.incoming.lock().take()
    }
}

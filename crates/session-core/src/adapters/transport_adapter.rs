//! Peer transport adapter
//!
//! Places and answers peer-to-peer calls and forwards channel events
//! (`stream`, `close`, `error`) into the machine tagged with the channel id,
//! so events from a channel the session no longer owns can be discarded.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::media_adapter::{LocalStream, RemoteStream};
use crate::state_machine::events::{InputSender, MachineInput, SessionEvent};
use crate::types::UserId;

/// Errors raised by the peer transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(UserId),

    #[error("transport failure: {0}")]
    Failed(String),

    #[error("channel already closed")]
    Closed,
}

/// Identifier of one transport channel
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Events reported by an open channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The peer's media stream is available
    Stream(RemoteStream),
    /// The channel closed
    Close,
    /// The channel failed
    Error(String),
}

/// Control side of a transport channel
#[async_trait]
pub trait ChannelHandle: Send + Sync + fmt::Debug {
    fn id(&self) -> ChannelId;

    /// The user at the other end
    fn peer(&self) -> &UserId;

    /// Answer an inbound offer with the local capture stream
    async fn answer(&self, local: LocalStream) -> Result<(), TransportError>;

    /// Close the channel. Must be idempotent
    fn close(&self);
}

pub type ChannelRef = Arc<dyn ChannelHandle>;

/// A channel together with its event stream
#[derive(Debug)]
pub struct PeerChannel {
    pub handle: ChannelRef,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl PeerChannel {
    pub fn id(&self) -> ChannelId {
        self.handle.id()
    }
}

/// Peer-to-peer transport owned by one local user
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Place a call to `target` offering the local stream
    async fn place(&self, target: &UserId, local: LocalStream) -> Result<PeerChannel, TransportError>;

    /// Inbound call offers. Returns `None` once taken
    fn incoming(&self) -> Option<mpsc::UnboundedReceiver<PeerChannel>>;
}

/// Adapter between the state machine and a [`PeerTransport`]
#[derive(Clone)]
pub struct TransportAdapter {
    transport: Arc<dyn PeerTransport>,
}

impl TransportAdapter {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self { transport }
    }

    /// Start placement; the result re-enters the machine tagged with `generation`
    pub fn spawn_place(&self, target: UserId, local: LocalStream, generation: u64, input: InputSender) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            debug!("Placing transport call to {} (generation {})", target, generation);
            let result = transport.place(&target, local).await;
            let resolved = MachineInput::notify(SessionEvent::PlacementResolved { generation, result });

            if let Err(rejected) = input.send(resolved) {
                if let SessionEvent::PlacementResolved { result: Ok(channel), .. } = rejected.0.event {
                    channel.handle.close();
                }
            }
        });
    }

    /// Answer an adopted inbound channel
    pub fn spawn_answer(&self, handle: ChannelRef, local: LocalStream, generation: u64, input: InputSender) {
        tokio::spawn(async move {
            debug!("Answering channel {} (generation {})", handle.id(), generation);
            let result = handle.answer(local).await;
            let _ = input.send(MachineInput::notify(SessionEvent::AnswerResolved { generation, result }));
        });
    }

    /// Take ownership of a channel: forward its events and return the handle
    pub fn adopt(&self, channel: PeerChannel, input: InputSender) -> ChannelRef {
        let PeerChannel { handle, mut events } = channel;
        let id = handle.id();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let event = match event {
                    ChannelEvent::Stream(stream) => SessionEvent::RemoteStream { channel: id, stream },
                    ChannelEvent::Close => SessionEvent::ChannelClosed { channel: id },
                    ChannelEvent::Error(message) => SessionEvent::ChannelError { channel: id, message },
                };
                if input.send(MachineInput::notify(event)).is_err() {
                    break;
                }
            }
            debug!("Channel {} event forwarder finished", id);
        });

        handle
    }

    pub fn close(&self, handle: &ChannelRef) {
        info!("Closing transport channel {}", handle.id());
        handle.close();
    }

    /// Forward inbound offers to the machine. Does nothing if already started
    pub fn spawn_inbound_pump(&self, input: InputSender) {
        let Some(mut offers) = self.transport.incoming() else {
            debug!("Inbound offers already taken");
            return;
        };

        tokio::spawn(async move {
            while let Some(channel) = offers.recv().await {
                debug!("Inbound offer {} from {}", channel.id(), channel.handle.peer());
                if let Err(rejected) = input.send(MachineInput::notify(SessionEvent::InboundOffer(channel))) {
                    if let SessionEvent::InboundOffer(channel) = rejected.0.event {
                        channel.handle.close();
                    }
                    break;
                }
            }
            debug!("Inbound transport pump finished");
        });
    }
}

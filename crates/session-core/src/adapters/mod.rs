// Adapters for the external collaborators
pub mod media_adapter;
pub mod signaling_adapter;
pub mod tone_adapter;
pub mod transport_adapter;

// Re-export adapters
pub use media_adapter::{CaptureStream, LocalStream, MediaAdapter, MediaEndpoint, MediaError, RemoteStream};
pub use signaling_adapter::{SignalingAdapter, SignalingError, SignalingGateway};
pub use tone_adapter::{ToneAdapter, ToneError, ToneHandle, ToneService};
pub use transport_adapter::{
    ChannelEvent, ChannelHandle, ChannelId, ChannelRef, PeerChannel, PeerTransport,
    TransportAdapter, TransportError,
};

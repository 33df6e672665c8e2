//! In-memory collaborators
//!
//! A complete set of signaling, transport, capture and tone implementations
//! that run inside one process. Used by the `rtcall` CLI and the tests.

pub mod hub;
pub mod media;
pub mod tones;

pub use hub::{LoopbackEndpoint, LoopbackHub, LoopbackSignaling, LoopbackTransport, RelayedMessage};
pub use media::LoopbackMedia;
pub use tones::LoopbackTones;

//! # rtcall-session-core
//!
//! Call-session coordination for one-to-one audio/video calls.
//!
//! Each logged-in user owns one [`CallSession`]: a state machine that
//! reconciles local commands, signaling notices and peer-transport events into
//! a single observable status (`Idle`, `Ringing`, `Connected`, `Ended`) and
//! releases every resource exactly once when a call ends.
//!
//! ## Architecture
//!
//! - [`state_table`] holds every legal transition as data, keyed by role,
//!   status and event.
//! - [`state_machine`] runs the serialized event loop and executes the
//!   table's actions.
//! - [`adapters`] define the contracts of the four external collaborators
//!   (signaling gateway, capture device, peer transport, tone player) and
//!   bridge their asynchronous results back into the loop.
//! - [`loopback`] implements all four collaborators in memory.

pub mod adapters;
pub mod api;
pub mod config;
pub mod errors;
pub mod loopback;
pub mod session_store;
pub mod signaling;
pub mod state_machine;
pub mod state_table;
pub mod timer;
pub mod types;

pub use api::{CallEvent, CallSession, Collaborators, SessionRegistry};
pub use config::{BusyPolicy, CallSessionConfig};
pub use errors::{CallError, Result};
pub use signaling::{Envelope, SignalingMessage};
pub use timer::{TimerKind, TimerService};
pub use types::{
    CallDirection, CallId, CallRecord, CallStatus, MediaKind, SessionSnapshot, TerminationReason, UserId,
};

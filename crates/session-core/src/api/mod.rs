//! Public API for call sessions
//!
//! A [`CallSession`] owns one user's call state machine. Commands are sent to
//! its event loop and resolve once the machine has handled them; status is
//! observed through [`CallSession::watch`] and [`CallSession::subscribe`].
//! [`SessionRegistry`] keeps one session per logged-in user.

pub mod events;
pub mod registry;
pub mod session;

pub use events::CallEvent;
pub use registry::SessionRegistry;
pub use session::{CallSession, Collaborators};

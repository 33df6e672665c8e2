pub mod actions;
pub mod context;
pub mod events;
pub mod executor;
pub mod guards;

pub use events::{CommandOutcome, EventKind, InputSender, MachineInput, SessionEvent};
pub use executor::{MachineAdapters, SessionMachine};

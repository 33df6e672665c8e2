pub mod state;

pub use state::{ReleasedResources, SessionResources, SessionState};

mod callee;
mod caller;
mod common;
mod idle;

pub use callee::add_callee_transitions;
pub use caller::add_caller_transitions;
pub use common::add_common_transitions;
pub use idle::add_idle_transitions;

use super::types::{MasterStateTable, Role, StateKey, Transition};
use crate::state_machine::events::EventKind;
use crate::types::CallStatus;

/// Assembles a [`MasterStateTable`] from per-role transition sets
#[derive(Debug, Default)]
pub struct StateTableBuilder {
    table: MasterStateTable,
}

impl StateTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transition(&mut self, role: Role, status: CallStatus, event: EventKind, transition: Transition) {
        let key = StateKey::new(role, status, event);
        if self.table.has_transition(&key) {
            tracing::warn!("Overriding transition for {:?}", key);
        }
        self.table.insert(key, transition);
    }

    /// Add the same transition for several statuses
    pub fn add_for_statuses(
        &mut self,
        role: Role,
        statuses: &[CallStatus],
        event: EventKind,
        transition: Transition,
    ) {
        for status in statuses {
            self.add_transition(role, *status, event, transition.clone());
        }
    }

    pub fn build(self) -> MasterStateTable {
        self.table
    }
}

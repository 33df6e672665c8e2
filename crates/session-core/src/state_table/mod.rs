pub mod builder;
pub mod tables;
pub mod types;

pub use builder::StateTableBuilder;
pub use types::*;

use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// The master state table - single source of truth for all transitions
    pub static ref MASTER_TABLE: Arc<MasterStateTable> = Arc::new(build_master_table());
}

/// Build the complete master state table
pub fn build_master_table() -> MasterStateTable {
    let mut builder = StateTableBuilder::new();

    tables::add_idle_transitions(&mut builder);
    tables::add_caller_transitions(&mut builder);
    tables::add_callee_transitions(&mut builder);
    tables::add_common_transitions(&mut builder);

    let table = builder.build();
    if let Err(errors) = table.validate() {
        tracing::error!("State table validation failed: {:?}", errors);
    }
    tracing::debug!("Built state table with {} transitions", table.transition_count());
    table
}

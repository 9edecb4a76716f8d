pub mod run_ctx;
pub mod sync_flow;

pub use run_ctx::{ErrorLog, RunContext, Stage};
pub use sync_flow::{FlowOutcome, SyncFlow};

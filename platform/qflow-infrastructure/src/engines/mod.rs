//! [`WorkflowEngine`](qflow_domain::repositories::workflow_engine::WorkflowEngine)
//! adapters.

mod command;
mod dry_run;

pub use command::CommandEngine;
pub use dry_run::{DryRunEngine, EngineCall};

pub mod artifacts;
pub mod workflow_engine;

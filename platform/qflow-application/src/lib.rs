pub mod config;
pub mod inspection;
mod shared;
pub mod validation;
pub mod workflow;

pub use shared::{fingerprint, run_id};

pub mod artifacts;
pub mod engines;

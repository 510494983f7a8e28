pub mod artifact_ref;
pub mod component;
pub mod date_range;
pub mod mark;
pub mod node;

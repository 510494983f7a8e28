//! Column catalogue for the data handlers a workflow config can name.

pub mod catalog;
pub mod fields;

pub use catalog::{handler_columns, lookup_handler, HandlerColumns, HandlerDefinition, HANDLER_NAMES};
pub use fields::{FeatureSpec, FieldList, LoaderFields, PriceSpec, RollingOp, RollingSpec, VolumeSpec};

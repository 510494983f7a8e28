pub mod repositories;
pub mod services;
pub mod value_objects;

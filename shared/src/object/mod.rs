pub mod diff_mask;
pub mod error;
pub mod object_base;
pub mod object_kinds;
pub mod property;
pub mod property_mutate;
pub mod replicate;
pub mod schema;
pub mod sync_context;

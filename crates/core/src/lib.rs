//! Shared domain types for the vigil workspace.

pub mod change;
pub mod error;
pub mod types;

pub use change::{ChangeEvent, ChangeType, EntityType, FilterCondition, RowData};
pub use error::CoreError;

//! Data models for daogen.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod entity;
pub mod record;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use connection::DatabaseType;
pub use entity::{BaseCondition, EntityMetadata, SemanticType, Slots, SqlTemplate};
pub use record::Record;
pub use schema::{ColumnDefinition, TableInfo, TableType};
pub use value::Value;

//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Scoped statement execution (plain, held, pass-through, transactional)
//! - Parameter binding and row decoding
//! - Schema introspection

pub mod handle;
pub mod params;
pub mod pool;
pub mod schema;
pub mod scope;
pub mod types;

pub use handle::{ConnectionHandle, ExecOutcome};
pub use pool::{ConnectionPool, DEFAULT_RETRY_INTERVAL, PoolStatus};
pub use schema::SchemaInspector;
pub use scope::{Dbi, Scope};

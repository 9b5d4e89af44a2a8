//! daogen library
//!
//! Schema-driven data access for MySQL and SQLite: introspect tables and
//! views into [`EntityMetadata`], compose parameterized CRUD statements from
//! it, and execute them through a connection pool with explicit
//! plain, held, pass-through and transactional scopes.

pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod manager;
pub mod models;
pub mod query;
pub mod reshape;

pub use config::{Config, DatabaseConfig};
pub use db::{ConnectionPool, Dbi, Scope};
pub use error::{DbError, DbResult};
pub use generator::{Analyser, AnalysisReport, ViewDecomposer};
pub use manager::{TableManager, ViewManager};
pub use models::{EntityMetadata, Record, Value};
pub use query::{ConflictMode, Query, WriteOptions};

//! SQL statement composition.

pub mod bulk;
pub mod composer;
pub mod dialect;

pub use bulk::{BulkBatch, BulkInsertBuffer, DEFAULT_BULK_BUFFER_SIZE};
pub use composer::{ConflictMode, InsertStatement, Query, QueryComposer, Statement, WriteOptions};
pub use dialect::{Dialect, quote_identifier};

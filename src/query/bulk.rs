//! Buffer for batched inserts.

use crate::error::{DbError, DbResult};
use crate::models::Value;
use crate::query::composer::{ConflictMode, InsertStatement};

/// Default number of buffered rows before an automatic flush.
pub const DEFAULT_BULK_BUFFER_SIZE: usize = 50;

/// Statement shape fixed by the first buffered row.
#[derive(Debug, Clone, PartialEq)]
struct BulkTemplate {
    sql: String,
    columns: Vec<String>,
    conflict: ConflictMode,
}

/// Rows waiting for one multi-row execution.
///
/// All rows must share the column list and conflict mode of the first one;
/// a mismatching row is rejected and the buffer is left untouched.
#[derive(Debug, Clone)]
pub struct BulkInsertBuffer {
    capacity: usize,
    template: Option<BulkTemplate>,
    rows: Vec<Vec<Value>>,
}

/// Buffered contents: one statement and one parameter row per record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulkBatch<'b> {
    pub sql: &'b str,
    pub rows: &'b [Vec<Value>],
}

impl Default for BulkInsertBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BULK_BUFFER_SIZE)
    }
}

impl BulkInsertBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            template: None,
            rows: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the buffer reached its flush threshold.
    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    /// Buffer one insert, returning the new row count.
    pub fn push(&mut self, insert: InsertStatement, entity: &str) -> DbResult<usize> {
        match &self.template {
            Some(template) => {
                if template.columns != insert.columns {
                    return Err(DbError::configuration(
                        format!(
                            "Bulk insert column mismatch: expected [{}], got [{}]",
                            template.columns.join(", "),
                            insert.columns.join(", ")
                        ),
                        entity,
                    ));
                }
                if template.conflict != insert.conflict {
                    return Err(DbError::configuration(
                        "Bulk insert conflict mode differs from the buffered rows",
                        entity,
                    ));
                }
            }
            None => {
                self.template = Some(BulkTemplate {
                    sql: insert.statement.sql,
                    columns: insert.columns,
                    conflict: insert.conflict,
                });
            }
        }
        self.rows.push(insert.statement.params);
        Ok(self.rows.len())
    }

    /// The statement and rows to execute; `None` when nothing is buffered.
    pub fn pending(&self) -> Option<BulkBatch<'_>> {
        match &self.template {
            Some(template) if !self.rows.is_empty() => Some(BulkBatch {
                sql: &template.sql,
                rows: &self.rows,
            }),
            _ => None,
        }
    }

    /// Drop the buffered rows together with the template they share.
    pub fn clear(&mut self) {
        self.template = None;
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::composer::Statement;

    fn insert(columns: &[&str], conflict: ConflictMode) -> InsertStatement {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        InsertStatement {
            statement: Statement::new(
                format!("INSERT INTO `t` ({})", columns.join(", ")),
                columns.iter().map(|_| Value::Int(1)).collect(),
            ),
            columns,
            conflict,
        }
    }

    #[test]
    fn test_push_and_clear() {
        let mut buffer = BulkInsertBuffer::new(3);
        assert!(buffer.pending().is_none());
        assert_eq!(buffer.push(insert(&["a", "b"], ConflictMode::Plain), "t").unwrap(), 1);
        assert_eq!(buffer.push(insert(&["a", "b"], ConflictMode::Plain), "t").unwrap(), 2);
        assert!(!buffer.is_full());

        let batch = buffer.pending().unwrap();
        assert_eq!(batch.sql, "INSERT INTO `t` (a, b)");
        assert_eq!(batch.rows.len(), 2);

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.pending().is_none());
    }

    #[test]
    fn test_mismatch_leaves_buffer_untouched() {
        let mut buffer = BulkInsertBuffer::default();
        buffer.push(insert(&["a", "b"], ConflictMode::Plain), "t").unwrap();

        let err = buffer
            .push(insert(&["a"], ConflictMode::Plain), "t")
            .unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
        assert!(buffer
            .push(insert(&["a", "b"], ConflictMode::InsertIgnore), "t")
            .is_err());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_template_resets_after_clear() {
        let mut buffer = BulkInsertBuffer::new(2);
        buffer.push(insert(&["a"], ConflictMode::Plain), "t").unwrap();
        buffer.clear();
        // a different column set is accepted once the buffer is drained
        assert!(buffer.push(insert(&["b"], ConflictMode::Plain), "t").is_ok());
    }

    #[test]
    fn test_threshold() {
        let mut buffer = BulkInsertBuffer::new(2);
        buffer.push(insert(&["a"], ConflictMode::Plain), "t").unwrap();
        buffer.push(insert(&["a"], ConflictMode::Plain), "t").unwrap();
        assert!(buffer.is_full());
        assert_eq!(BulkInsertBuffer::default().capacity(), DEFAULT_BULK_BUFFER_SIZE);
    }
}

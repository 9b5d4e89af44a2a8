//! Entity managers.
//!
//! A [`ViewManager`] runs the read paths of one entity; a [`TableManager`]
//! adds the write paths and a bulk-insert buffer. Both execute through a
//! [`Dbi`], either their own plain-scoped one or one borrowed from an
//! enclosing [`ConnectionPool::pass_dbi`] / [`ConnectionPool::transaction`]
//! call, in which case every statement joins that scope:
//!
//! ```ignore
//! pool.transaction(|dbi| Box::pin(async move {
//!     let mut orders = TableManager::with_dbi(orders_meta, dbi);
//!     orders.insert_one(&mut order, &WriteOptions::new()).await?;
//!     orders.delete_all("status = ?", vec!["stale".into()], &[], 0).await
//! }))
//! .await?;
//! ```

use crate::db::{ConnectionPool, Dbi};
use crate::error::DbResult;
use crate::models::{EntityMetadata, Record, Value};
use crate::query::{BulkInsertBuffer, Dialect, Query, QueryComposer, WriteOptions};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum DbiSlot<'d> {
    Owned(Dbi),
    Borrowed(&'d mut Dbi),
}

impl DbiSlot<'_> {
    fn get(&mut self) -> &mut Dbi {
        match self {
            Self::Owned(dbi) => dbi,
            Self::Borrowed(dbi) => &mut **dbi,
        }
    }

    fn dialect(&self) -> Dialect {
        match self {
            Self::Owned(dbi) => dbi.dialect(),
            Self::Borrowed(dbi) => dbi.dialect(),
        }
    }
}

/// Read access to a table or view.
#[derive(Debug)]
pub struct ViewManager<'d> {
    entity: Arc<EntityMetadata>,
    dbi: DbiSlot<'d>,
}

impl ViewManager<'static> {
    /// Manager with its own plain-scoped [`Dbi`].
    pub fn new(entity: Arc<EntityMetadata>, pool: &ConnectionPool) -> Self {
        Self {
            entity,
            dbi: DbiSlot::Owned(pool.dbi()),
        }
    }
}

impl<'d> ViewManager<'d> {
    /// Manager that executes inside the scope of `dbi`.
    pub fn with_dbi(entity: Arc<EntityMetadata>, dbi: &'d mut Dbi) -> Self {
        Self {
            entity,
            dbi: DbiSlot::Borrowed(dbi),
        }
    }

    pub fn entity(&self) -> &EntityMetadata {
        &self.entity
    }

    pub fn dbi(&mut self) -> &mut Dbi {
        self.dbi.get()
    }

    fn composer(&self) -> QueryComposer<'_> {
        QueryComposer::new(&self.entity, self.dbi.dialect())
    }

    /// First row matching `query`, or `None`.
    pub async fn select_one(&mut self, query: &Query) -> DbResult<Option<Record>> {
        let statement = self.composer().select_one(query);
        debug!(entity = %self.entity.table_name, "ViewManager.select_one");
        self.dbi.get().fetch_one(&statement).await
    }

    /// Row with the given primary-key values, in primary-key order.
    pub async fn select_one_by_pk(&mut self, values: &[Value]) -> DbResult<Option<Record>> {
        let statement = self
            .composer()
            .select_by_primary_key(values, &Query::new())?;
        debug!(entity = %self.entity.table_name, "ViewManager.select_one_by_pk");
        self.dbi.get().fetch_one(&statement).await
    }

    pub async fn select_all(&mut self, query: &Query) -> DbResult<Vec<Record>> {
        let statement = self.composer().select_all(query);
        let rows = self.dbi.get().fetch_all(&statement).await?;
        debug!(entity = %self.entity.table_name, rows = rows.len(), "ViewManager.select_all");
        Ok(rows)
    }

    /// Run `f` with one connection held for every statement it issues.
    pub async fn hold<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: for<'a> FnOnce(&'a mut ViewManager<'d>) -> BoxFuture<'a, DbResult<T>>,
    {
        let entered = self.dbi.get().enter_hold();
        let result = f(&mut *self).await;
        self.dbi.get().exit_hold(entered).await;
        result
    }
}

/// Read and write access to a base table.
#[derive(Debug)]
pub struct TableManager<'d> {
    view: ViewManager<'d>,
    bulk: BulkInsertBuffer,
}

impl TableManager<'static> {
    /// Manager with its own plain-scoped [`Dbi`].
    pub fn new(entity: Arc<EntityMetadata>, pool: &ConnectionPool) -> Self {
        Self {
            view: ViewManager::new(entity, pool),
            bulk: BulkInsertBuffer::default(),
        }
    }
}

impl<'d> TableManager<'d> {
    /// Manager that executes inside the scope of `dbi`.
    pub fn with_dbi(entity: Arc<EntityMetadata>, dbi: &'d mut Dbi) -> Self {
        Self {
            view: ViewManager::with_dbi(entity, dbi),
            bulk: BulkInsertBuffer::default(),
        }
    }

    /// Flush threshold of [`insert_one_bulk`](Self::insert_one_bulk).
    pub fn with_bulk_buffer_size(mut self, size: usize) -> Self {
        self.bulk = BulkInsertBuffer::new(size);
        self
    }

    pub fn entity(&self) -> &EntityMetadata {
        self.view.entity()
    }

    pub fn dbi(&mut self) -> &mut Dbi {
        self.view.dbi()
    }

    pub fn bulk_buffer(&self) -> &BulkInsertBuffer {
        &self.bulk
    }

    pub async fn select_one(&mut self, query: &Query) -> DbResult<Option<Record>> {
        self.view.select_one(query).await
    }

    pub async fn select_one_by_pk(&mut self, values: &[Value]) -> DbResult<Option<Record>> {
        self.view.select_one_by_pk(values).await
    }

    pub async fn select_all(&mut self, query: &Query) -> DbResult<Vec<Record>> {
        self.view.select_all(query).await
    }

    /// Update the row identified by the record's primary key. Returns the
    /// number of affected rows.
    pub async fn update_one(&mut self, record: &Record, options: &WriteOptions) -> DbResult<u64> {
        let statement = self.view.composer().update_one(record, options)?;
        let affected = self.view.dbi.get().execute(&statement).await?;
        debug!(entity = %self.view.entity.table_name, affected, "TableManager.update_one");
        Ok(affected)
    }

    /// Insert one row and return the generated key (0 when none).
    ///
    /// With a single integer primary key the generated key is written back
    /// into `record`.
    pub async fn insert_one(
        &mut self,
        record: &mut Record,
        options: &WriteOptions,
    ) -> DbResult<u64> {
        let insert = self.view.composer().insert_one(record, options)?;
        let id = self.view.dbi.get().execute(&insert.statement).await?;

        if id != 0 {
            if let Some(key) = self.view.entity.single_integer_key() {
                match i64::try_from(id) {
                    Ok(value) => {
                        record.set(key, Value::Int(value));
                    }
                    Err(_) => warn!(
                        entity = %self.view.entity.table_name,
                        id,
                        "Generated key does not fit a signed integer, not written back"
                    ),
                }
            }
        }
        debug!(entity = %self.view.entity.table_name, id, "TableManager.insert_one");
        Ok(id)
    }

    /// Buffer one insert and return the buffer length after adding it.
    ///
    /// When `auto_flush` is set and the buffer reaches its threshold, the
    /// buffered rows are written before returning.
    pub async fn insert_one_bulk(
        &mut self,
        record: &Record,
        options: &WriteOptions,
        auto_flush: bool,
    ) -> DbResult<usize> {
        let insert = self.view.composer().insert_one(record, options)?;
        let buffered = self.bulk.push(insert, &self.view.entity.table_name)?;
        if auto_flush && self.bulk.is_full() {
            self.insert_bulk_flush().await?;
        }
        Ok(buffered)
    }

    /// Write every buffered row with one batch execution.
    ///
    /// Returns `None` without touching the database when nothing is buffered.
    /// The buffer is cleared only after the batch succeeded.
    pub async fn insert_bulk_flush(&mut self) -> DbResult<Option<u64>> {
        let Some(batch) = self.bulk.pending() else {
            return Ok(None);
        };
        let count = batch.rows.len();
        let affected = self.view.dbi.get().execute_many(batch.sql, batch.rows).await?;
        self.bulk.clear();
        info!(
            entity = %self.view.entity.table_name,
            inserted_count = count,
            affected,
            "TableManager.insert_bulk_flush"
        );
        Ok(Some(affected))
    }

    /// Delete the row identified by the record's primary key.
    pub async fn delete_one(&mut self, record: &Record) -> DbResult<u64> {
        let statement = self.view.composer().delete_one(record)?;
        let affected = self.view.dbi.get().execute(&statement).await?;
        debug!(entity = %self.view.entity.table_name, affected, "TableManager.delete_one");
        Ok(affected)
    }

    /// Delete every row matching `condition`. The entity's base condition is
    /// not applied.
    pub async fn delete_all(
        &mut self,
        condition: &str,
        params: Vec<Value>,
        order_by: &[String],
        limit: u64,
    ) -> DbResult<u64> {
        let statement = self
            .view
            .composer()
            .delete_all(condition, params, order_by, limit)?;
        let affected = self.view.dbi.get().execute(&statement).await?;
        debug!(entity = %self.view.entity.table_name, affected, "TableManager.delete_all");
        Ok(affected)
    }

    /// Run `f` with one connection held for every statement it issues.
    pub async fn hold<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: for<'a> FnOnce(&'a mut TableManager<'d>) -> BoxFuture<'a, DbResult<T>>,
    {
        let entered = self.view.dbi.get().enter_hold();
        let result = f(&mut *self).await;
        self.view.dbi.get().exit_hold(entered).await;
        result
    }
}

impl Drop for TableManager<'_> {
    fn drop(&mut self) {
        if !self.bulk.is_empty() {
            warn!(
                entity = %self.view.entity.table_name,
                pending = self.bulk.len(),
                "TableManager dropped with unflushed bulk inserts"
            );
        }
    }
}

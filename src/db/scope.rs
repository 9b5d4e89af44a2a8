//! Scoped statement execution.
//!
//! A [`Dbi`] executes statements on behalf of one logical call chain. Its
//! [`Scope`] decides whether the connection goes back to the pool after each
//! statement or stays checked out across several:
//!
//! | scope           | entered through                 | handle released            | commit             |
//! |-----------------|---------------------------------|----------------------------|--------------------|
//! | `Plain`         | [`ConnectionPool::dbi`]         | after every statement      | autocommit         |
//! | `SelfOwned`     | [`Dbi::hold`]                   | when `hold` returns        | autocommit         |
//! | `PassThrough`   | [`ConnectionPool::pass_dbi`]    | when `pass_dbi` returns    | autocommit         |
//! | `Transactional` | [`ConnectionPool::transaction`] | after COMMIT or ROLLBACK   | once, at the end   |
//!
//! The scope closures take `&mut Dbi` and return a boxed future borrowing it:
//!
//! ```ignore
//! pool.transaction(|dbi| Box::pin(async move {
//!     dbi.execute(&insert_order).await?;
//!     dbi.execute(&insert_line).await
//! }))
//! .await?;
//! ```

use crate::db::handle::{ConnectionHandle, ExecOutcome};
use crate::db::pool::ConnectionPool;
use crate::error::{DbError, DbResult};
use crate::models::{Record, Value};
use crate::query::{Dialect, Statement};
use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

/// Connection lifetime policy of a [`Dbi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Plain,
    SelfOwned,
    PassThrough,
    Transactional,
}

impl Scope {
    /// Whether the handle stays checked out between statements.
    pub fn holds_connection(&self) -> bool {
        !matches!(self, Self::Plain)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Plain => "plain",
            Self::SelfOwned => "self_owned",
            Self::PassThrough => "pass_through",
            Self::Transactional => "transactional",
        };
        f.write_str(name)
    }
}

/// Statement execution interface bound to a pool.
#[derive(Debug)]
pub struct Dbi {
    pool: ConnectionPool,
    handle: Option<ConnectionHandle>,
    scope: Scope,
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"))
}

impl Dbi {
    pub fn new(pool: ConnectionPool) -> Self {
        Self::with_scope(pool, Scope::Plain)
    }

    fn with_scope(pool: ConnectionPool, scope: Scope) -> Self {
        Self {
            pool,
            handle: None,
            scope,
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn dialect(&self) -> Dialect {
        self.pool.dialect()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Whether a connection is currently checked out.
    pub fn has_connection(&self) -> bool {
        self.handle.is_some()
    }

    async fn connection(&mut self) -> DbResult<&mut ConnectionHandle> {
        if self.handle.is_none() {
            self.handle = Some(self.pool.acquire().await?);
        }
        self.handle
            .as_mut()
            .ok_or_else(|| DbError::internal("Connection handle missing after checkout"))
    }

    /// Release the handle unless the scope holds it.
    async fn finish(&mut self) {
        if !self.scope.holds_connection() {
            self.release().await;
        }
    }

    async fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle).await;
        }
    }

    /// Run one statement and report both affected rows and the generated key.
    pub async fn execute_statement(&mut self, statement: &Statement) -> DbResult<ExecOutcome> {
        debug!(scope = %self.scope, "Dbi.execute");
        let result = match self.connection().await {
            Ok(handle) => handle.execute(statement).await,
            Err(e) => Err(e),
        };
        self.finish().await;
        result
    }

    /// Run one statement. INSERT returns the generated key (0 when no row was
    /// inserted); everything else returns the number of affected rows.
    pub async fn execute(&mut self, statement: &Statement) -> DbResult<u64> {
        let outcome = self.execute_statement(statement).await?;
        Ok(if is_insert(&statement.sql) {
            outcome.last_insert_id
        } else {
            outcome.rows_affected
        })
    }

    /// Run `sql` once per parameter row on one connection and return the
    /// summed affected-row count.
    ///
    /// Outside a transaction the batch is wrapped in its own transaction, so
    /// it applies completely or not at all.
    pub async fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> DbResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        debug!(scope = %self.scope, rows = rows.len(), "Dbi.execute_many");

        let dialect = self.dialect();
        let atomic = self.scope != Scope::Transactional;
        let result = match self.connection().await {
            Ok(handle) => run_batch(handle, dialect, sql, rows, atomic).await,
            Err(e) => Err(e),
        };
        self.finish().await;
        result
    }

    /// First row of the result, if any.
    pub async fn fetch_one(&mut self, statement: &Statement) -> DbResult<Option<Record>> {
        debug!(scope = %self.scope, "Dbi.fetch_one");
        let result = match self.connection().await {
            Ok(handle) => handle.fetch_optional(statement).await,
            Err(e) => Err(e),
        };
        self.finish().await;
        result
    }

    /// Every row of the result.
    pub async fn fetch_all(&mut self, statement: &Statement) -> DbResult<Vec<Record>> {
        debug!(scope = %self.scope, "Dbi.fetch_all");
        let result = match self.connection().await {
            Ok(handle) => handle.fetch_all(statement).await,
            Err(e) => Err(e),
        };
        self.finish().await;
        result
    }

    /// Keep one connection checked out while `f` runs.
    ///
    /// Only a plain-scoped `Dbi` changes scope; inside another scope the
    /// connection is already held and `f` simply runs.
    pub async fn hold<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: for<'a> FnOnce(&'a mut Dbi) -> BoxFuture<'a, DbResult<T>>,
    {
        let entered = self.enter_hold();
        let result = f(&mut *self).await;
        self.exit_hold(entered).await;
        result
    }

    /// Switch a plain scope to self-owned. Returns whether the scope changed.
    pub(crate) fn enter_hold(&mut self) -> bool {
        if self.scope != Scope::Plain {
            return false;
        }
        debug!("Dbi.hold.start");
        self.scope = Scope::SelfOwned;
        true
    }

    /// Undo [`enter_hold`](Self::enter_hold) and give the connection back.
    pub(crate) async fn exit_hold(&mut self, entered: bool) {
        if entered {
            self.scope = Scope::Plain;
            self.release().await;
            debug!("Dbi.hold.done");
        }
    }
}

async fn run_batch(
    handle: &mut ConnectionHandle,
    dialect: Dialect,
    sql: &str,
    rows: &[Vec<Value>],
    atomic: bool,
) -> DbResult<u64> {
    if atomic {
        handle.execute_raw(dialect.begin_statement()).await?;
    }

    let mut affected = 0;
    for params in rows {
        let statement = Statement::new(sql, params.clone());
        match handle.execute(&statement).await {
            Ok(outcome) => affected += outcome.rows_affected,
            Err(e) => {
                if atomic {
                    rollback(handle, dialect).await;
                }
                return Err(e);
            }
        }
    }

    if atomic {
        if let Err(e) = handle.execute_raw(dialect.commit_statement()).await {
            rollback(handle, dialect).await;
            return Err(e);
        }
    }
    Ok(affected)
}

async fn rollback(handle: &mut ConnectionHandle, dialect: Dialect) {
    if let Err(e) = handle.execute_raw(dialect.rollback_statement()).await {
        warn!(handle = %handle.id(), error = %e, "Rollback failed");
    }
}

impl ConnectionPool {
    /// A plain-scoped execution interface.
    pub fn dbi(&self) -> Dbi {
        Dbi::new(self.clone())
    }

    /// Run `f` with one connection held for its whole duration.
    pub async fn pass_dbi<T, F>(&self, f: F) -> DbResult<T>
    where
        F: for<'a> FnOnce(&'a mut Dbi) -> BoxFuture<'a, DbResult<T>>,
    {
        debug!("pass_dbi.start");
        let mut dbi = Dbi::with_scope(self.clone(), Scope::PassThrough);
        let result = f(&mut dbi).await;
        dbi.release().await;
        debug!("pass_dbi.done");
        result
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`. On `Err` the transaction is rolled back
    /// and the error is returned unchanged. A failed commit is followed by a
    /// rollback attempt and the commit error is returned.
    pub async fn transaction<T, F>(&self, f: F) -> DbResult<T>
    where
        F: for<'a> FnOnce(&'a mut Dbi) -> BoxFuture<'a, DbResult<T>>,
    {
        let dialect = self.dialect();
        let mut dbi = Dbi::with_scope(self.clone(), Scope::Transactional);

        let handle = dbi.connection().await?;
        let transaction_id = handle.id().to_string();
        let begun = handle.execute_raw(dialect.begin_statement()).await;
        if let Err(e) = begun {
            dbi.release().await;
            return Err(e);
        }
        debug!(transaction_id = %transaction_id, "Transaction started");

        let result = f(&mut dbi).await;

        let outcome = match dbi.handle.as_mut() {
            Some(handle) => match result {
                Ok(value) => match handle.execute_raw(dialect.commit_statement()).await {
                    Ok(()) => {
                        info!(transaction_id = %transaction_id, "Transaction committed");
                        Ok(value)
                    }
                    Err(e) => {
                        rollback(handle, dialect).await;
                        warn!(
                            transaction_id = %transaction_id,
                            error = %e,
                            "Commit failed, rolled back"
                        );
                        Err(e)
                    }
                },
                Err(e) => {
                    rollback(handle, dialect).await;
                    warn!(transaction_id = %transaction_id, error = %e, "Transaction rolled back");
                    Err(e)
                }
            },
            None => Err(DbError::internal("Transaction lost its connection")),
        };

        dbi.release().await;
        outcome
    }
}

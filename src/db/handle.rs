//! A single physical connection checked out of a [`ConnectionPool`].
//!
//! [`ConnectionPool`]: crate::db::ConnectionPool

use crate::db::params::{bind_mysql_param, bind_sqlite_param};
use crate::db::types::RowToRecord;
use crate::error::{DbError, DbResult};
use crate::models::Record;
use crate::query::Statement;
use sqlx::pool::PoolConnection;
use sqlx::{Connection as _, MySql, MySqlConnection, Sqlite, SqliteConnection};
use tracing::{debug, error};

/// Either a pool member or a dedicated connection opened for one checkout.
pub(crate) enum RawConnection {
    MySqlPooled(PoolConnection<MySql>),
    MySqlDirect(MySqlConnection),
    SqlitePooled(PoolConnection<Sqlite>),
    SqliteDirect(SqliteConnection),
}

/// Borrowed backend connection, for code that needs driver-specific queries.
pub(crate) enum ConnRef<'c> {
    MySql(&'c mut MySqlConnection),
    Sqlite(&'c mut SqliteConnection),
}

impl RawConnection {
    fn as_conn(&mut self) -> ConnRef<'_> {
        match self {
            Self::MySqlPooled(c) => ConnRef::MySql(&mut **c),
            Self::MySqlDirect(c) => ConnRef::MySql(c),
            Self::SqlitePooled(c) => ConnRef::Sqlite(&mut **c),
            Self::SqliteDirect(c) => ConnRef::Sqlite(c),
        }
    }

    fn is_pooled(&self) -> bool {
        matches!(self, Self::MySqlPooled(_) | Self::SqlitePooled(_))
    }
}

/// Result of a data-modifying statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Generated key of the last inserted row; 0 when no row was affected.
    pub last_insert_id: u64,
}

/// Exclusive owner of one connection.
///
/// A handle is used by one call chain at a time and is given back with
/// [`ConnectionPool::release`](crate::db::ConnectionPool::release).
pub struct ConnectionHandle {
    id: String,
    conn: RawConnection,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("pooled", &self.conn.is_pooled())
            .finish()
    }
}

fn failed(sql: &str, err: sqlx::Error) -> DbError {
    error!(sql = %sql, error = %err, "Statement failed");
    DbError::query_execution(sql, err)
}

impl ConnectionHandle {
    pub(crate) fn new(conn: RawConnection) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        debug!(handle = %id, pooled = conn.is_pooled(), "Connection checked out");
        Self { id, conn }
    }

    /// Unique identifier of this checkout, used in log fields.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_pooled(&self) -> bool {
        self.conn.is_pooled()
    }

    /// Run a data-modifying statement.
    pub async fn execute(&mut self, statement: &Statement) -> DbResult<ExecOutcome> {
        let sql = statement.sql.as_str();
        debug!(handle = %self.id, sql = %sql, params = statement.params.len(), "execute");

        let outcome = match self.conn.as_conn() {
            ConnRef::MySql(conn) => {
                let mut query = sqlx::query(sql);
                for param in &statement.params {
                    query = bind_mysql_param(query, param);
                }
                let result = query.execute(&mut *conn).await.map_err(|e| failed(sql, e))?;
                ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: result.last_insert_id(),
                }
            }
            ConnRef::Sqlite(conn) => {
                let mut query = sqlx::query(sql);
                for param in &statement.params {
                    query = bind_sqlite_param(query, param);
                }
                let result = query.execute(&mut *conn).await.map_err(|e| failed(sql, e))?;
                ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: u64::try_from(result.last_insert_rowid()).unwrap_or(0),
                }
            }
        };

        // SQLite keeps reporting the previous rowid after an ignored insert
        if outcome.rows_affected == 0 {
            return Ok(ExecOutcome {
                last_insert_id: 0,
                ..outcome
            });
        }
        Ok(outcome)
    }

    /// Run a parameterless control statement such as `BEGIN` or `COMMIT`.
    pub async fn execute_raw(&mut self, sql: &str) -> DbResult<()> {
        debug!(handle = %self.id, sql = %sql, "execute_raw");
        match self.conn.as_conn() {
            ConnRef::MySql(conn) => {
                sqlx::raw_sql(sql)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| failed(sql, e))?;
            }
            ConnRef::Sqlite(conn) => {
                sqlx::raw_sql(sql)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| failed(sql, e))?;
            }
        }
        Ok(())
    }

    /// First row of the result, if any.
    pub async fn fetch_optional(&mut self, statement: &Statement) -> DbResult<Option<Record>> {
        let sql = statement.sql.as_str();
        debug!(handle = %self.id, sql = %sql, params = statement.params.len(), "fetch_optional");

        match self.conn.as_conn() {
            ConnRef::MySql(conn) => {
                let mut query = sqlx::query(sql);
                for param in &statement.params {
                    query = bind_mysql_param(query, param);
                }
                let row = query
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| failed(sql, e))?;
                Ok(row.map(|r| r.to_record()))
            }
            ConnRef::Sqlite(conn) => {
                let mut query = sqlx::query(sql);
                for param in &statement.params {
                    query = bind_sqlite_param(query, param);
                }
                let row = query
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| failed(sql, e))?;
                Ok(row.map(|r| r.to_record()))
            }
        }
    }

    /// Every row of the result.
    pub async fn fetch_all(&mut self, statement: &Statement) -> DbResult<Vec<Record>> {
        let sql = statement.sql.as_str();
        debug!(handle = %self.id, sql = %sql, params = statement.params.len(), "fetch_all");

        match self.conn.as_conn() {
            ConnRef::MySql(conn) => {
                let mut query = sqlx::query(sql);
                for param in &statement.params {
                    query = bind_mysql_param(query, param);
                }
                let rows = query.fetch_all(&mut *conn).await.map_err(|e| failed(sql, e))?;
                Ok(rows.iter().map(|r| r.to_record()).collect())
            }
            ConnRef::Sqlite(conn) => {
                let mut query = sqlx::query(sql);
                for param in &statement.params {
                    query = bind_sqlite_param(query, param);
                }
                let rows = query.fetch_all(&mut *conn).await.map_err(|e| failed(sql, e))?;
                Ok(rows.iter().map(|r| r.to_record()).collect())
            }
        }
    }

    /// First column of the first row as a string, used for version probes.
    pub async fn fetch_scalar_string(&mut self, sql: &str) -> DbResult<Option<String>> {
        let row = self.fetch_optional(&Statement::new(sql, Vec::new())).await?;
        Ok(row.and_then(|r| {
            r.into_iter()
                .next()
                .and_then(|(_, v)| v.as_text().map(|t| t.into_owned()))
        }))
    }

    pub(crate) fn backend(&mut self) -> ConnRef<'_> {
        self.conn.as_conn()
    }

    /// Give the connection up: pool members go back to the pool, dedicated
    /// connections are closed.
    pub(crate) async fn close(self) -> DbResult<()> {
        debug!(handle = %self.id, "Connection released");
        match self.conn {
            RawConnection::MySqlPooled(conn) => drop(conn),
            RawConnection::SqlitePooled(conn) => drop(conn),
            RawConnection::MySqlDirect(conn) => conn.close().await?,
            RawConnection::SqliteDirect(conn) => conn.close().await?,
        }
        Ok(())
    }
}

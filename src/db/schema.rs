//! Schema introspection.
//!
//! Runs on a checked-out [`ConnectionHandle`] so the analyser reads every
//! catalog table through one connection.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (mysql, sqlite), each providing the same interface.

use crate::db::handle::{ConnRef, ConnectionHandle};
use crate::error::{DbError, DbResult};
use crate::generator::datatypes::map_column_type;
use crate::models::{ColumnDefinition, TableInfo, TableType};
use tracing::debug;

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// List base tables and views, ordered by name.
    ///
    /// `schema` selects a MySQL database other than the connection's current
    /// one; SQLite ignores it.
    pub async fn list_tables(
        handle: &mut ConnectionHandle,
        schema: Option<&str>,
    ) -> DbResult<Vec<TableInfo>> {
        match handle.backend() {
            ConnRef::MySql(conn) => mysql::list_tables(conn, schema).await,
            ConnRef::Sqlite(conn) => sqlite::list_tables(conn).await,
        }
    }

    /// Columns of a table or view in declaration order.
    pub async fn describe_columns(
        handle: &mut ConnectionHandle,
        table_name: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let columns = match handle.backend() {
            ConnRef::MySql(conn) => mysql::fetch_columns(conn, table_name, schema).await?,
            ConnRef::Sqlite(conn) => sqlite::fetch_columns(conn, table_name).await?,
        };
        if columns.is_empty() {
            return Err(DbError::schema(
                format!("Table '{}' not found", table_name),
                table_name.to_string(),
            ));
        }
        Ok(columns)
    }

    /// The database's own definition text of a view.
    pub async fn view_definition(
        handle: &mut ConnectionHandle,
        view_name: &str,
        schema: Option<&str>,
    ) -> DbResult<String> {
        let definition = match handle.backend() {
            ConnRef::MySql(conn) => mysql::view_definition(conn, view_name, schema).await?,
            ConnRef::Sqlite(conn) => sqlite::view_definition(conn, view_name).await?,
        };
        definition.ok_or_else(|| {
            DbError::schema(
                format!("View '{}' not found", view_name),
                view_name.to_string(),
            )
        })
    }
}

fn catalog_error(object: &str) -> impl FnOnce(sqlx::Error) -> DbError + '_ {
    move |e| DbError::schema(format!("Catalog query failed: {}", e), object)
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(TABLE_TYPE USING utf8) AS TABLE_TYPE,
                CONVERT(TABLE_COMMENT USING utf8) AS TABLE_COMMENT
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
            AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
            CONVERT(EXTRA USING utf8) AS EXTRA,
            CONVERT(COLUMN_COMMENT USING utf8) AS COLUMN_COMMENT
        FROM information_schema.columns
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name, type FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const VIEW_DEFINITION: &str =
            "SELECT sql FROM sqlite_master WHERE type = 'view' AND name = ?";
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod mysql {
    use super::*;
    use crate::query::quote_identifier;
    use sqlx::{MySqlConnection, Row};

    /// Safely get a string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &sqlx::mysql::MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }

    /// Safely get an optional string from a MySQL row.
    fn get_optional_string(row: &sqlx::mysql::MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    pub async fn list_tables(
        conn: &mut MySqlConnection,
        schema: Option<&str>,
    ) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await
            .map_err(catalog_error(schema.unwrap_or("DATABASE()")))?;

        let tables = rows
            .iter()
            .filter_map(|row| {
                let name = get_string(row, "TABLE_NAME");
                if name.is_empty() {
                    return None;
                }

                let type_str = get_string(row, "TABLE_TYPE");
                let mut table = TableInfo::new(&name, TableType::parse(&type_str));
                if let Some(comment) = get_optional_string(row, "TABLE_COMMENT") {
                    // MySQL reports "VIEW" as the comment of every view
                    if !comment.is_empty() && table.table_type == TableType::Table {
                        table = table.with_comment(comment);
                    }
                }
                Some(table)
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    pub async fn fetch_columns(
        conn: &mut MySqlConnection,
        table_name: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table_name)
            .bind(schema)
            .fetch_all(&mut *conn)
            .await
            .map_err(catalog_error(table_name))?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "COLUMN_NAME");
                let data_type = get_string(row, "COLUMN_TYPE");
                let nullable = get_string(row, "IS_NULLABLE").eq_ignore_ascii_case("YES");
                let column_key = get_string(row, "COLUMN_KEY");
                let type_info = map_column_type(&data_type, table_name, &name);

                let mut col =
                    ColumnDefinition::new(&name, &data_type, type_info.semantic_type, nullable)
                        .with_primary_key(column_key == "PRI")
                        .with_options(type_info.options);

                if let Some(default) = get_optional_string(row, "COLUMN_DEFAULT") {
                    col = col.with_default(default);
                }
                if let Some(extra) = get_optional_string(row, "EXTRA") {
                    if !extra.is_empty() {
                        col = col.with_extra(extra);
                    }
                }
                if let Some(comment) = get_optional_string(row, "COLUMN_COMMENT") {
                    if !comment.is_empty() {
                        col = col.with_comment(comment);
                    }
                }
                col
            })
            .collect())
    }

    /// `SHOW CREATE VIEW` for the view, qualified when a schema is given.
    pub fn show_create_view(view_name: &str, schema: Option<&str>) -> String {
        match schema {
            Some(schema) => format!(
                "SHOW CREATE VIEW {}.{}",
                quote_identifier(schema),
                quote_identifier(view_name)
            ),
            None => format!("SHOW CREATE VIEW {}", quote_identifier(view_name)),
        }
    }

    pub async fn view_definition(
        conn: &mut MySqlConnection,
        view_name: &str,
        schema: Option<&str>,
    ) -> DbResult<Option<String>> {
        let sql = show_create_view(view_name, schema);
        let row = sqlx::query(&sql)
            .fetch_optional(&mut *conn)
            .await
            .map_err(catalog_error(view_name))?;
        Ok(row
            .map(|r| get_string(&r, "Create View"))
            .filter(|text| !text.is_empty()))
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqliteConnection};

    pub async fn list_tables(conn: &mut SqliteConnection) -> DbResult<Vec<TableInfo>> {
        let rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(&mut *conn)
            .await
            .map_err(catalog_error("sqlite_master"))?;

        let tables = rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let type_str: String = row.get("type");
                TableInfo::new(&name, TableType::parse(&type_str))
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    pub async fn fetch_columns(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> DbResult<Vec<ColumnDefinition>> {
        let pragma_query = format!("PRAGMA table_info('{}')", table_name.replace('\'', "''"));
        let rows = sqlx::query(&pragma_query)
            .fetch_all(&mut *conn)
            .await
            .map_err(catalog_error(table_name))?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let data_type: String = row.try_get("type").unwrap_or_default();
                let notnull: i32 = row.get("notnull");
                let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
                let pk: i32 = row.get("pk");
                let type_info = map_column_type(&data_type, table_name, &name);

                let mut col =
                    ColumnDefinition::new(&name, &data_type, type_info.semantic_type, notnull == 0)
                        .with_primary_key(pk > 0)
                        .with_options(type_info.options);

                if let Some(def) = default_value {
                    col = col.with_default(def);
                }
                col
            })
            .collect())
    }

    pub async fn view_definition(
        conn: &mut SqliteConnection,
        view_name: &str,
    ) -> DbResult<Option<String>> {
        let row = sqlx::query(queries::sqlite::VIEW_DEFINITION)
            .bind(view_name)
            .fetch_optional(&mut *conn)
            .await
            .map_err(catalog_error(view_name))?;
        Ok(row.and_then(|r| r.try_get::<Option<String>, _>("sql").ok().flatten()))
    }
}

#[cfg(test)]
mod tests {
    use super::mysql::show_create_view;

    #[test]
    fn test_show_create_view_qualifies_schema() {
        assert_eq!(
            show_create_view("open_orders", None),
            "SHOW CREATE VIEW `open_orders`"
        );
        assert_eq!(
            show_create_view("open_orders", Some("shop")),
            "SHOW CREATE VIEW `shop`.`open_orders`"
        );
    }
}

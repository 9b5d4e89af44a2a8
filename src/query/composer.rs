//! Statement builders.
//!
//! [`QueryComposer`] turns entity metadata plus declarative fragments into a
//! [`Statement`]: SQL text with `?` placeholders and the positional values to
//! bind. Builders never touch a connection, so every shape is unit-testable.
//!
//! Identifiers (table and column names) only ever come from metadata. Caller
//! input reaches the SQL text solely through conditions, projections and
//! orderings, which are SQL fragments by contract; values always travel as
//! parameters.

use crate::error::{DbError, DbResult};
use crate::models::{EntityMetadata, Record, Slots, SqlTemplate, Value};
use crate::query::dialect::{Dialect, quote_identifier};
use tracing::warn;

/// SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Read-path fragments for `select_one` / `select_all`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    condition: Option<String>,
    params: Vec<Value>,
    projection: Vec<String>,
    /// `None` means "not specified"; `Some(vec![])` means "explicitly unordered".
    order_by: Option<Vec<String>>,
    limit: u64,
    offset: u64,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller condition with its positional parameters.
    pub fn filter<I>(mut self, condition: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.condition = Some(condition.into());
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn projection<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = Some(terms.into_iter().map(Into::into).collect());
        self
    }

    /// Zero renders no LIMIT clause.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Zero renders no OFFSET clause.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    fn condition(&self) -> Option<&str> {
        self.condition.as_deref().filter(|c| !c.trim().is_empty())
    }

    fn projection_sql(&self) -> String {
        if self.projection.is_empty() {
            "*".to_string()
        } else {
            self.projection.join(", ")
        }
    }
}

/// How an insert reacts to a duplicate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictMode {
    #[default]
    Plain,
    /// Overwrite the inserted columns of the existing row.
    OnDuplicateKeyUpdate,
    /// Skip rows that would violate a unique key.
    InsertIgnore,
}

/// Column selection rules shared by updates and inserts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub exclude_null: bool,
    pub exclude_columns: Vec<String>,
    pub conflict: ConflictMode,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave out attributes whose value is NULL (or absent).
    pub fn exclude_null(mut self) -> Self {
        self.exclude_null = true;
        self
    }

    pub fn exclude_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn conflict(mut self, conflict: ConflictMode) -> Self {
        self.conflict = conflict;
        self
    }

    fn skips(&self, name: &str, value: &Value) -> bool {
        (self.exclude_null && value.is_null()) || self.exclude_columns.iter().any(|c| c == name)
    }
}

/// An insert statement together with the column set and mode it was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub statement: Statement,
    pub columns: Vec<String>,
    pub conflict: ConflictMode,
}

/// Builds statements for one entity in one dialect.
#[derive(Debug, Clone, Copy)]
pub struct QueryComposer<'m> {
    entity: &'m EntityMetadata,
    dialect: Dialect,
}

impl<'m> QueryComposer<'m> {
    pub fn new(entity: &'m EntityMetadata, dialect: Dialect) -> Self {
        Self { entity, dialect }
    }

    pub fn entity(&self) -> &'m EntityMetadata {
        self.entity
    }

    fn table(&self) -> String {
        quote_identifier(&self.entity.table_name)
    }

    /// Base condition ANDed with the caller condition.
    pub fn where_clause(&self, condition: Option<&str>) -> String {
        let condition = condition.filter(|c| !c.trim().is_empty());
        match (self.entity.base_condition.as_filter(), condition) {
            (None, Some(cond)) => format!("WHERE ({cond})"),
            (None, None) => String::new(),
            (Some(base), Some(cond)) => format!("WHERE {base} AND ({cond})"),
            (Some(base), None) => format!("WHERE {base}"),
        }
    }

    /// `` `pk1` = ? AND `pk2` = ? `` over the primary keys in metadata order.
    pub fn primary_key_condition(&self) -> DbResult<String> {
        if self.entity.primary_keys.is_empty() {
            return Err(DbError::configuration(
                "Entity has no primary keys",
                &self.entity.table_name,
            ));
        }
        Ok(self
            .entity
            .primary_keys
            .iter()
            .map(|pk| format!("{} = {}", quote_identifier(pk), self.dialect.placeholder()))
            .collect::<Vec<_>>()
            .join(" AND "))
    }

    fn primary_key_values(&self, record: &Record) -> Vec<Value> {
        self.entity
            .primary_keys
            .iter()
            .map(|pk| record.value_or_null(pk))
            .collect()
    }

    fn render_select(
        &self,
        query: &Query,
        where_clause: &str,
        order_by: &str,
        limit: &str,
        offset: &str,
    ) -> String {
        let template = &self.entity.statement;
        if !query.projection.is_empty() && !template.has_slot(SqlTemplate::PROJECTION) {
            warn!(
                entity = %self.entity.table_name,
                "Projection ignored: template lists its own columns"
            );
        }
        if !order_by.is_empty() && template.order_by_precedes_group_by() {
            warn!(
                entity = %self.entity.table_name,
                "ORDER BY is rendered before GROUP BY in the entity template"
            );
        }
        let projection = query.projection_sql();
        template.render(&Slots {
            projection: &projection,
            where_clause,
            order_by,
            limit,
            offset,
        })
    }

    /// First row matching the query; ORDER BY only when the caller asks for it.
    pub fn select_one(&self, query: &Query) -> Statement {
        let where_clause = self.where_clause(query.condition());
        let order_by = match &query.order_by {
            Some(terms) if !terms.is_empty() => format!("ORDER BY {}", terms.join(", ")),
            _ => String::new(),
        };
        let sql = self.render_select(query, &where_clause, &order_by, "LIMIT 1", "");
        Statement::new(sql, query.params.clone())
    }

    /// Row with the given primary-key values. The query's condition is replaced.
    pub fn select_by_primary_key(&self, values: &[Value], query: &Query) -> DbResult<Statement> {
        let condition = self.primary_key_condition()?;
        if values.len() != self.entity.primary_keys.len() {
            return Err(DbError::configuration(
                format!(
                    "Expected {} primary key value(s), got {}",
                    self.entity.primary_keys.len(),
                    values.len()
                ),
                &self.entity.table_name,
            ));
        }
        let keyed = query.clone().filter(condition, values.iter().cloned());
        Ok(self.select_one(&keyed))
    }

    /// Every matching row; unspecified ordering falls back to the entity default.
    pub fn select_all(&self, query: &Query) -> Statement {
        let where_clause = self.where_clause(query.condition());
        let order_by = match &query.order_by {
            Some(terms) if !terms.is_empty() => format!("ORDER BY {}", terms.join(", ")),
            Some(_) => String::new(),
            None if !self.entity.default_order_by.is_empty() => {
                format!("ORDER BY {}", self.entity.default_order_by)
            }
            None => String::new(),
        };
        let limit = if query.limit > 0 {
            format!("LIMIT {}", query.limit)
        } else {
            String::new()
        };
        let offset = if query.offset > 0 {
            format!("OFFSET {}", query.offset)
        } else {
            String::new()
        };
        let sql = self.render_select(query, &where_clause, &order_by, &limit, &offset);
        Statement::new(sql, query.params.clone())
    }

    /// Attribute/value pairs left after applying the exclusion rules.
    fn writable_columns(&self, record: &Record, options: &WriteOptions) -> Vec<(String, Value)> {
        self.entity
            .attributes
            .iter()
            .filter_map(|name| {
                let value = record.value_or_null(name);
                (!options.skips(name, &value)).then(|| (name.clone(), value))
            })
            .collect()
    }

    /// Keyed single-row update of every non-excluded attribute.
    pub fn update_one(&self, record: &Record, options: &WriteOptions) -> DbResult<Statement> {
        let condition = self.primary_key_condition()?;
        let columns = self.writable_columns(record, options);
        if columns.is_empty() {
            return Err(DbError::configuration(
                "Nothing to update: every attribute is excluded",
                &self.entity.table_name,
            ));
        }

        let assignments: Vec<String> = columns
            .iter()
            .map(|(name, _)| format!("{} = {}", quote_identifier(name), self.dialect.placeholder()))
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.table(),
            assignments.join(", "),
            condition
        );
        if let Some(limit) = self.dialect.single_row_limit() {
            sql.push(' ');
            sql.push_str(limit);
        }

        let mut params: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
        params.extend(self.primary_key_values(record));
        Ok(Statement::new(sql, params))
    }

    /// Single-row insert honouring the exclusion rules and conflict mode.
    pub fn insert_one(&self, record: &Record, options: &WriteOptions) -> DbResult<InsertStatement> {
        let (columns, params): (Vec<String>, Vec<Value>) =
            self.writable_columns(record, options).into_iter().unzip();

        let ignore = options.conflict == ConflictMode::InsertIgnore;
        let mut sql = format!(
            "{} {} {}",
            self.dialect.insert_keyword(ignore),
            self.table(),
            self.dialect.insert_values(&columns)
        );
        if options.conflict == ConflictMode::OnDuplicateKeyUpdate {
            if columns.is_empty() {
                return Err(DbError::configuration(
                    "ON DUPLICATE KEY UPDATE needs at least one column",
                    &self.entity.table_name,
                ));
            }
            sql.push(' ');
            sql.push_str(&self.dialect.upsert_clause(&columns));
        }

        Ok(InsertStatement {
            statement: Statement::new(sql, params),
            columns,
            conflict: options.conflict,
        })
    }

    /// Keyed single-row delete.
    pub fn delete_one(&self, record: &Record) -> DbResult<Statement> {
        let condition = self.primary_key_condition()?;
        let mut sql = format!("DELETE FROM {} WHERE {}", self.table(), condition);
        if let Some(limit) = self.dialect.single_row_limit() {
            sql.push(' ');
            sql.push_str(limit);
        }
        Ok(Statement::new(sql, self.primary_key_values(record)))
    }

    /// Delete by caller condition. The base condition does not apply.
    pub fn delete_all(
        &self,
        condition: &str,
        params: Vec<Value>,
        order_by: &[String],
        limit: u64,
    ) -> DbResult<Statement> {
        if condition.trim().is_empty() {
            return Err(DbError::configuration(
                "delete_all requires a condition; pass \"1\" to delete every row",
                &self.entity.table_name,
            ));
        }
        if (!order_by.is_empty() || limit > 0) && !self.dialect.supports_delete_limit() {
            return Err(DbError::configuration(
                "ORDER BY and LIMIT on DELETE are not supported by this database",
                &self.entity.table_name,
            ));
        }

        let mut sql = format!("DELETE FROM {} WHERE {}", self.table(), condition);
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(Statement::new(sql, params))
    }
}

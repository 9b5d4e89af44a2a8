//! Offline introspection producing [`EntityMetadata`].
//!
//! Every table and view is analysed independently: a failure (a view whose
//! definition cannot be decomposed, a table dropped mid-run) is recorded in
//! the report and the run continues with the next entity. Only a failure to
//! list the entities at all aborts the run.

use crate::db::{ConnectionHandle, ConnectionPool, SchemaInspector};
use crate::error::DbResult;
use crate::generator::view::ViewDecomposer;
use crate::models::{EntityMetadata, TableInfo, TableType};
use serde::Serialize;
use tracing::{debug, info, warn};

/// An entity that could not be analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisFailure {
    pub name: String,
    pub table_type: TableType,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub entities: Vec<EntityMetadata>,
    pub failures: Vec<AnalysisFailure>,
}

impl AnalysisReport {
    pub fn entity(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.iter().find(|e| e.table_name == name)
    }

    pub fn failure(&self, name: &str) -> Option<&AnalysisFailure> {
        self.failures.iter().find(|f| f.name == name)
    }
}

/// Reads the schema of one database.
#[derive(Debug, Clone)]
pub struct Analyser {
    pool: ConnectionPool,
    schema: Option<String>,
    tables: Vec<String>,
}

impl Analyser {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            schema: None,
            tables: Vec::new(),
        }
    }

    /// Analyse a MySQL database other than the connection's default.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Restrict the run to the named tables and views. Empty means all.
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub async fn run(&self) -> DbResult<AnalysisReport> {
        let mut handle = self.pool.acquire().await?;
        let result = self.analyse_all(&mut handle).await;
        self.pool.release(handle).await;
        result
    }

    async fn analyse_all(&self, handle: &mut ConnectionHandle) -> DbResult<AnalysisReport> {
        let listed = SchemaInspector::list_tables(handle, self.schema.as_deref()).await?;
        for requested in &self.tables {
            if !listed.iter().any(|t| &t.name == requested) {
                warn!(table = %requested, "Requested table not found");
            }
        }

        let selected: Vec<&TableInfo> = listed
            .iter()
            .filter(|t| self.tables.is_empty() || self.tables.contains(&t.name))
            .collect();
        info!(count = selected.len(), "Starting database analysis");

        let mut report = AnalysisReport::default();
        for table in selected {
            match self.analyse_one(handle, table).await {
                Ok(entity) => {
                    debug!(
                        table = %entity.table_name,
                        table_type = %entity.table_type,
                        attributes = entity.attributes.len(),
                        "Analysed entity"
                    );
                    report.entities.push(entity);
                }
                Err(e) => {
                    warn!(table = %table.name, error = %e, "Skipping entity");
                    report.failures.push(AnalysisFailure {
                        name: table.name.clone(),
                        table_type: table.table_type,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            entities = report.entities.len(),
            failures = report.failures.len(),
            "Database analysis done"
        );
        Ok(report)
    }

    /// Build the metadata of one table or view.
    pub async fn analyse_one(
        &self,
        handle: &mut ConnectionHandle,
        table: &TableInfo,
    ) -> DbResult<EntityMetadata> {
        let columns =
            SchemaInspector::describe_columns(handle, &table.name, self.schema.as_deref()).await?;

        let entity = match table.table_type {
            TableType::Table => EntityMetadata::table(&table.name),
            TableType::View => {
                let definition =
                    SchemaInspector::view_definition(handle, &table.name, self.schema.as_deref())
                        .await?;
                let view = ViewDecomposer::decompose(&table.name, &definition)?;
                EntityMetadata::view(&table.name, view.statement)
                    .with_base_condition(view.base_condition)
                    .with_default_order_by(view.default_order_by)
                    .with_create_statement(view.create_statement)
            }
        };

        Ok(columns
            .into_iter()
            .fold(entity, |entity, column| entity.with_column_definition(column)))
    }
}

//! Schema-related data models.
//!
//! These types describe what introspection finds in the database before it is
//! turned into [`EntityMetadata`](crate::models::EntityMetadata).

use crate::models::SemanticType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub table_type: TableType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TableInfo {
    /// Create a new table info.
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            table_type,
            comment: None,
        }
    }

    /// Set the table comment/description.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Kind of entity: a base table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    #[default]
    Table,
    View,
}

impl TableType {
    /// Parse table type from database-specific string.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "view" | "system view" => Self::View,
            _ => Self::Table,
        }
    }

    /// Name as reported by `information_schema.TABLES.TABLE_TYPE`.
    pub fn as_sql_name(&self) -> &'static str {
        match self {
            Self::Table => "BASE TABLE",
            Self::View => "VIEW",
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Full declared type (e.g., `varchar(30)`, `bigint unsigned`)
    pub data_type: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
    /// Raw default expression as reported by the database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    /// Allowed values of `enum(...)` columns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// MySQL only (e.g., `auto_increment`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        semantic_type: SemanticType,
        nullable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            semantic_type,
            nullable,
            default_value: None,
            is_primary_key: false,
            options: Vec::new(),
            extra: None,
            comment: None,
        }
    }

    /// Set whether this is a primary key column.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Set the extra attributes (MySQL only).
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    /// Set the column comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Whether the database generates the value (auto increment).
    pub fn is_auto_increment(&self) -> bool {
        self.extra
            .as_deref()
            .is_some_and(|e| e.to_lowercase().contains("auto_increment"))
    }
}

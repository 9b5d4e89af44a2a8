//! Static entity metadata.
//!
//! An [`EntityMetadata`] describes one table or view: its attributes, keys,
//! mandatory base condition, default ordering and the SQL template every read
//! statement is rendered from. It is produced once by the analyser (or built by
//! hand) and shared read-only afterwards.

use crate::models::{ColumnDefinition, Record, TableType, Value};
use crate::query::dialect::quote_identifier;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic type of an attribute, derived from the declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Float,
    #[default]
    Text,
    Bytes,
    Date,
    DateTime,
    Json,
}

impl SemanticType {
    /// Convert a raw column default into a value of this type.
    ///
    /// Expressions such as `CURRENT_TIMESTAMP` or `uuid()` yield NULL since
    /// only the database can evaluate them.
    pub fn parse_default(&self, raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            return Value::Null;
        }
        let literal = match trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            Some(inner) => inner.replace("''", "'"),
            None if trimmed.contains('(') || trimmed.to_uppercase().starts_with("CURRENT_") => {
                return Value::Null;
            }
            None => trimmed.to_string(),
        };

        match self {
            Self::Integer => literal.parse::<i64>().map(Value::Int).unwrap_or(Value::Null),
            Self::Float => literal.parse::<f64>().map(Value::Float).unwrap_or(Value::Null),
            Self::Text => Value::String(literal),
            Self::Bytes => Value::Bytes(literal.into_bytes()),
            Self::Date => NaiveDate::parse_from_str(&literal, "%Y-%m-%d")
                .map(Value::Date)
                .unwrap_or(Value::Null),
            Self::DateTime => NaiveDateTime::parse_from_str(&literal, "%Y-%m-%d %H:%M:%S")
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
            Self::Json => serde_json::from_str(&literal)
                .map(Value::Json)
                .unwrap_or(Value::String(literal)),
        }
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Mandatory filter baked into an entity's read and keyed-update paths.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseCondition {
    /// No filter; every row belongs to the entity.
    #[default]
    Always,
    Filter(String),
}

impl BaseCondition {
    /// Interpret an SQL fragment; empty text and the literal `1` mean "always".
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = sql.trim();
        if trimmed.is_empty() || trimmed == "1" {
            Self::Always
        } else {
            Self::Filter(trimmed.to_string())
        }
    }

    pub fn as_filter(&self) -> Option<&str> {
        match self {
            Self::Always => None,
            Self::Filter(sql) => Some(sql),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }
}

impl std::fmt::Display for BaseCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => f.write_str("1"),
            Self::Filter(sql) => f.write_str(sql),
        }
    }
}

/// Rendered clause text for each template slot.
///
/// Each field holds the full clause including its keyword (`WHERE (...)`,
/// `LIMIT 10`) or an empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct Slots<'a> {
    pub projection: &'a str,
    pub where_clause: &'a str,
    pub order_by: &'a str,
    pub limit: &'a str,
    pub offset: &'a str,
}

impl<'a> Slots<'a> {
    fn lookup(&self, tail: &str) -> Option<(usize, &'a str)> {
        [
            (SqlTemplate::PROJECTION, self.projection),
            (SqlTemplate::WHERE, self.where_clause),
            (SqlTemplate::ORDER_BY, self.order_by),
            (SqlTemplate::LIMIT, self.limit),
            (SqlTemplate::OFFSET, self.offset),
        ]
        .into_iter()
        .find(|(slot, _)| tail.starts_with(slot))
        .map(|(slot, value)| (slot.len(), value))
    }
}

/// SELECT statement with the named slots `{PROJECTION}`, `{WHERE}`,
/// `{ORDER_BY}`, `{LIMIT}` and `{OFFSET}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SqlTemplate(String);

impl SqlTemplate {
    pub const PROJECTION: &'static str = "{PROJECTION}";
    pub const WHERE: &'static str = "{WHERE}";
    pub const ORDER_BY: &'static str = "{ORDER_BY}";
    pub const LIMIT: &'static str = "{LIMIT}";
    pub const OFFSET: &'static str = "{OFFSET}";

    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Template used for base tables.
    pub fn for_table(table_name: &str) -> Self {
        Self(format!(
            "SELECT {{PROJECTION}} FROM {} {{WHERE}} {{ORDER_BY}} {{LIMIT}} {{OFFSET}}",
            quote_identifier(table_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_slot(&self, slot: &str) -> bool {
        self.0.contains(slot)
    }

    /// True when `{ORDER_BY}` sits before a `GROUP BY` clause of the template.
    pub fn order_by_precedes_group_by(&self) -> bool {
        let upper = self.0.to_uppercase();
        match (upper.find(Self::ORDER_BY), upper.find("GROUP BY")) {
            (Some(order), Some(group)) => order < group,
            _ => false,
        }
    }

    /// Substitute every slot in a single pass.
    ///
    /// Substituted text is never rescanned, so a condition that happens to
    /// contain `{LIMIT}` is emitted verbatim.
    pub fn render(&self, slots: &Slots<'_>) -> String {
        let mut out = String::with_capacity(self.0.len() + 64);
        let mut rest = self.0.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            match slots.lookup(tail) {
                Some((len, value)) => {
                    out.push_str(value);
                    rest = &tail[len..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl std::fmt::Display for SqlTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static description of a table or view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub table_name: String,
    pub table_type: TableType,
    /// Attribute names in column order.
    pub attributes: Vec<String>,
    pub attribute_types: BTreeMap<String, SemanticType>,
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub base_condition: BaseCondition,
    /// ORDER BY body (without the keyword); empty for none.
    #[serde(default)]
    pub default_order_by: String,
    pub statement: SqlTemplate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnDefinition>,
    /// Normalized `CREATE VIEW` text for views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_statement: Option<String>,
}

impl EntityMetadata {
    /// Metadata for a base table with the standard template and no base condition.
    pub fn table(table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        let statement = SqlTemplate::for_table(&table_name);
        Self {
            table_name,
            table_type: TableType::Table,
            attributes: Vec::new(),
            attribute_types: BTreeMap::new(),
            primary_keys: Vec::new(),
            base_condition: BaseCondition::Always,
            default_order_by: String::new(),
            statement,
            columns: Vec::new(),
            create_statement: None,
        }
    }

    /// Metadata for a view rendered from `statement`.
    pub fn view(table_name: impl Into<String>, statement: SqlTemplate) -> Self {
        Self {
            table_type: TableType::View,
            statement,
            ..Self::table(table_name)
        }
    }

    /// Append an attribute.
    pub fn column(mut self, name: impl Into<String>, semantic_type: SemanticType) -> Self {
        let name = name.into();
        self.attribute_types.insert(name.clone(), semantic_type);
        self.attributes.push(name);
        self
    }

    /// Mark an attribute as (part of) the primary key.
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_keys.push(name.into());
        self
    }

    /// Append an introspected column, including its key flag.
    pub fn with_column_definition(mut self, column: ColumnDefinition) -> Self {
        if column.is_primary_key {
            self.primary_keys.push(column.name.clone());
        }
        self.attribute_types
            .insert(column.name.clone(), column.semantic_type);
        self.attributes.push(column.name.clone());
        self.columns.push(column);
        self
    }

    pub fn with_base_condition(mut self, base_condition: BaseCondition) -> Self {
        self.base_condition = base_condition;
        self
    }

    pub fn with_default_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.default_order_by = order_by.into();
        self
    }

    pub fn with_create_statement(mut self, create_statement: impl Into<String>) -> Self {
        self.create_statement = Some(create_statement.into());
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_types.contains_key(name)
    }

    pub fn attribute_type(&self, name: &str) -> Option<SemanticType> {
        self.attribute_types.get(name).copied()
    }

    pub fn is_view(&self) -> bool {
        self.table_type == TableType::View
    }

    /// The key column when the entity has exactly one integer primary key.
    pub fn single_integer_key(&self) -> Option<&str> {
        match self.primary_keys.as_slice() {
            [key] if self.attribute_type(key) == Some(SemanticType::Integer) => Some(key),
            _ => None,
        }
    }

    /// CamelCase model name derived from the snake_case table name.
    pub fn model_name(&self) -> String {
        self.table_name
            .to_lowercase()
            .split('_')
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect()
    }

    /// A record with every attribute set to its column default.
    pub fn new_record(&self) -> Record {
        self.attributes
            .iter()
            .map(|name| {
                let default = self
                    .columns
                    .iter()
                    .find(|c| &c.name == name)
                    .and_then(|c| {
                        c.default_value
                            .as_deref()
                            .map(|raw| c.semantic_type.parse_default(raw))
                    })
                    .unwrap_or(Value::Null);
                (name.clone(), default)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_condition_from_sql() {
        assert_eq!(BaseCondition::from_sql("1"), BaseCondition::Always);
        assert_eq!(BaseCondition::from_sql("  "), BaseCondition::Always);
        assert_eq!(
            BaseCondition::from_sql("deleted = 0"),
            BaseCondition::Filter("deleted = 0".into())
        );
        assert_eq!(BaseCondition::Always.to_string(), "1");
    }

    #[test]
    fn test_table_template_render() {
        let template = SqlTemplate::for_table("users");
        let sql = template.render(&Slots {
            projection: "*",
            where_clause: "WHERE (id = ?)",
            order_by: "",
            limit: "LIMIT 1",
            offset: "",
        });
        assert_eq!(sql, "SELECT * FROM `users` WHERE (id = ?)  LIMIT 1 ");
    }

    #[test]
    fn test_render_does_not_rescan_substituted_text() {
        let template = SqlTemplate::new("SELECT * FROM t {WHERE} {LIMIT}");
        let sql = template.render(&Slots {
            where_clause: "WHERE (note = '{LIMIT}')",
            limit: "LIMIT 5",
            ..Slots::default()
        });
        assert_eq!(sql, "SELECT * FROM t WHERE (note = '{LIMIT}') LIMIT 5");
    }

    #[test]
    fn test_render_keeps_unknown_braces() {
        let template = SqlTemplate::new("SELECT '{\"a\":1}' AS j {WHERE}");
        let sql = template.render(&Slots::default());
        assert_eq!(sql, "SELECT '{\"a\":1}' AS j ");
    }

    #[test]
    fn test_order_by_precedes_group_by() {
        assert!(
            SqlTemplate::new("SELECT a FROM t {WHERE} {ORDER_BY} GROUP BY a {LIMIT}")
                .order_by_precedes_group_by()
        );
        assert!(
            !SqlTemplate::new("SELECT a FROM t {WHERE} GROUP BY a {ORDER_BY} {LIMIT}")
                .order_by_precedes_group_by()
        );
        assert!(!SqlTemplate::for_table("t").order_by_precedes_group_by());
    }

    #[test]
    fn test_single_integer_key() {
        let entity = EntityMetadata::table("users")
            .column("id", SemanticType::Integer)
            .primary_key("id");
        assert_eq!(entity.single_integer_key(), Some("id"));

        let entity = EntityMetadata::table("codes")
            .column("code", SemanticType::Text)
            .primary_key("code");
        assert_eq!(entity.single_integer_key(), None);

        let entity = EntityMetadata::table("pairs")
            .column("a", SemanticType::Integer)
            .column("b", SemanticType::Integer)
            .primary_key("a")
            .primary_key("b");
        assert_eq!(entity.single_integer_key(), None);
    }

    #[test]
    fn test_model_name() {
        assert_eq!(EntityMetadata::table("order_details").model_name(), "OrderDetails");
        assert_eq!(EntityMetadata::table("V_ORDERS").model_name(), "VOrders");
        assert_eq!(EntityMetadata::table("employees").model_name(), "Employees");
    }

    #[test]
    fn test_parse_default() {
        assert_eq!(SemanticType::Integer.parse_default("42"), Value::Int(42));
        assert_eq!(SemanticType::Text.parse_default("'it''s'"), Value::String("it's".into()));
        assert_eq!(SemanticType::DateTime.parse_default("CURRENT_TIMESTAMP"), Value::Null);
        assert_eq!(SemanticType::Text.parse_default("uuid()"), Value::Null);
        assert_eq!(SemanticType::Float.parse_default("1.5"), Value::Float(1.5));
        assert_eq!(
            SemanticType::Date.parse_default("2020-01-31"),
            Value::Date(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap())
        );
        assert_eq!(SemanticType::Text.parse_default("NULL"), Value::Null);
    }

    #[test]
    fn test_new_record_uses_column_defaults() {
        let entity = EntityMetadata::table("employees")
            .with_column_definition(
                ColumnDefinition::new("id", "int(11)", SemanticType::Integer, false)
                    .with_primary_key(true),
            )
            .with_column_definition(
                ColumnDefinition::new("status", "varchar(10)", SemanticType::Text, false)
                    .with_default("active"),
            );
        let record = entity.new_record();
        assert_eq!(record.get("id"), Some(&Value::Null));
        assert_eq!(record.get_str("status"), Some("active"));
        assert_eq!(entity.primary_keys, vec!["id".to_string()]);
    }

    #[test]
    fn test_metadata_json_shape() {
        let entity = EntityMetadata::table("users")
            .column("id", SemanticType::Integer)
            .primary_key("id")
            .with_base_condition(BaseCondition::from_sql("active = 1"));
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["table_type"], "table");
        assert_eq!(json["base_condition"]["filter"], "active = 1");
        assert_eq!(
            json["statement"],
            "SELECT {PROJECTION} FROM `users` {WHERE} {ORDER_BY} {LIMIT} {OFFSET}"
        );
        let back: EntityMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }
}

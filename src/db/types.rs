//! Row decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's reported type name
//! 2. Database-specific decoders extract a [`Value`] for that category
//!
//! A decoder that cannot read the column as its category falls back to text,
//! then bytes, so an unexpected type never aborts a fetch.

use crate::models::{DatabaseType, Record, Value};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    DateTime,
    Date,
    Time,
    Unknown,
}

/// Classify a driver type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Temporal types before integers: "datetime" and "timestamp" contain "time"
    if lower.contains("datetime") || lower.contains("timestamp") {
        return TypeCategory::DateTime;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower == "year" || lower == "bit" {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "enum" || lower == "set" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw DECIMAL/NUMERIC text as sent by the server.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row to Record Trait
// =============================================================================

/// Trait for converting database rows to records.
pub trait RowToRecord {
    fn to_record(&self) -> Record;
}

impl RowToRecord for MySqlRow {
    fn to_record(&self) -> Record {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::MySQL);
                (col.name().to_string(), mysql::decode_column(self, idx, category))
            })
            .collect()
    }
}

impl RowToRecord for SqliteRow {
    fn to_record(&self) -> Record {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                (col.name().to_string(), sqlite::decode_column(self, idx, category))
            })
            .collect()
    }
}

/// Unsigned values beyond `i64::MAX` degrade to floats.
fn unsigned_value(v: u64) -> Value {
    i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64))
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        let decoded = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_bytes(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            TypeCategory::Date => decode_date(row, idx),
            TypeCategory::Time => decode_time(row, idx),
            TypeCategory::Text | TypeCategory::Unknown => None,
        };
        decoded.unwrap_or_else(|| decode_text(row, idx))
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Option<Value> {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => Some(
                v.0.parse::<f64>()
                    .map(Value::Float)
                    .unwrap_or(Value::String(v.0)),
            ),
            Ok(None) => Some(Value::Null),
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                None
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<Value> {
        // Check NULL first
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Some(Value::Null);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Some(Value::Int(v));
        }
        // Try unsigned types
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return Some(Value::Int(v.into()));
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return Some(unsigned_value(v));
        }
        None
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Option<Value> {
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return Some(v.map(Value::Float).unwrap_or(Value::Null));
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return Some(v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null));
        }
        None
    }

    fn decode_bytes(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Bytes).unwrap_or(Value::Null))
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Option<Value> {
        // MySQL JSON type should be decoded as serde_json::Value directly
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Json).unwrap_or(Value::Null))
    }

    fn decode_datetime(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .map(|v| v.map(Value::DateTime).unwrap_or(Value::Null))
    }

    fn decode_date(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Date).unwrap_or(Value::Null))
    }

    fn decode_time(row: &MySqlRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<NaiveTime>, _>(idx)
            .ok()
            .map(|v| v.map(|t| Value::String(t.to_string())).unwrap_or(Value::Null))
    }

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn decode_text(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
        match row.try_get::<Option<Vec<u8>>, _>(idx) {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            _ => Value::Null,
        }
    }
}

mod sqlite {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Value {
        let decoded = match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_bytes(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            TypeCategory::Date => decode_date(row, idx),
            TypeCategory::Json => decode_json_text(row, idx),
            _ => None,
        };
        decoded.unwrap_or_else(|| decode_dynamic(row, idx))
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Int).unwrap_or(Value::Null))
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Float).unwrap_or(Value::Null))
    }

    fn decode_bytes(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Bytes).unwrap_or(Value::Null))
    }

    fn decode_datetime(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .map(|v| v.map(Value::DateTime).unwrap_or(Value::Null))
    }

    fn decode_date(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Date).unwrap_or(Value::Null))
    }

    fn decode_json_text(row: &SqliteRow, idx: usize) -> Option<Value> {
        let text = row.try_get::<Option<String>, _>(idx).ok()?;
        Some(match text {
            Some(s) => serde_json::from_str(&s)
                .map(Value::Json)
                .unwrap_or(Value::String(s)),
            None => Value::Null,
        })
    }

    /// SQLite columns are dynamically typed; try the storage classes in turn.
    fn decode_dynamic(row: &SqliteRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return Value::Float(v);
        }
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }
}

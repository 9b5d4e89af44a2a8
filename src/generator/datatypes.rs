//! Mapping of declared column types to [`SemanticType`]s.

use crate::models::SemanticType;
use tracing::warn;

/// Declared type split into its base name and parenthesized size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredType {
    /// Lower-cased leading identifier (`varchar`, `int`, `enum`).
    pub base: String,
    /// Text between the parentheses right after the base name, if non-empty.
    pub size: Option<String>,
}

/// Split `varchar(255)` into `varchar` and `255`.
///
/// Anything after the size (`unsigned`, `zerofill`, a second word) is ignored.
pub fn split_declared_type(declared: &str) -> DeclaredType {
    let declared = declared.trim();
    let base_len = declared
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(declared.len());
    let base = declared[..base_len].to_lowercase();

    let size = declared[base_len..]
        .strip_prefix('(')
        .and_then(|rest| rest.find(')').map(|end| &rest[..end]))
        .filter(|inner| !inner.is_empty())
        .map(str::to_string);

    DeclaredType { base, size }
}

/// Semantic type of a known base type name.
pub fn semantic_type_of(base: &str) -> Option<SemanticType> {
    let semantic = match base {
        "bigint" | "bit" | "int" | "integer" | "mediumint" | "smallint" | "tinyint" => {
            SemanticType::Integer
        }
        "float" | "decimal" | "double" | "real" | "numeric" => SemanticType::Float,
        "blob" | "mediumblob" | "longblob" | "tinyblob" | "binary" => SemanticType::Bytes,
        "date" => SemanticType::Date,
        "datetime" | "timestamp" => SemanticType::DateTime,
        "char" | "enum" | "text" | "mediumtext" | "longtext" | "tinytext" | "varbinary"
        | "varchar" | "set" | "time" | "year" => SemanticType::Text,
        "json" => SemanticType::Json,
        _ => return None,
    };
    Some(semantic)
}

/// Result of mapping one column's declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTypeInfo {
    pub semantic_type: SemanticType,
    /// Allowed values of an `enum(...)` column; empty otherwise.
    pub options: Vec<String>,
}

/// Map a declared column type. Unknown types fall back to text.
pub fn map_column_type(declared: &str, table: &str, column: &str) -> ColumnTypeInfo {
    let parsed = split_declared_type(declared);
    let semantic_type = semantic_type_of(&parsed.base).unwrap_or_else(|| {
        warn!(
            table = %table,
            column = %column,
            declared_type = %declared,
            "Unknown column type, treating it as text"
        );
        SemanticType::Text
    });

    let options = match (parsed.base.as_str(), parsed.size.as_deref()) {
        ("enum", Some(size)) => enum_options(size),
        _ => Vec::new(),
    };

    ColumnTypeInfo {
        semantic_type,
        options,
    }
}

/// Parse the quoted option list of an enum: `'a','b c','it''s'`.
pub fn enum_options(size: &str) -> Vec<String> {
    let mut options = Vec::new();
    let mut chars = size.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut option = String::new();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    option.push('\'');
                    continue;
                }
                break;
            }
            option.push(c);
        }
        options.push(option);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_declared_type() {
        assert_eq!(
            split_declared_type("varchar(255)"),
            DeclaredType {
                base: "varchar".into(),
                size: Some("255".into())
            }
        );
        assert_eq!(
            split_declared_type("int(10) unsigned"),
            DeclaredType {
                base: "int".into(),
                size: Some("10".into())
            }
        );
        assert_eq!(
            split_declared_type("INTEGER"),
            DeclaredType {
                base: "integer".into(),
                size: None
            }
        );
        assert_eq!(split_declared_type("decimal()").size, None);
        assert_eq!(split_declared_type("").base, "");
    }

    #[test]
    fn test_known_types() {
        assert_eq!(semantic_type_of("tinyint"), Some(SemanticType::Integer));
        assert_eq!(semantic_type_of("decimal"), Some(SemanticType::Float));
        assert_eq!(semantic_type_of("mediumblob"), Some(SemanticType::Bytes));
        assert_eq!(semantic_type_of("timestamp"), Some(SemanticType::DateTime));
        assert_eq!(semantic_type_of("date"), Some(SemanticType::Date));
        assert_eq!(semantic_type_of("varbinary"), Some(SemanticType::Text));
        assert_eq!(semantic_type_of("json"), Some(SemanticType::Json));
        assert_eq!(semantic_type_of("geometry"), None);
    }

    #[test]
    fn test_map_column_type() {
        let info = map_column_type("bigint(20) unsigned", "users", "id");
        assert_eq!(info.semantic_type, SemanticType::Integer);
        assert!(info.options.is_empty());

        let info = map_column_type("geometry", "places", "shape");
        assert_eq!(info.semantic_type, SemanticType::Text);

        let info = map_column_type("REAL", "prices", "amount");
        assert_eq!(info.semantic_type, SemanticType::Float);
    }

    #[test]
    fn test_enum_options() {
        let info = map_column_type("enum('new','open','it''s closed')", "tickets", "state");
        assert_eq!(info.semantic_type, SemanticType::Text);
        assert_eq!(info.options, vec!["new", "open", "it's closed"]);
        assert_eq!(enum_options("'a,b','c'"), vec!["a,b", "c"]);
        assert!(enum_options("").is_empty());
    }
}

//! SQL dialect differences between MySQL and SQLite.
//!
//! Only the fragments the composer emits differ; everything else is shared
//! text. Both dialects accept backtick-quoted identifiers and `?` placeholders.

use crate::models::DatabaseType;

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn placeholder(&self) -> &'static str {
        "?"
    }

    /// Comma separated placeholders for `count` values.
    pub fn placeholders(&self, count: usize) -> String {
        vec![self.placeholder(); count].join(", ")
    }

    pub fn begin_statement(&self) -> &'static str {
        match self {
            Self::MySql => "START TRANSACTION",
            Self::Sqlite => "BEGIN",
        }
    }

    pub fn commit_statement(&self) -> &'static str {
        "COMMIT"
    }

    pub fn rollback_statement(&self) -> &'static str {
        "ROLLBACK"
    }

    /// `INSERT INTO` or its duplicate-ignoring variant.
    pub fn insert_keyword(&self, ignore: bool) -> &'static str {
        match (self, ignore) {
            (_, false) => "INSERT INTO",
            (Self::MySql, true) => "INSERT IGNORE INTO",
            (Self::Sqlite, true) => "INSERT OR IGNORE INTO",
        }
    }

    /// Column list and VALUES clause for an insert.
    pub fn insert_values(&self, columns: &[String]) -> String {
        if columns.is_empty() {
            return match self {
                Self::MySql => "() VALUES ()".to_string(),
                Self::Sqlite => "DEFAULT VALUES".to_string(),
            };
        }
        let quoted: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        format!(
            "({}) VALUES ({})",
            quoted.join(", "),
            self.placeholders(columns.len())
        )
    }

    /// Upsert tail that overwrites `columns` with the incoming values.
    pub fn upsert_clause(&self, columns: &[String]) -> String {
        match self {
            Self::MySql => {
                let assignments: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let q = quote_identifier(c);
                        format!("{q} = VALUES({q})")
                    })
                    .collect();
                format!("ON DUPLICATE KEY UPDATE {}", assignments.join(", "))
            }
            Self::Sqlite => {
                let assignments: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let q = quote_identifier(c);
                        format!("{q} = excluded.{q}")
                    })
                    .collect();
                format!("ON CONFLICT DO UPDATE SET {}", assignments.join(", "))
            }
        }
    }

    /// Trailing `LIMIT 1` for single-row UPDATE and DELETE.
    pub fn single_row_limit(&self) -> Option<&'static str> {
        match self {
            Self::MySql => Some("LIMIT 1"),
            Self::Sqlite => None,
        }
    }

    /// Whether DELETE accepts ORDER BY and LIMIT.
    pub fn supports_delete_limit(&self) -> bool {
        matches!(self, Self::MySql)
    }
}

impl From<DatabaseType> for Dialect {
    fn from(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::MySQL => Self::MySql,
            DatabaseType::SQLite => Self::Sqlite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "`users`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_insert_keyword() {
        assert_eq!(Dialect::MySql.insert_keyword(true), "INSERT IGNORE INTO");
        assert_eq!(Dialect::Sqlite.insert_keyword(true), "INSERT OR IGNORE INTO");
        assert_eq!(Dialect::Sqlite.insert_keyword(false), "INSERT INTO");
    }

    #[test]
    fn test_insert_values() {
        assert_eq!(
            Dialect::MySql.insert_values(&cols(&["a", "b"])),
            "(`a`, `b`) VALUES (?, ?)"
        );
        assert_eq!(Dialect::MySql.insert_values(&[]), "() VALUES ()");
        assert_eq!(Dialect::Sqlite.insert_values(&[]), "DEFAULT VALUES");
    }

    #[test]
    fn test_upsert_clause() {
        assert_eq!(
            Dialect::MySql.upsert_clause(&cols(&["name", "age"])),
            "ON DUPLICATE KEY UPDATE `name` = VALUES(`name`), `age` = VALUES(`age`)"
        );
        assert_eq!(
            Dialect::Sqlite.upsert_clause(&cols(&["name"])),
            "ON CONFLICT DO UPDATE SET `name` = excluded.`name`"
        );
    }

    #[test]
    fn test_transaction_statements() {
        assert_eq!(Dialect::MySql.begin_statement(), "START TRANSACTION");
        assert_eq!(Dialect::Sqlite.begin_statement(), "BEGIN");
        assert_eq!(Dialect::from(DatabaseType::SQLite), Dialect::Sqlite);
    }
}

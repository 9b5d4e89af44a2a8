//! Backend selection.

use serde::{Deserialize, Serialize};

/// Database backends daogen can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Includes MariaDB
    #[default]
    MySQL,
    SQLite,
}

impl DatabaseType {
    const SCHEMES: &'static [(&'static str, DatabaseType)] = &[
        ("mysql:", DatabaseType::MySQL),
        ("mariadb:", DatabaseType::MySQL),
        ("sqlite:", DatabaseType::SQLite),
    ];

    /// Backend named by the URL scheme, case-insensitively.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.trim_start().to_ascii_lowercase();
        Self::SCHEMES
            .iter()
            .find(|(scheme, _)| lower.starts_with(scheme))
            .map(|(_, db_type)| *db_type)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        })
    }
}

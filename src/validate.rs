//! Table name validation and SQL identifier quoting.
//!
//! SQL identifiers cannot be bound as statement parameters, so the table
//! name is the one piece of caller input that ends up inside SQL text.
//! [`TableName`] is the only way to get it there: parsing rejects names
//! that are never legitimate, and [`TableName::quoted`] applies SQLite's
//! escaping rule for double-quoted identifiers (embedded `"` doubled).

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Longest accepted table name, in bytes.
pub const MAX_TABLE_NAME_LEN: usize = 128;

/// Prefix SQLite reserves for its own tables.
const RESERVED_PREFIX: &str = "sqlite_";

/// A validated table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    /// Validate a raw table name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the name is empty, too long,
    /// contains NUL or other control characters, or falls in the reserved
    /// `sqlite_` namespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let reject = |reason: &str| Error::InvalidIdentifier {
            name: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.trim().is_empty() {
            return Err(reject("name is empty"));
        }
        if raw.len() > MAX_TABLE_NAME_LEN {
            return Err(reject("name is longer than 128 bytes"));
        }
        if raw.chars().any(char::is_control) {
            return Err(reject("name contains control characters"));
        }
        if raw
            .get(..RESERVED_PREFIX.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(RESERVED_PREFIX))
        {
            return Err(reject("the sqlite_ prefix is reserved"));
        }

        Ok(Self(raw.to_string()))
    }

    /// The name as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a double-quoted SQL identifier.
    #[must_use]
    pub fn quoted(&self) -> String {
        quote_identifier(&self.0)
    }

    /// A filesystem-safe rendering for staging and export file names.
    ///
    /// Anything outside `[A-Za-z0-9_-]` becomes `_`.
    #[must_use]
    pub fn file_label(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Quote any identifier (table or column) for SQLite.
#[must_use]
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let name = TableName::parse("productos").unwrap();
        assert_eq!(name.as_str(), "productos");
        assert_eq!(name.quoted(), "\"productos\"");
        assert_eq!(name.to_string(), "productos");
    }

    #[test]
    fn test_quoting_doubles_embedded_quotes() {
        let name = TableName::parse("odd\"; DROP TABLE x; --").unwrap();
        assert_eq!(name.quoted(), "\"odd\"\"; DROP TABLE x; --\"");
    }

    #[test]
    fn test_rejects_empty_and_blank() {
        assert!(matches!(
            TableName::parse(""),
            Err(Error::InvalidIdentifier { .. })
        ));
        assert!(TableName::parse("   ").is_err());
    }

    #[test]
    fn test_rejects_control_characters() {
        assert!(TableName::parse("bad\0name").is_err());
        assert!(TableName::parse("bad\nname").is_err());
    }

    #[test]
    fn test_rejects_reserved_prefix() {
        assert!(TableName::parse("sqlite_master").is_err());
        assert!(TableName::parse("SQLITE_sequence").is_err());
        assert!(TableName::parse("sqlite").is_ok());
    }

    #[test]
    fn test_rejects_overlong() {
        let long = "t".repeat(MAX_TABLE_NAME_LEN + 1);
        assert!(TableName::parse(&long).is_err());
        let max = "t".repeat(MAX_TABLE_NAME_LEN);
        assert!(TableName::parse(&max).is_ok());
    }

    #[test]
    fn test_file_label() {
        let name = TableName::parse("my table/ñ").unwrap();
        assert_eq!(name.file_label(), "my_table__");
    }

    #[test]
    fn test_from_str() {
        let name: TableName = "items".parse().unwrap();
        assert_eq!(name.as_str(), "items");
    }
}

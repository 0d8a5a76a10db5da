//! Schema catalog types and the introspection collaborator seam.
//!
//! The catalog is a read-only snapshot supplied per validation call by an
//! external introspection collaborator; the validator never caches or
//! mutates it. Lookups are case-insensitive because generated SQL and
//! live schemas rarely agree on casing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One column of a catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name as declared.
    pub name: String,
    /// Declared SQL type, verbatim (e.g. `"INTEGER"`, `"VARCHAR(255)"`).
    #[serde(rename = "type")]
    pub declared_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    #[serde(rename = "pk")]
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    /// Convenience constructor for a plain nullable column.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            is_primary_key: false,
        }
    }

    /// Mark this column as the (non-null) primary key.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }
}

/// Read-only snapshot of the relational schema: table name to its ordered
/// columns. May legitimately be empty (a bare database).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaCatalog {
    tables: HashMap<String, Vec<ColumnDescriptor>>,
}

impl SchemaCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from `(table, columns)` pairs.
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<ColumnDescriptor>)>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(|(n, c)| (n.into(), c)).collect(),
        }
    }

    /// Add or replace a table.
    pub fn insert_table(&mut self, name: impl Into<String>, columns: Vec<ColumnDescriptor>) {
        self.tables.insert(name.into(), columns);
    }

    /// Case-insensitive table existence check.
    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive column lookup within a table.
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns_of(table)
            .map(|cols| cols.iter().any(|c| c.name.eq_ignore_ascii_case(column)))
            .unwrap_or(false)
    }

    /// Columns of a table, case-insensitive on the table name.
    pub fn columns_of(&self, table: &str) -> Option<&[ColumnDescriptor]> {
        self.tables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(table))
            .map(|(_, v)| v.as_slice())
    }

    /// Number of tables in the snapshot.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the snapshot holds no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Schema-introspection collaborator. Supplies a fresh catalog snapshot
/// on demand; may fail (catalog unavailable), in which case schema
/// validation fails open rather than rejecting the statement.
pub trait SchemaProvider: Send + Sync {
    /// Produce a point-in-time schema snapshot.
    fn schema_catalog(&self) -> Result<SchemaCatalog>;
}

/// Outcome of one validation call. Transient: created per call, never
/// retained by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether every stage passed.
    pub valid: bool,
    /// First failing stage's explanation, or a success message.
    pub message: String,
}

impl ValidationResult {
    /// A passing result.
    pub fn valid(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
        }
    }

    /// A failing result.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }

    /// Whether the statement may be handed to the execution collaborator.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_tables([(
            "Customers",
            vec![
                ColumnDescriptor::new("id", "INTEGER").primary_key(),
                ColumnDescriptor::new("email", "VARCHAR(255)"),
            ],
        )])
    }

    #[test]
    fn test_contains_table_case_insensitive() {
        let catalog = catalog();
        assert!(catalog.contains_table("customers"));
        assert!(catalog.contains_table("CUSTOMERS"));
        assert!(!catalog.contains_table("orders"));
    }

    #[test]
    fn test_has_column_case_insensitive() {
        let catalog = catalog();
        assert!(catalog.has_column("customers", "EMAIL"));
        assert!(!catalog.has_column("customers", "phone"));
        assert!(!catalog.has_column("orders", "id"), "unknown table has no columns");
    }

    #[test]
    fn test_primary_key_builder_clears_nullable() {
        let col = ColumnDescriptor::new("id", "INTEGER").primary_key();
        assert!(col.is_primary_key);
        assert!(!col.nullable);
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = SchemaCatalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);
        assert!(!catalog.contains_table("anything"));
    }

    #[test]
    fn test_catalog_serde_wire_shape() {
        // The wire shape matches the introspection payload: a map of table
        // name to column objects with `type` and `pk` keys.
        let json = r#"{
            "customers": [
                {"name": "id", "type": "INTEGER", "nullable": false, "pk": true}
            ]
        }"#;
        let catalog: SchemaCatalog = serde_json::from_str(json).unwrap();
        assert!(catalog.contains_table("customers"));
        let cols = catalog.columns_of("customers").unwrap();
        assert_eq!(cols[0].declared_type, "INTEGER");
        assert!(cols[0].is_primary_key);
    }

    #[test]
    fn test_validation_result_constructors() {
        let ok = ValidationResult::valid("Query is valid");
        assert!(ok.is_valid());
        let bad = ValidationResult::invalid("nope");
        assert!(!bad.is_valid());
        assert_eq!(bad.message, "nope");
    }
}

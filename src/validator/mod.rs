//! SQL safety and structural validation.
//!
//! Every generated statement passes through [`SqlSafetyValidator`] before
//! it may reach the execution collaborator. Validation is an ordered
//! pipeline — emptiness, unsafe keywords, syntax, schema references,
//! statement count — and the first failing stage decides the result.
//! Rejections are values ([`ValidationResult`]), never errors.
//!
//! The schema stage is best-effort: if the introspection collaborator
//! fails, the stage is skipped (fail-open) with a loud warning rather
//! than rejecting the statement. The validator itself is stateless and
//! safe for unsynchronized concurrent use; the catalog it receives is an
//! immutable snapshot owned by the caller.

pub mod schema;

pub use schema::{ColumnDescriptor, SchemaCatalog, SchemaProvider, ValidationResult};

use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{Expr, ObjectName, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::warn;

/// Mutating/DDL keywords that are never allowed in generated statements.
pub const UNSAFE_KEYWORDS: [&str; 10] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "TRUNCATE", "ALTER", "CREATE", "REPLACE", "GRANT",
    "REVOKE",
];

static UNSAFE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b({})\b", UNSAFE_KEYWORDS.join("|"))).unwrap());

static LINE_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)--.*$").unwrap());

static BLOCK_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

/// Table, alias, and qualified-column references collected from a parsed
/// statement. Names are lowercased for case-insensitive catalog lookups.
#[derive(Debug, Default)]
struct ReferenceCollector {
    tables: BTreeSet<String>,
    aliases: HashMap<String, String>,
    columns: Vec<(String, String)>,
}

impl Visitor for ReferenceCollector {
    type Break = ();

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        if let Some(ident) = relation.0.last() {
            self.tables.insert(ident.value.to_lowercase());
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<()> {
        if let TableFactor::Table {
            name,
            alias: Some(alias),
            ..
        } = table_factor
        {
            if let Some(ident) = name.0.last() {
                self.aliases
                    .insert(alias.name.value.to_lowercase(), ident.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        // Only qualified references are checkable; bare identifiers and
        // wildcards are accepted unchecked.
        if let Expr::CompoundIdentifier(parts) = expr {
            if parts.len() >= 2 {
                let column = parts[parts.len() - 1].value.to_lowercase();
                let qualifier = parts[parts.len() - 2].value.to_lowercase();
                self.columns.push((qualifier, column));
            }
        }
        ControlFlow::Continue(())
    }
}

/// Multi-stage gate for candidate SQL statements. Stateless; construct
/// once and share freely, or construct per call — both are free.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSafetyValidator;

impl SqlSafetyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate `sql` against a caller-supplied schema snapshot.
    pub fn validate(&self, sql: &str, catalog: &SchemaCatalog) -> ValidationResult {
        self.validate_inner(sql, Some(catalog))
    }

    /// Validate `sql`, fetching the schema snapshot from the introspection
    /// collaborator. An introspection failure skips the schema stage
    /// (fail-open) — it never rejects the statement on its own.
    pub fn validate_with(&self, sql: &str, provider: &dyn SchemaProvider) -> ValidationResult {
        match provider.schema_catalog() {
            Ok(catalog) => self.validate_inner(sql, Some(&catalog)),
            Err(e) => {
                warn!(
                    error = %e,
                    "schema introspection failed; schema validation skipped (fail-open)"
                );
                self.validate_inner(sql, None)
            }
        }
    }

    fn validate_inner(&self, sql: &str, catalog: Option<&SchemaCatalog>) -> ValidationResult {
        let trimmed = sql.trim();

        // Stage 1: emptiness.
        if trimmed.is_empty() {
            return ValidationResult::invalid("Empty query provided");
        }

        // Stage 2: unsafe keyword denylist, word-boundary matched.
        if let Some(captures) = UNSAFE_RE.captures(trimmed) {
            let keyword = captures[1].to_uppercase();
            return ValidationResult::invalid(format!(
                "Unsafe operation detected: {keyword} is not allowed"
            ));
        }

        // Stage 3: syntax.
        let statements = match Parser::parse_sql(&PostgreSqlDialect {}, trimmed) {
            Ok(statements) => statements,
            Err(e) => return ValidationResult::invalid(format!("Syntax error: {e}")),
        };
        let Some(statement) = statements.first() else {
            return ValidationResult::invalid("Failed to parse SQL query");
        };

        // Stage 4: schema references (skipped when no snapshot available).
        if let Some(catalog) = catalog {
            if let Some(failure) = check_schema(statement, catalog) {
                return failure;
            }
        }

        // Stage 5: statement count — a semicolon is allowed only as the
        // final character, so nothing can smuggle a second statement.
        let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
        if body.contains(';') {
            return ValidationResult::invalid("Multiple statements not allowed");
        }

        ValidationResult::valid("Query is valid")
    }
}

/// Check every table and resolvable qualified column reference against the
/// catalog. Returns the first failure, if any.
fn check_schema(statement: &Statement, catalog: &SchemaCatalog) -> Option<ValidationResult> {
    let mut refs = ReferenceCollector::default();
    let _ = statement.visit(&mut refs);

    for table in &refs.tables {
        if !catalog.contains_table(table) {
            return Some(ValidationResult::invalid(format!(
                "Table '{table}' does not exist in schema"
            )));
        }
    }

    for (qualifier, column) in &refs.columns {
        // A qualifier resolves either directly to a catalog table or
        // through a collected alias; anything else is unverifiable and
        // accepted as-is.
        let table = if catalog.contains_table(qualifier) {
            Some(qualifier.clone())
        } else {
            refs.aliases
                .get(qualifier)
                .filter(|t| catalog.contains_table(t))
                .cloned()
        };
        if let Some(table) = table {
            if !catalog.has_column(&table, column) {
                return Some(ValidationResult::invalid(format!(
                    "Column '{column}' does not exist in table '{table}'"
                )));
            }
        }
    }

    None
}

/// Extract the (lowercased, deduplicated) table names referenced by the
/// first statement of `sql`. Unparseable input yields an empty list.
pub fn extract_tables(sql: &str) -> Vec<String> {
    let Ok(statements) = Parser::parse_sql(&PostgreSqlDialect {}, sql) else {
        return Vec::new();
    };
    let Some(statement) = statements.first() else {
        return Vec::new();
    };
    let mut refs = ReferenceCollector::default();
    let _ = statement.visit(&mut refs);
    refs.tables.into_iter().collect()
}

/// Strip SQL comments and collapse whitespace, for logging and prompt
/// feedback. Not a safety mechanism — validation runs on the raw text.
pub fn sanitize_statement(sql: &str) -> String {
    let without_line = LINE_COMMENT_RE.replace_all(sql, "");
    let without_block = BLOCK_COMMENT_RE.replace_all(&without_line, "");
    without_block.split_whitespace().collect::<Vec<_>>().join(" ")
}

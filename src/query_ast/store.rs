//! Row store and schema catalog seams.
//!
//! The engine never talks to a database directly. A [`RowStore`] hands out
//! documents for one table, filtered by simple ANDed predicates, and a
//! [`SchemaCatalog`] describes which tables and columns a project has.
//! Implementations live in [`super::stores`].

use std::cmp::Ordering;

use async_trait::async_trait;
use regex::Regex;

use super::errors::StoreError;
use crate::models::enums::CompareOp;
use crate::models::structs::{Document, ProjectSchema, Row, Scalar, TableSchema};

/// Single pushed-down filter: `<column> <op> <value>` on a bare column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Scalar,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: CompareOp, value: Scalar) -> Self {
        Self { column: column.into(), op, value }
    }

    /// In-process evaluation against a document row.
    ///
    /// A missing or null cell only satisfies `!=`.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(&self.column).unwrap_or(&Scalar::Null);
        let ord = cell.compare(&self.value);
        match self.op {
            CompareOp::Eq => ord == Some(Ordering::Equal),
            CompareOp::NotEq => ord != Some(Ordering::Equal),
            CompareOp::Gt => ord == Some(Ordering::Greater),
            CompareOp::Lt => ord == Some(Ordering::Less),
            CompareOp::GtEq => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
            CompareOp::LtEq => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Like => !cell.is_null() && like_match(&self.value.to_string(), &cell.to_string()),
            // never pushed down
            CompareOp::In => false,
        }
    }
}

/// SQL LIKE with `%` (any run) and `_` (one char), case-sensitive.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                re.push_str(&regex::escape(&literal));
                literal.clear();
                re.push_str(if ch == '%' { ".*" } else { "." });
            }
            c => literal.push(c),
        }
    }
    re.push_str(&regex::escape(&literal));
    re.push('$');
    Regex::new(&re).map(|r| r.is_match(text)).unwrap_or(false)
}

/// Source of document rows for one table.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Fetch at most `limit` documents of `table` satisfying every predicate.
    async fn fetch_rows(
        &self,
        table: &TableSchema,
        predicates: &[Predicate],
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;
}

/// Source of table metadata for a project.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    async fn project_schema(&self, project_id: &str) -> Result<ProjectSchema, StoreError>;
}

//! Column reference resolution over plain and join-merged rows.
//!
//! Rows from the FROM table keep bare keys (`name`). Each join adds the
//! right table's columns as `table.column`, so the same reference may live
//! under several spellings depending on where it came from.

use super::ast::AliasMap;
use crate::models::structs::{Row, Scalar};

/// Split `p.col` into `(Some("p"), "col")`; a bare name has no prefix.
pub fn split_column(column: &str) -> (Option<&str>, &str) {
    match column.split_once('.') {
        Some((prefix, bare)) if !prefix.is_empty() && !bare.is_empty() => (Some(prefix), bare),
        _ => (None, column),
    }
}

/// The part after the last dot.
pub fn bare_name(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

#[derive(Debug, Clone)]
pub struct Resolver {
    base_table: String,
    tables: Vec<String>,
    aliases: AliasMap,
}

impl Resolver {
    /// `tables` is the FROM table followed by the join targets, in query order.
    pub fn new(tables: Vec<String>, aliases: AliasMap) -> Self {
        let base_table = tables.first().cloned().unwrap_or_default();
        Self { base_table, tables, aliases }
    }

    pub fn base_table(&self) -> &str {
        &self.base_table
    }

    /// Alias or real table name -> real table name. Unknown prefixes pass through.
    pub fn table_for_prefix<'a>(&'a self, prefix: &'a str) -> &'a str {
        self.aliases.get(prefix).map(String::as_str).unwrap_or(prefix)
    }

    /// Strict lookup used by projection and the join key extraction.
    ///
    /// Order: exact key, then the alias-resolved `table.column` key, then
    /// the bare key when the reference points at the base table. A bare
    /// reference that is not a key of the row is looked up in the joined
    /// tables' qualified keys, first table first.
    pub fn lookup<'r>(&self, row: &'r Row, column: &str) -> Option<&'r Scalar> {
        if let Some(v) = row.get(column) {
            return Some(v);
        }
        match split_column(column) {
            (Some(prefix), bare) => {
                let table = self.table_for_prefix(prefix);
                row.get(&format!("{}.{}", table, bare))
                    .or_else(|| (table == self.base_table).then(|| row.get(bare)).flatten())
            }
            (None, bare) => self
                .tables
                .iter()
                .skip(1)
                .find_map(|t| row.get(&format!("{}.{}", t, bare))),
        }
    }

    /// Tolerant lookup used by grouping and aggregation.
    ///
    /// Order: exact key, alias-resolved qualified key, the bare key when the
    /// prefix names the base table, first key ending in `.<bare>` in row
    /// order, then the bare suffix.
    pub fn lookup_lenient<'r>(&self, row: &'r Row, column: &str) -> Option<&'r Scalar> {
        if let Some(v) = row.get(column) {
            return Some(v);
        }
        let bare = bare_name(column);
        if let (Some(prefix), _) = split_column(column) {
            let table = self.table_for_prefix(prefix);
            if let Some(v) = row.get(&format!("{}.{}", table, bare)) {
                return Some(v);
            }
            if table == self.base_table
                && let Some(v) = row.get(bare)
            {
                return Some(v);
            }
        }
        let suffix = format!(".{}", bare);
        row.iter()
            .find(|(k, _)| k.ends_with(&suffix))
            .map(|(_, v)| v)
            .or_else(|| row.get(bare))
    }
}

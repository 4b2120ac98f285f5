//! Nested-loop INNER join over document rows.
//!
//! Merge rule: the left row is copied as-is and every known column of the
//! right table is added as `<rightTable>.<column>` (null when the document
//! lacks it). Only the right side is qualified, so after two joins the
//! base table's keys are still bare while each joined table's keys carry
//! their table name.

use super::ast::{Join, JoinOn};
use super::resolver::{Resolver, bare_name, split_column};
use crate::models::structs::{Document, Row, Scalar};

/// Whether `operand` names the table introduced by `join` (by alias or by name).
fn refers_to_join(join: &Join, operand: &str) -> bool {
    match split_column(operand) {
        (Some(prefix), _) => join.alias.as_deref() == Some(prefix) || prefix == join.table,
        (None, _) => false,
    }
}

/// ON operands with the already-joined side on the left, so both
/// `ON u.id = o.user_id` and `ON o.user_id = u.id` work when joining `orders o`.
pub fn orient(join: &Join) -> JoinOn {
    let on = &join.on;
    if refers_to_join(join, &on.left) && !refers_to_join(join, &on.right) {
        JoinOn { left: on.right.clone(), operator: on.operator.clone(), right: on.left.clone() }
    } else {
        on.clone()
    }
}

/// Real table the left ON operand reads from; a bare operand means the base table.
pub fn left_table<'a>(on: &'a JoinOn, resolver: &'a Resolver) -> &'a str {
    match split_column(&on.left) {
        (Some(prefix), _) => resolver.table_for_prefix(prefix),
        (None, _) => resolver.base_table(),
    }
}

/// Left key: `<leftTable>.<col>` when that key exists, else the bare `col`.
fn left_key<'r>(row: &'r Row, left_table: &str, column: &str) -> Option<&'r Scalar> {
    row.get(&format!("{}.{}", left_table, column)).or_else(|| row.get(column))
}

pub fn inner_join(
    left_rows: &[Row],
    right_docs: &[Document],
    on: &JoinOn,
    left_table: &str,
    right_table: &str,
    right_columns: &[String],
) -> Vec<Row> {
    let left_col = bare_name(&on.left);
    let right_col = bare_name(&on.right);
    let qualified: Vec<(String, &String)> = right_columns
        .iter()
        .map(|c| (format!("{}.{}", right_table, c), c))
        .collect();

    let mut out = Vec::new();
    for left in left_rows {
        let Some(lv) = left_key(left, left_table, left_col) else { continue };
        for right in right_docs {
            let Some(rv) = right.data.get(right_col) else { continue };
            if !lv.loosely_equals(rv) {
                continue;
            }
            let mut merged = left.clone();
            for (key, column) in &qualified {
                merged.insert(key.clone(), right.data.get(*column).cloned().unwrap_or_default());
            }
            out.push(merged);
        }
    }
    out
}

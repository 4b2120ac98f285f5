//! GROUP BY and COUNT/SUM/AVG/MIN/MAX over document rows.

use indexmap::IndexMap;
use log::debug;

use super::ast::Aggregate;
use super::resolver::{Resolver, bare_name};
use crate::models::enums::AggregateFunction;
use crate::models::structs::{Row, Scalar};

/// Collapse `rows` into aggregate result rows.
///
/// Without `group_by` this always yields exactly one row. With it, one row
/// per distinct composite key in first-seen order. Empty input with at least
/// one aggregate yields the single default row even when grouped; a grouping
/// with no aggregates over empty input yields nothing.
pub fn aggregate(rows: &[Row], aggregates: &[Aggregate], group_by: &[String], resolver: &Resolver) -> Vec<Row> {
    if group_by.is_empty() || (rows.is_empty() && !aggregates.is_empty()) {
        let all: Vec<&Row> = rows.iter().collect();
        return vec![aggregate_group(&all, aggregates, resolver)];
    }

    let mut groups: IndexMap<String, Vec<&Row>> = IndexMap::new();
    for row in rows {
        groups.entry(group_key(row, group_by, resolver)).or_default().push(row);
    }
    debug!("GROUP BY {} -> {} group(s) from {} row(s)", group_by.join(", "), groups.len(), rows.len());

    groups
        .values()
        .map(|members| {
            let mut out = Row::new();
            let first = members[0];
            for column in group_by {
                let value = resolver.lookup_lenient(first, column).cloned().unwrap_or_default();
                out.insert(bare_name(column).to_string(), value.clone());
                out.insert(column.clone(), value);
            }
            out.extend(aggregate_group(members, aggregates, resolver));
            out
        })
        .collect()
}

/// `|`-joined group values; null and missing become "".
fn group_key(row: &Row, group_by: &[String], resolver: &Resolver) -> String {
    group_by
        .iter()
        .map(|c| resolver.lookup_lenient(row, c).map(Scalar::key_fragment).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|")
}

fn aggregate_group(rows: &[&Row], aggregates: &[Aggregate], resolver: &Resolver) -> Row {
    aggregates
        .iter()
        .map(|agg| {
            let value = if rows.is_empty() {
                match agg.function {
                    AggregateFunction::Count => Scalar::Int(0),
                    AggregateFunction::Avg => Scalar::Float(0.0),
                    _ => Scalar::Null,
                }
            } else {
                compute(agg, rows, resolver)
            };
            (agg.output_name(), value)
        })
        .collect()
}

fn compute(agg: &Aggregate, rows: &[&Row], resolver: &Resolver) -> Scalar {
    if agg.is_count_star() {
        return Scalar::Int(rows.len() as i64);
    }
    let values: Vec<&Scalar> = rows
        .iter()
        .map(|row| resolver.lookup_lenient(row, &agg.column).unwrap_or(&Scalar::Null))
        .collect();

    match agg.function {
        AggregateFunction::Count => Scalar::Int(values.iter().filter(|v| !v.is_blank()).count() as i64),
        AggregateFunction::Sum => sum(&values),
        AggregateFunction::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
            if numbers.is_empty() {
                Scalar::Float(0.0)
            } else {
                Scalar::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregateFunction::Min => extreme(&values, |a, b| a < b),
        AggregateFunction::Max => extreme(&values, |a, b| a > b),
    }
}

/// Non-numeric values count as 0. Stays integral while every contributing
/// value is an `Int` and the running total fits.
fn sum(values: &[&Scalar]) -> Scalar {
    let mut total = 0f64;
    let mut int_total: Option<i64> = Some(0);
    for value in values {
        let Some(n) = value.as_number() else { continue };
        total += n;
        int_total = match (int_total, value) {
            (Some(acc), Scalar::Int(i)) => acc.checked_add(*i),
            _ => None,
        };
    }
    int_total.map(Scalar::Int).unwrap_or(Scalar::Float(total))
}

/// MIN/MAX over numeric values only; null when there are none.
fn extreme(values: &[&Scalar], better: fn(f64, f64) -> bool) -> Scalar {
    let mut best: Option<(f64, &Scalar)> = None;
    let mut all_int = true;
    for value in values {
        let Some(n) = value.as_number() else { continue };
        all_int &= matches!(value, Scalar::Int(_));
        if best.is_none_or(|(b, _)| better(n, b)) {
            best = Some((n, *value));
        }
    }
    match best {
        None => Scalar::Null,
        Some((_, Scalar::Int(i))) if all_int => Scalar::Int(*i),
        Some((n, _)) => Scalar::Float(n),
    }
}

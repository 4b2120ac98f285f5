//! Interprets a [`ParsedQuery`] against a [`RowStore`].
//!
//! Execution is validated up front (statement kind, join shape, tables and
//! WHERE columns) so nothing is fetched for a query that cannot run. WHERE
//! conditions are routed to the table they refer to and pushed down as
//! predicates; everything after the fetch happens in memory.

use std::collections::HashMap;
use std::time::Instant;

use futures::future::try_join_all;
use log::{debug, info, warn};

use super::aggregate::aggregate;
use super::ast::ParsedQuery;
use super::errors::QueryAstError;
use super::join::{inner_join, left_table, orient};
use super::parser::parse_sql;
use super::resolver::{Resolver, split_column};
use super::store::{Predicate, RowStore, SchemaCatalog};
use crate::config::EngineConfig;
use crate::models::enums::{CompareOp, JoinKind, LogicalOp, StatementType};
use crate::models::structs::{Document, ProjectSchema, QueryRequest, QueryResponse, Row, Scalar, TableSchema};

/// Everything needed to fetch, resolved from the query and the schema.
struct Plan<'s> {
    resolver: Resolver,
    /// Referenced tables in query order, FROM table first.
    tables: Vec<&'s TableSchema>,
    predicates: HashMap<String, Vec<Predicate>>,
}

impl Plan<'_> {
    fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().copied().find(|t| t.name == name)
    }
}

fn validate<'s>(parsed: &ParsedQuery, schema: &'s ProjectSchema) -> Result<Plan<'s>, QueryAstError> {
    if !parsed.is_valid {
        return Err(QueryAstError::Parse(parsed.error.clone().unwrap_or_else(|| "invalid query".to_string())));
    }
    if parsed.statement_type != StatementType::Select {
        return Err(QueryAstError::unsupported(format!("{} statements", parsed.statement_type)));
    }
    for (i, join) in parsed.joins.iter().enumerate() {
        let earlier = parsed.tables.first().into_iter().chain(parsed.joins[..i].iter().map(|j| &j.table));
        if earlier.into_iter().any(|t| *t == join.table) {
            return Err(QueryAstError::unsupported(format!("self join on '{}'", join.table)));
        }
        if join.kind != JoinKind::Inner {
            return Err(QueryAstError::unsupported(format!("join type {} JOIN", join.kind)));
        }
        if join.on.operator != "=" {
            return Err(QueryAstError::unsupported(format!("join operator '{}'", join.on.operator)));
        }
    }
    for condition in &parsed.conditions {
        if condition.operator == CompareOp::In {
            return Err(QueryAstError::unsupported(format!("IN condition on '{}'", condition.column)));
        }
        if condition.logical_operator == Some(LogicalOp::Or) {
            return Err(QueryAstError::unsupported("OR between WHERE conditions"));
        }
    }

    let Some(base) = parsed.tables.first() else {
        return Err(QueryAstError::Parse("no table referenced".to_string()));
    };
    if let Some(extra) = parsed
        .tables
        .iter()
        .skip(1)
        .find(|t| !parsed.joins.iter().any(|j| &j.table == *t))
    {
        return Err(QueryAstError::unsupported(format!("implicit cross join with '{}'", extra)));
    }
    let tables = parsed
        .tables
        .iter()
        .map(|name| schema.table(name).ok_or_else(|| QueryAstError::TableNotFound(name.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    debug!("Resolved {} table(s) starting at '{}'", tables.len(), base);

    let resolver = Resolver::new(parsed.tables.clone(), parsed.table_aliases.clone());
    let mut predicates: HashMap<String, Vec<Predicate>> = HashMap::new();
    for condition in &parsed.conditions {
        let (table, column) = route_condition(&condition.column, &resolver, &tables)?;
        predicates
            .entry(table.to_string())
            .or_default()
            .push(Predicate::new(column, condition.operator, condition.value.clone()));
    }
    Ok(Plan { resolver, tables, predicates })
}

/// Owning table and bare column for a WHERE reference.
///
/// `p.col` belongs to the table `p` names; a bare `col` belongs to the first
/// referenced table whose schema lists it.
fn route_condition<'t>(
    column: &str,
    resolver: &Resolver,
    tables: &[&'t TableSchema],
) -> Result<(&'t str, String), QueryAstError> {
    match split_column(column) {
        (Some(prefix), bare) => {
            let name = resolver.table_for_prefix(prefix);
            let table = tables
                .iter()
                .copied()
                .find(|t| t.name == name)
                .ok_or_else(|| QueryAstError::TableNotFound(name.to_string()))?;
            if !table.has_column(bare) {
                return Err(QueryAstError::ColumnNotFound { column: bare.to_string(), table: table.name.clone() });
            }
            Ok((table.name.as_str(), bare.to_string()))
        }
        (None, bare) => tables
            .iter()
            .copied()
            .find(|t| t.has_column(bare))
            .map(|t| (t.name.as_str(), bare.to_string()))
            .ok_or_else(|| QueryAstError::ColumnNotFound {
                column: bare.to_string(),
                table: resolver.base_table().to_string(),
            }),
    }
}

async fn fetch_table(
    store: &dyn RowStore,
    table: &TableSchema,
    predicates: &[Predicate],
    row_cap: usize,
) -> Result<(String, Vec<Document>), QueryAstError> {
    let docs = store
        .fetch_rows(table, predicates, row_cap)
        .await
        .map_err(|source| QueryAstError::Store { table: table.name.clone(), source })?;
    debug!("Fetched {} row(s) from '{}' with {} predicate(s)", docs.len(), table.name, predicates.len());
    Ok((table.name.clone(), docs))
}

/// Run a SELECT and return its result rows.
pub async fn execute(
    parsed: &ParsedQuery,
    schema: &ProjectSchema,
    store: &dyn RowStore,
    row_cap: usize,
) -> Result<Vec<Row>, QueryAstError> {
    let plan = validate(parsed, schema)?;
    warn_ignored_clauses(parsed);

    let no_predicates = Vec::new();
    let fetches = plan.tables.iter().map(|table| {
        let predicates = plan.predicates.get(&table.name).unwrap_or(&no_predicates);
        fetch_table(store, table, predicates, row_cap)
    });
    let fetched: HashMap<String, Vec<Document>> = try_join_all(fetches).await?.into_iter().collect();

    let mut rows: Vec<Row> = fetched
        .get(plan.resolver.base_table())
        .map(|docs| docs.iter().map(|d| d.data.clone()).collect())
        .unwrap_or_default();

    for join in &parsed.joins {
        let on = orient(join);
        let left = left_table(&on, &plan.resolver).to_string();
        let right_docs = fetched.get(&join.table).map(Vec::as_slice).unwrap_or_default();
        let right_columns = plan.table(&join.table).map(|t| t.columns.as_slice()).unwrap_or_default();
        let before = rows.len();
        rows = inner_join(&rows, right_docs, &on, &left, &join.table, right_columns);
        debug!(
            "JOIN {} ON {} = {}: {} x {} -> {} row(s)",
            join.table,
            on.left,
            on.right,
            before,
            right_docs.len(),
            rows.len()
        );
    }

    if parsed.is_aggregate() {
        return Ok(aggregate(&rows, &parsed.aggregates, &parsed.group_by, &plan.resolver));
    }
    Ok(project(&rows, parsed, &plan))
}

fn warn_ignored_clauses(parsed: &ParsedQuery) {
    if !parsed.order_by.is_empty() {
        warn!("ORDER BY is parsed but not applied");
    }
    if !parsed.having.is_empty() {
        warn!("HAVING is parsed but not applied");
    }
    if parsed.limit.is_some() || parsed.offset.is_some() {
        warn!("LIMIT/OFFSET is parsed but not applied");
    }
}

/// `*` expands to the base table's columns (bare) followed by each joined
/// table's columns (`table.column`). Named columns are stored under the text
/// they were requested with; unknown ones come back as null.
fn project(rows: &[Row], parsed: &ParsedQuery, plan: &Plan<'_>) -> Vec<Row> {
    let mut joined_tables: Vec<&str> = Vec::new();
    for join in &parsed.joins {
        if join.table != plan.resolver.base_table() && !joined_tables.contains(&join.table.as_str()) {
            joined_tables.push(&join.table);
        }
    }

    rows.iter()
        .map(|row| {
            let mut out = Row::new();
            for column in &parsed.columns {
                if column == "*" {
                    if let Some(base) = plan.table(plan.resolver.base_table()) {
                        for c in &base.columns {
                            out.insert(c.clone(), row.get(c).cloned().unwrap_or_default());
                        }
                    }
                    for table in plan.tables.iter().filter(|t| joined_tables.contains(&t.name.as_str())) {
                        for c in &table.columns {
                            let key = format!("{}.{}", table.name, c);
                            let value = row.get(&key).cloned().unwrap_or_default();
                            out.insert(key, value);
                        }
                    }
                } else {
                    let value = plan.resolver.lookup(row, column).cloned().unwrap_or(Scalar::Null);
                    out.insert(column.clone(), value);
                }
            }
            out
        })
        .collect()
}

/// Parse, plan and run `request.query` against the request's project.
pub async fn execute_query(
    request: &QueryRequest,
    catalog: &dyn SchemaCatalog,
    store: &dyn RowStore,
    config: &EngineConfig,
) -> Result<QueryResponse, QueryAstError> {
    let started = Instant::now();
    let parsed = parse_sql(&request.query);
    if !parsed.is_valid {
        return Err(QueryAstError::Parse(parsed.error.unwrap_or_else(|| "invalid query".to_string())));
    }
    let schema = catalog.project_schema(&request.project_id).await.map_err(QueryAstError::Catalog)?;
    let rows = execute(&parsed, &schema, store, config.row_cap).await?;

    let response = QueryResponse {
        query: request.query.clone(),
        row_count: rows.len(),
        rows,
        execution_time_ms: started.elapsed().as_millis() as u64,
        affected_tables: parsed.tables,
    };
    info!(
        "Query on project '{}' returned {} row(s) in {} ms",
        request.project_id, response.row_count, response.execution_time_ms
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_ast::stores::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_fixture_value(json!({
            "projects": [{
                "id": "p1",
                "tables": [
                    { "name": "users", "columns": ["id", "name"], "rows": [
                        { "id": 1, "name": "Ann" },
                        { "id": 2, "name": "Bo" }
                    ]},
                    { "name": "orders", "columns": ["id", "user_id", "total"], "rows": [
                        { "id": 10, "user_id": 1, "total": 5 },
                        { "id": 11, "user_id": 1, "total": 7 },
                        { "id": 12, "user_id": 3, "total": 1 }
                    ]}
                ]
            }]
        }))
        .unwrap()
    }

    async fn run(sql: &str) -> Result<Vec<Row>, QueryAstError> {
        let s = store();
        let schema = s.project_schema("p1").await.unwrap();
        execute(&parse_sql(sql), &schema, &s, 1000).await
    }

    #[tokio::test]
    async fn join_projects_both_sides() {
        let rows = run("SELECT u.name, o.total FROM users u JOIN orders o ON u.id = o.user_id").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["u.name"], Scalar::text("Ann"));
        assert_eq!(rows[0]["o.total"], Scalar::Int(5));
        assert_eq!(rows[1]["o.total"], Scalar::Int(7));
    }

    #[tokio::test]
    async fn reversed_on_operands_join_the_same() {
        let rows = run("SELECT u.name FROM users u JOIN orders o ON o.user_id = u.id").await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn count_star_with_alias() {
        let rows = run("SELECT COUNT(*) AS cnt FROM users").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["cnt"], Scalar::Int(2));
    }

    #[tokio::test]
    async fn star_expands_base_then_qualified_joined_columns() {
        let rows = run("SELECT * FROM users u JOIN orders o ON u.id = o.user_id WHERE o.total > 6").await.unwrap();
        assert_eq!(rows.len(), 1);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name", "orders.id", "orders.user_id", "orders.total"]);
    }

    #[tokio::test]
    async fn bare_where_column_routes_to_owning_table() {
        let rows = run("SELECT name, total FROM users JOIN orders ON users.id = orders.user_id WHERE total = 5")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["total"], Scalar::Int(5));
        assert_eq!(rows[0]["name"], Scalar::text("Ann"));
    }

    #[tokio::test]
    async fn missing_projection_column_is_null() {
        let rows = run("SELECT name, nickname FROM users WHERE id = 2").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["nickname"], Scalar::Null);
    }

    #[tokio::test]
    async fn rejections() {
        assert!(matches!(run("SELECT * FROM users u LEFT JOIN orders o ON u.id = o.user_id").await, Err(QueryAstError::Unsupported(_))));
        assert!(matches!(run("SELECT * FROM users u JOIN orders o ON u.id > o.user_id").await, Err(QueryAstError::Unsupported(_))));
        assert!(matches!(run("SELECT * FROM users WHERE id = 1 OR id = 2").await, Err(QueryAstError::Unsupported(_))));
        assert!(matches!(run("SELECT * FROM users WHERE id IN (1, 2)").await, Err(QueryAstError::Unsupported(_))));
        assert!(matches!(run("SELECT * FROM users, orders").await, Err(QueryAstError::Unsupported(_))));
        assert!(matches!(run("DELETE FROM users WHERE id = 1").await, Err(QueryAstError::Unsupported(_))));
        assert!(matches!(run("SELECT * FROM ghosts").await, Err(QueryAstError::TableNotFound(t)) if t == "ghosts"));
        assert!(matches!(
            run("SELECT * FROM users WHERE age > 3").await,
            Err(QueryAstError::ColumnNotFound { column, .. }) if column == "age"
        ));
        assert!(matches!(run("SELECT name").await, Err(QueryAstError::Parse(_))));
    }

    #[tokio::test]
    async fn joining_a_table_already_in_the_query_is_rejected() {
        let err = run("SELECT e.name FROM users e JOIN users m ON e.id = m.id").await.unwrap_err();
        assert_eq!(err.to_string(), "unsupported feature: self join on 'users'");
        let err = run("SELECT * FROM users u JOIN orders o ON u.id = o.user_id JOIN orders p ON u.id = p.user_id")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryAstError::Unsupported(m) if m == "self join on 'orders'"));
    }

    #[tokio::test]
    async fn execute_query_fills_response() {
        let s = store();
        let request = QueryRequest { project_id: "p1".into(), query: "SELECT name FROM users WHERE id = 1".into() };
        let response = execute_query(&request, &s, &s, &EngineConfig::default()).await.unwrap();
        assert_eq!(response.row_count, 1);
        assert_eq!(response.affected_tables, vec!["users"]);
        assert_eq!(response.rows[0]["name"], Scalar::text("Ann"));

        let unknown = QueryRequest { project_id: "zz".into(), query: "SELECT * FROM users".into() };
        assert!(matches!(execute_query(&unknown, &s, &s, &EngineConfig::default()).await, Err(QueryAstError::Catalog(_))));
    }
}

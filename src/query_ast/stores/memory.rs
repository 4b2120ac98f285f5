//! In-process store backing both traits, loadable from a JSON fixture:
//!
//! ```json
//! { "projects": [ { "id": "demo", "tables": [
//!     { "name": "users", "columns": ["id", "name"], "rows": [ { "id": 1, "name": "Ann" } ] }
//! ] } ] }
//! ```
//!
//! `columns` may be omitted, in which case it is inferred from the row keys.

use std::path::Path;

use async_trait::async_trait;
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;

use crate::models::structs::{Document, ProjectSchema, Row, TableSchema, row_from_json};
use crate::query_ast::errors::StoreError;
use crate::query_ast::store::{Predicate, RowStore, SchemaCatalog};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Document>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    /// project id -> tables in creation order
    projects: IndexMap<String, Vec<MemoryTable>>,
}

#[derive(Deserialize)]
struct Fixture {
    projects: Vec<FixtureProject>,
}

#[derive(Deserialize)]
struct FixtureProject {
    id: String,
    #[serde(default)]
    tables: Vec<FixtureTable>,
}

#[derive(Deserialize)]
struct FixtureTable {
    name: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture_value(value: serde_json::Value) -> Result<Self, StoreError> {
        let fixture: Fixture = serde_json::from_value(value)?;
        let mut store = Self::new();
        for project in fixture.projects {
            store.projects.entry(project.id.clone()).or_default();
            for table in project.tables {
                let rows: Vec<Row> = table.rows.iter().map(row_from_json).collect();
                let columns = if table.columns.is_empty() { infer_columns(&rows) } else { table.columns };
                store.create_table(&project.id, &table.name, columns);
                for row in rows {
                    store.insert_row(&project.id, &table.name, row)?;
                }
            }
        }
        Ok(store)
    }

    pub fn load_fixture(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let store = Self::from_fixture_value(value)?;
        debug!("Loaded fixture {} ({} project(s))", path.as_ref().display(), store.projects.len());
        Ok(store)
    }

    /// Register a table; an existing table of the same name is replaced.
    pub fn create_table(&mut self, project_id: &str, name: &str, columns: Vec<String>) -> TableSchema {
        let schema = TableSchema::new(format!("{}:{}", project_id, name), name, columns);
        let tables = self.projects.entry(project_id.to_string()).or_default();
        tables.retain(|t| t.schema.name != name);
        tables.push(MemoryTable { schema: schema.clone(), rows: Vec::new() });
        schema
    }

    /// Append a row and return its generated id.
    pub fn insert_row(&mut self, project_id: &str, table: &str, data: Row) -> Result<String, StoreError> {
        let target = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))?
            .iter_mut()
            .find(|t| t.schema.name == table)
            .ok_or_else(|| StoreError::Backend(format!("table '{}' does not exist", table)))?;
        let id = format!("{}-{}", table, target.rows.len() + 1);
        target.rows.push(Document::new(id.clone(), data));
        Ok(id)
    }

    fn find_table(&self, table_id: &str) -> Option<&MemoryTable> {
        self.projects.values().flatten().find(|t| t.schema.id == table_id)
    }
}

fn infer_columns(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for key in rows.iter().flat_map(|r| r.keys()) {
        if !columns.contains(key) {
            columns.push(key.clone());
        }
    }
    columns
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn fetch_rows(
        &self,
        table: &TableSchema,
        predicates: &[Predicate],
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let stored = self
            .find_table(&table.id)
            .ok_or_else(|| StoreError::Backend(format!("unknown table id '{}'", table.id)))?;
        Ok(stored
            .rows
            .iter()
            .filter(|doc| predicates.iter().all(|p| p.matches(&doc.data)))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SchemaCatalog for MemoryStore {
    async fn project_schema(&self, project_id: &str) -> Result<ProjectSchema, StoreError> {
        let tables = self
            .projects
            .get(project_id)
            .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))?;
        Ok(ProjectSchema {
            project_id: project_id.to_string(),
            tables: tables.iter().map(|t| t.schema.clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::CompareOp;
    use crate::models::structs::Scalar;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_fixture_value(json!({
            "projects": [{
                "id": "p1",
                "tables": [
                    { "name": "users", "rows": [
                        { "id": 1, "name": "Ann", "age": 30 },
                        { "id": 2, "name": "Bo", "age": 17, "city": "Oslo" },
                        { "id": 3, "name": "Cy", "age": 45 }
                    ]},
                    { "name": "empty", "columns": ["a", "b"] }
                ]
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn catalog_lists_tables_with_inferred_columns() {
        let s = store();
        let schema = s.project_schema("p1").await.unwrap();
        assert_eq!(schema.table_names(), vec!["users", "empty"]);
        assert_eq!(schema.table("users").unwrap().columns, vec!["id", "name", "age", "city"]);
        assert_eq!(schema.table("empty").unwrap().columns, vec!["a", "b"]);
        assert!(matches!(s.project_schema("nope").await, Err(StoreError::ProjectNotFound(_))));
    }

    #[tokio::test]
    async fn fetch_applies_predicates_and_limit() {
        let s = store();
        let users = s.project_schema("p1").await.unwrap().table("users").unwrap().clone();

        let adults = s
            .fetch_rows(&users, &[Predicate::new("age", CompareOp::GtEq, Scalar::Int(18))], 1000)
            .await
            .unwrap();
        assert_eq!(adults.len(), 2);
        assert_eq!(adults[1].data["name"], Scalar::text("Cy"));

        let capped = s.fetch_rows(&users, &[], 1).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, "users-1");
    }

    #[tokio::test]
    async fn unknown_table_id_is_a_backend_error() {
        let s = store();
        let ghost = TableSchema::new("p1:ghost", "ghost", vec![]);
        assert!(matches!(s.fetch_rows(&ghost, &[], 10).await, Err(StoreError::Backend(_))));
    }

    #[test]
    fn insert_into_missing_table_fails() {
        let mut s = store();
        assert!(s.insert_row("p1", "nope", Row::new()).is_err());
        assert!(matches!(s.insert_row("p9", "users", Row::new()), Err(StoreError::ProjectNotFound(_))));
    }
}

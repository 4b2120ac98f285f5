//! SQLite-backed store.
//!
//! Table metadata lives in `database_tables` / `table_columns`; every row is
//! one JSON document in `table_rows.row_data`. Predicates are pushed into
//! SQL through `json_extract`, so only matching rows leave the database.
//!
//! Differences from [`super::MemoryStore`]: `LIKE` follows SQLite and is
//! case-insensitive for ASCII, and numbers stored as JSON strings compare
//! as text.

use std::str::FromStr;

use async_trait::async_trait;
use log::{debug, info};
use sqlx::Row as _;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::models::enums::CompareOp;
use crate::models::structs::{Document, ProjectSchema, Row, Scalar, TableSchema, row_from_json};
use crate::query_ast::errors::StoreError;
use crate::query_ast::store::{Predicate, RowStore, SchemaCatalog};

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS database_tables (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        UNIQUE(project_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS table_columns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_id TEXT NOT NULL,
        name TEXT NOT NULL,
        position INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS table_rows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_id TEXT NOT NULL,
        row_data TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_table_rows_table ON table_rows(table_id)",
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

enum Bind {
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new().max_connections(5);
        if url.contains(":memory:") {
            // every connection to :memory: is a separate database; keep exactly one alive
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Row store opened at {}", url);
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for stmt in MIGRATIONS {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Register (or redefine) a table and its ordered column list.
    pub async fn create_table(
        &self,
        project_id: &str,
        name: &str,
        columns: &[&str],
    ) -> Result<TableSchema, StoreError> {
        let id = format!("{}:{}", project_id, name);
        let mut tx = self.pool.begin().await?;
        sqlx::query("REPLACE INTO database_tables (id, project_id, name) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(project_id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM table_columns WHERE table_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        for (position, column) in columns.iter().enumerate() {
            sqlx::query("INSERT INTO table_columns (table_id, name, position) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(*column)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(TableSchema::new(id, name, columns.iter().map(|c| c.to_string()).collect()))
    }

    /// Store one document row; returns the generated row id.
    pub async fn insert_row(&self, table: &TableSchema, data: &Row) -> Result<String, StoreError> {
        let json = serde_json::to_string(data)?;
        let result = sqlx::query("INSERT INTO table_rows (table_id, row_data) VALUES (?, ?)")
            .bind(&table.id)
            .bind(json)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid().to_string())
    }
}

/// Build the WHERE fragment for one predicate, pushing its binds in order.
fn predicate_sql(predicate: &Predicate, binds: &mut Vec<Bind>) -> String {
    let value = match &predicate.value {
        // nothing equals null; everything differs from it
        Scalar::Null if predicate.op == CompareOp::NotEq => return "1 = 1".to_string(),
        Scalar::Null => return "1 = 0".to_string(),
        Scalar::Bool(b) => Bind::Int(i64::from(*b)),
        Scalar::Int(i) => Bind::Int(*i),
        Scalar::Float(f) => Bind::Float(*f),
        Scalar::Text(s) => Bind::Text(s.clone()),
    };
    let path = format!("$.\"{}\"", predicate.column.replace('"', "\\\""));

    match predicate.op {
        // never pushed down
        CompareOp::In => "1 = 0".to_string(),
        CompareOp::NotEq => {
            // a null cell only matches !=
            binds.extend([Bind::Text(path.clone()), Bind::Text(path), value]);
            "(json_extract(row_data, ?) IS NULL OR json_extract(row_data, ?) != ?)".to_string()
        }
        op => {
            binds.extend([Bind::Text(path), value]);
            format!("json_extract(row_data, ?) {} ?", op.as_str())
        }
    }
}

#[async_trait]
impl RowStore for SqliteStore {
    async fn fetch_rows(
        &self,
        table: &TableSchema,
        predicates: &[Predicate],
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let mut sql = String::from("SELECT id, row_data FROM table_rows WHERE table_id = ?");
        let mut binds = Vec::new();
        for predicate in predicates {
            sql.push_str(" AND ");
            sql.push_str(&predicate_sql(predicate, &mut binds));
        }
        sql.push_str(" ORDER BY id LIMIT ?");
        debug!("SqliteStore: {} ({} bind(s))", sql, binds.len() + 2);

        let mut query = sqlx::query(&sql).bind(&table.id);
        for bind in binds {
            query = match bind {
                Bind::Int(i) => query.bind(i),
                Bind::Float(f) => query.bind(f),
                Bind::Text(s) => query.bind(s),
            };
        }
        let rows = query
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let raw: String = row.try_get("row_data")?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            documents.push(Document::new(id.to_string(), row_from_json(&value)));
        }
        Ok(documents)
    }
}

#[async_trait]
impl SchemaCatalog for SqliteStore {
    async fn project_schema(&self, project_id: &str) -> Result<ProjectSchema, StoreError> {
        let tables = sqlx::query_as::<_, (String, String)>(
            "SELECT id, name FROM database_tables WHERE project_id = ? ORDER BY rowid",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        if tables.is_empty() {
            return Err(StoreError::ProjectNotFound(project_id.to_string()));
        }

        let mut schema = ProjectSchema { project_id: project_id.to_string(), tables: Vec::new() };
        for (id, name) in tables {
            let columns = sqlx::query_as::<_, (String,)>(
                "SELECT name FROM table_columns WHERE table_id = ? ORDER BY position",
            )
            .bind(&id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(c,)| c)
            .collect();
            schema.tables.push(TableSchema::new(id, name, columns));
        }
        Ok(schema)
    }
}

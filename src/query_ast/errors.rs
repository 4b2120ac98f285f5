#[derive(thiserror::Error, Debug)]
pub enum QueryAstError {
    #[error("parse error: {0}")] Parse(String),
    #[error("unsupported feature: {0}")] Unsupported(String),
    #[error("table '{0}' not found")] TableNotFound(String),
    #[error("column '{column}' not found in table '{table}'")] ColumnNotFound { column: String, table: String },
    #[error("failed to fetch rows from '{table}': {source}")] Store { table: String, #[source] source: StoreError },
    #[error("failed to load schema: {0}")] Catalog(#[source] StoreError),
}

impl QueryAstError {
    pub fn unsupported(what: impl Into<String>) -> Self { QueryAstError::Unsupported(what.into()) }
}

/// Failure reported by a row store or schema catalog.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("row store error: {0}")] Backend(String),
    #[error("project '{0}' not found")] ProjectNotFound(String),
    #[cfg(feature = "sqlite_store")]
    #[error(transparent)] Sqlx(#[from] sqlx::Error),
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[error(transparent)] Io(#[from] std::io::Error),
}

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use docquery::config::EngineConfig;
use docquery::export;
use docquery::models::enums::OutputFormat;
use docquery::models::structs::QueryRequest;
use docquery::query_ast::stores::MemoryStore;
#[cfg(feature = "sqlite_store")]
use docquery::query_ast::stores::SqliteStore;
use docquery::query_ast::{RowStore, SchemaCatalog, execute_query};

/// Run SQL against the document rows of one project
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Project whose tables the query reads
    #[arg(short, long)]
    project: String,

    /// JSON fixture for the in-memory store
    #[arg(long, value_name = "FILE", conflicts_with = "database")]
    fixture: Option<PathBuf>,

    /// SQLite URL of the row store
    #[arg(long, value_name = "URL")]
    database: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Save results to FILE in the chosen format instead of printing them
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Query to run; without it statements are read from stdin, one per `;`
    #[arg(value_name = "SQL")]
    sql: Option<String>,
}

enum Backend {
    Memory(MemoryStore),
    #[cfg(feature = "sqlite_store")]
    Sqlite(SqliteStore),
}

impl Backend {
    async fn open(args: &Args, config: &EngineConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = args.fixture.as_ref().or(config.fixture_path.as_ref()).filter(|_| args.database.is_none()) {
            return Ok(Backend::Memory(MemoryStore::load_fixture(path)?));
        }
        if let Some(url) = args.database.as_ref().or(config.database_url.as_ref()) {
            #[cfg(feature = "sqlite_store")]
            return Ok(Backend::Sqlite(SqliteStore::connect(url).await?));
            #[cfg(not(feature = "sqlite_store"))]
            return Err(format!("cannot open '{}': built without the sqlite_store feature", url).into());
        }
        Err("no row store configured: pass --fixture or --database".into())
    }

    fn parts(&self) -> (&dyn SchemaCatalog, &dyn RowStore) {
        match self {
            Backend::Memory(s) => (s as &dyn SchemaCatalog, s as &dyn RowStore),
            #[cfg(feature = "sqlite_store")]
            Backend::Sqlite(s) => (s as &dyn SchemaCatalog, s as &dyn RowStore),
        }
    }
}

async fn run_one(
    backend: &Backend,
    config: &EngineConfig,
    project: &str,
    sql: &str,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (catalog, store) = backend.parts();
    let request = QueryRequest { project_id: project.to_string(), query: sql.to_string() };
    let response = execute_query(&request, catalog, store, config).await?;
    if let Some(path) = output {
        export::write_file(path, &response, format)?;
        println!("({} rows saved to {})", response.row_count, path.display());
        return Ok(());
    }
    match format {
        OutputFormat::Table => print!("{}", export::to_table(&response)),
        OutputFormat::Json => println!("{}", export::to_json(&response)?),
        OutputFormat::Csv => print!("{}", export::to_csv(&response)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    docquery::init_logging();
    let args = Args::parse();
    let config = EngineConfig::load();
    let backend = Backend::open(&args, &config).await?;

    if let Some(sql) = &args.sql {
        if let Err(e) = run_one(&backend, &config, &args.project, sql, args.format, args.output.as_deref()).await {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("docquery on project '{}' (type '.exit' or '.quit' to stop)", args.project);
    let stdin = io::stdin();
    let mut buffer = String::new();
    loop {
        print!("{}", if buffer.is_empty() { "sql> " } else { "...  " });
        io::stdout().flush()?;
        let Some(line) = stdin.lock().lines().next() else { break };
        let input = line?;
        let trimmed = input.trim();
        if buffer.is_empty() && (trimmed == ".exit" || trimmed == ".quit") {
            break;
        }
        buffer.push_str(&input);
        buffer.push('\n');
        if !trimmed.ends_with(';') {
            continue;
        }
        let sql = std::mem::take(&mut buffer);
        if let Err(e) = run_one(&backend, &config, &args.project, &sql, args.format, args.output.as_deref()).await {
            eprintln!("Error: {}", e);
        }
    }
    Ok(())
}

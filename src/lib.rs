pub mod config;
pub mod export;
pub mod models;
pub mod query_ast;

/// Load `.env` and install the logger. `RUST_LOG` wins when set; otherwise
/// this crate logs at info level.
pub fn init_logging() {
    dotenv::dotenv().ok();
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_module("docquery", log::LevelFilter::Info);
    }
    let _ = builder.is_test(false).try_init();
    log::debug!("Data directory: {}", config::get_data_dir().display());
}

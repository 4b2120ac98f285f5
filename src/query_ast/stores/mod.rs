//! Row store implementations.

pub mod memory;
#[cfg(feature = "sqlite_store")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite_store")]
pub use sqlite::SqliteStore;

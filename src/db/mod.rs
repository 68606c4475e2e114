// Database layer — SQLite storage for entities, rating facts, and
// similarity edges.
//
// We use rusqlite with the "bundled" feature so there's no system SQLite
// dependency. The database file lives wherever KINDRED_DB_PATH points
// (defaults to ./kindred.db). Everything above this layer talks to
// `Arc<dyn Store>`, never to a Connection.

pub mod models;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use traits::Store;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use sqlite::SqliteStore;

/// Open (or create) the database, run migrations, and wrap it in a store.
///
/// This is the main entry point — called by `kindred init` and by any
/// command that needs database access.
pub fn initialize(db_path: &str) -> Result<Arc<dyn Store>> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Wait on contended locks instead of failing immediately; the writer's
    // retry loop absorbs anything that still times out.
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::create_tables(&conn)?;

    Ok(Arc::new(SqliteStore::new(conn)))
}

/// Open an existing database (fails if it doesn't exist yet).
pub fn open(db_path: &str) -> Result<Arc<dyn Store>> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `kindred init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    Ok(Arc::new(SqliteStore::new(conn)))
}

/// In-memory store with the full schema. Used by tests and demos.
pub fn open_in_memory() -> Result<Arc<dyn Store>> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    schema::create_tables(&conn)?;
    Ok(Arc::new(SqliteStore::new(conn)))
}

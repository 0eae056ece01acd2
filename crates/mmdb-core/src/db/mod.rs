//! SQLite database utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` for file databases so readers run beside a writer
//! - `synchronous = NORMAL`
//! - `busy_timeout = 5s` to absorb transient lock contention

pub mod migrations;
pub mod query;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

use crate::config::StoreConfig;

/// Open (or create) a store database at `path`, apply runtime pragmas, and
/// migrate the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening, configuring, or migrating the database fails.
pub fn open_database(path: &Path, config: &StoreConfig) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open(path)?;
    configure_connection(&conn, config, true)?;
    migrations::migrate(&mut conn)?;
    Ok(conn)
}

/// Open a private in-memory database with the same schema.
///
/// # Errors
///
/// Returns an error if configuring or migrating the database fails.
pub fn open_in_memory(config: &StoreConfig) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    configure_connection(&conn, config, false)?;
    migrations::migrate(&mut conn)?;
    Ok(conn)
}

fn configure_connection(
    conn: &Connection,
    config: &StoreConfig,
    on_disk: bool,
) -> rusqlite::Result<()> {
    conn.busy_timeout(config.busy_timeout())?;
    conn.pragma_update(None, "synchronous", config.synchronous.as_pragma())?;
    if on_disk && config.wal {
        let _journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    Ok(())
}

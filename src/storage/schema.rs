use crate::storage::errors::{Result, StorageError};
use rusqlite::Connection;
use tracing::{debug, info};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// One forward-only schema step
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Key/value table for identity and host progress",
    sql: r#"
            CREATE TABLE kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL,
                description TEXT NOT NULL
            );
        "#,
}];

/// Bring `conn` up to [`CURRENT_SCHEMA_VERSION`]
///
/// Pending migrations run inside one transaction, so a failure leaves the
/// file at its previous version.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let from = if has_migrations_table(conn) {
        get_current_version(conn)?
    } else {
        0
    };

    let mut pending = MIGRATIONS.iter().filter(|m| m.version > from).peekable();
    if pending.peek().is_none() {
        debug!(version = from, "Schema is up to date");
        return Ok(());
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| StorageError::migration_failed(-1, format!("cannot begin: {}", e)))?;
    for migration in pending {
        info!(version = migration.version, "Applying migration: {}", migration.description);
        apply(&tx, migration)?;
    }
    tx.commit()
        .map_err(|e| StorageError::migration_failed(-1, format!("cannot commit: {}", e)))
}

fn has_migrations_table(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let failed = |e: rusqlite::Error| StorageError::migration_failed(migration.version, e.to_string());
    conn.execute_batch(migration.sql).map_err(failed)?;
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?1, ?2, ?3)",
        (migration.version, current_timestamp(), migration.description),
    )
    .map_err(failed)?;
    Ok(())
}

/// Highest applied migration, 0 on an empty table
pub fn get_current_version(conn: &Connection) -> Result<i32> {
    conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
        row.get::<_, Option<i32>>(0)
    })
    .map(|version| version.unwrap_or(0))
    .map_err(|e| StorageError::migration_failed(-1, format!("cannot read version: {}", e)))
}

/// Seconds since the Unix epoch
pub fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

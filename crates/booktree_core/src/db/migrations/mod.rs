//! Versioned schema of the `book` outline table.
//!
//! # Invariants
//! - Migration `n` upgrades a database at version `n - 1`; versions start
//!   at 1 and have no gaps.
//! - An upgrade applies every pending script in one transaction, so a
//!   database is either at its old version or at `latest_version()`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// `book` rows, then the subtree-scan and child-lookup indexes.
const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        name: "book_outline",
        sql: include_str!("0001_book_outline.sql"),
    },
    Migration {
        version: 2,
        name: "book_tree_indexes",
        sql: include_str!("0002_book_tree_indexes.sql"),
    },
];

/// Schema version a fully migrated outline database reports.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings the outline schema of `conn` up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is ahead of this build.
/// - `MigrationFailed` naming the first script that did not apply.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in pending {
        tx.execute_batch(migration.sql)
            .and_then(|()| tx.pragma_update(None, "user_version", migration.version))
            .map_err(|source| DbError::MigrationFailed {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        info!(
            "event=db_migrate module=db status=applied version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={from_version} to_version={latest}");
    Ok(())
}

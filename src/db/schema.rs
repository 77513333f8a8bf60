use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::SqlDictionary;
use crate::errors::StoreError;

/// One additive schema step. The DDL runs only when the object is missing.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Migration {
    Table { table: &'static str, ddl: &'static str },
    Column { table: &'static str, column: &'static str, ddl: &'static str },
    Index { index: &'static str, ddl: &'static str },
}

impl Migration {
    fn ddl_key(&self) -> &'static str {
        match self {
            Migration::Table { ddl, .. } | Migration::Column { ddl, .. } | Migration::Index { ddl, .. } => ddl,
        }
    }

    fn is_applied(&self, conn: &Connection) -> rusqlite::Result<bool> {
        match self {
            Migration::Table { table, .. } => table_exists(conn, table),
            Migration::Column { table, column, .. } => column_exists(conn, table, column),
            Migration::Index { index, .. } => index_exists(conn, index),
        }
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        rusqlite::params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        rusqlite::params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn index_exists(conn: &Connection, index: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        rusqlite::params![index],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Bring `conn` up to date with `migrations`, in order.
///
/// Returns the number of DDL statements executed; zero on an up to date schema.
pub(crate) fn migrate(
    conn: &Connection,
    dictionary: &SqlDictionary,
    migrations: &[Migration],
) -> Result<usize, StoreError> {
    let mut applied = 0;
    for migration in migrations {
        if migration.is_applied(conn)? {
            continue;
        }
        let key = migration.ddl_key();
        conn.execute_batch(dictionary.get(key)?)?;
        debug!(ddl = key, "Applied schema change");
        applied += 1;
    }

    if applied > 0 {
        info!(statements = applied, "Schema migrated");
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn dictionary() -> SqlDictionary {
        let statements: HashMap<String, String> = [
            ("t.create", "CREATE TABLE t (id INTEGER PRIMARY KEY, a TEXT NOT NULL DEFAULT '')"),
            ("t.addb", "ALTER TABLE t ADD COLUMN b INTEGER NOT NULL DEFAULT 7"),
            ("t.index", "CREATE INDEX t_index_b ON t (b)"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        SqlDictionary::new("sqlite", statements)
    }

    const STEPS: &[Migration] = &[
        Migration::Table { table: "t", ddl: "t.create" },
        Migration::Column { table: "t", column: "b", ddl: "t.addb" },
        Migration::Index { index: "t_index_b", ddl: "t.index" },
    ];

    #[test]
    fn test_migrate_fresh_database_runs_every_step() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate(&conn, &dictionary(), STEPS).unwrap(), 3);
        assert!(table_exists(&conn, "t").unwrap());
        assert!(column_exists(&conn, "t", "b").unwrap());
        assert!(index_exists(&conn, "t_index_b").unwrap());
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn, &dictionary(), STEPS).unwrap();
        conn.execute("INSERT INTO t (a, b) VALUES ('kept', 1)", []).unwrap();

        assert_eq!(migrate(&conn, &dictionary(), STEPS).unwrap(), 0);
        let a: String = conn.query_row("SELECT a FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(a, "kept");
    }

    #[test]
    fn test_migrate_adds_missing_column_with_default() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, a TEXT NOT NULL DEFAULT '');
                            INSERT INTO t (a) VALUES ('old');").unwrap();

        assert_eq!(migrate(&conn, &dictionary(), STEPS).unwrap(), 2);
        let b: i64 = conn.query_row("SELECT b FROM t WHERE a = 'old'", [], |r| r.get(0)).unwrap();
        assert_eq!(b, 7);
    }

    #[test]
    fn test_migrate_missing_ddl_key_is_config_error() {
        let conn = Connection::open_in_memory().unwrap();
        let empty = SqlDictionary::new("sqlite", HashMap::new());
        assert!(matches!(migrate(&conn, &empty, STEPS), Err(StoreError::Config(_))));
    }
}

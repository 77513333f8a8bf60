//! Binding shared by every table accessor.
//!
//! An accessor is bound when the database opens. On the embedded backend it
//! owns one connection and serializes calls through a mutex around it; on the
//! generic backend every call borrows its own statement from the server's
//! [`StatementPool`]. Either way a call runs against exactly one connection,
//! so an insert and the identity lookup that follows it cannot interleave
//! with another caller.

use std::borrow::Cow;
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::{CachedStatement, Connection, OptionalExtension, Params, Row};
use tracing::{debug, info};

use crate::config::SqlDictionary;
use crate::errors::StoreError;
use super::pool::{PoolKey, StatementPool};
use super::schema::{migrate, Migration};
use super::server::{DatabaseServer, ServerKind};
use super::{lock, read, write};

/// Statements each embedded connection keeps prepared.
const STATEMENT_CACHE_CAPACITY: usize = 64;

/// Receives open/close notifications from a [`crate::db::Database`].
pub trait DatabaseListener: Send + Sync {
    fn database_open(&self, server: &Arc<dyn DatabaseServer>) -> Result<(), StoreError>;

    fn database_closed(&self) {}
}

/// One SQL operation of an accessor, looked up in the dictionary by key.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Op {
    key: &'static str,
    arity: Option<usize>,
}

impl Op {
    pub const fn new(key: &'static str) -> Self {
        Self { key, arity: None }
    }

    /// Operation whose `{0}` placeholder expands to `arity` markers.
    pub const fn variadic(key: &'static str, arity: usize) -> Self {
        Self { key, arity: Some(arity) }
    }

    fn sql<'d>(&self, dictionary: &'d SqlDictionary) -> Result<Cow<'d, str>, StoreError> {
        match self.arity {
            Some(n) => Ok(Cow::Owned(dictionary.render(self.key, &[n])?)),
            None => Ok(Cow::Borrowed(dictionary.get(self.key)?)),
        }
    }

    fn pool_key(&self) -> PoolKey {
        match self.arity {
            Some(n) => PoolKey::with_arity(self.key, n),
            None => PoolKey::new(self.key),
        }
    }
}

/// The connection and SQL a single call runs against.
pub(crate) struct Scope<'c> {
    conn: &'c Connection,
    sql: &'c str,
    dictionary: &'c SqlDictionary,
}

impl Scope<'_> {
    pub fn statement(&self) -> Result<CachedStatement<'_>, StoreError> {
        Ok(self.conn.prepare_cached(self.sql)?)
    }

    pub fn execute<P: Params>(&self, params: P) -> Result<usize, StoreError> {
        let mut stmt = self.statement()?;
        let changed = stmt.execute(params)?;
        Ok(changed)
    }

    /// Execute the insert and return the identity it generated.
    pub fn insert<P: Params>(&self, params: P) -> Result<i64, StoreError> {
        self.execute(params)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn query_opt<T, P, F>(&self, params: P, f: F) -> Result<Option<T>, StoreError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.statement()?;
        let row = stmt.query_row(params, f).optional()?;
        Ok(row)
    }

    pub fn query_all<T, P, F>(&self, params: P, f: F) -> Result<Vec<T>, StoreError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.statement()?;
        let rows = stmt.query_map(params, f)?.collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    pub fn query_scalar<T, P>(&self, params: P) -> Result<T, StoreError>
    where
        P: Params,
        T: rusqlite::types::FromSql,
    {
        let mut stmt = self.statement()?;
        let value = stmt.query_row(params, |row| row.get(0))?;
        Ok(value)
    }

    /// Read a row back on this call's connection, typically right after an
    /// insert.
    pub fn reread<T, P, F>(&self, key: &str, params: P, f: F) -> Result<T, StoreError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(self.dictionary.get(key)?)?;
        let row = stmt.query_row(params, f)?;
        Ok(row)
    }
}

enum Binding {
    Embedded {
        conn: Mutex<Connection>,
        dictionary: Arc<SqlDictionary>,
    },
    Generic {
        pool: Arc<StatementPool>,
        dictionary: Arc<SqlDictionary>,
    },
}

/// Schema and statements of one table, plus its current binding.
pub(crate) struct Table {
    name: &'static str,
    migrations: &'static [Migration],
    statements: &'static [&'static str],
    binding: RwLock<Option<Arc<Binding>>>,
}

impl Table {
    pub fn new(
        name: &'static str,
        migrations: &'static [Migration],
        statements: &'static [&'static str],
    ) -> Self {
        Self { name, migrations, statements, binding: RwLock::new(None) }
    }

    /// Migrate the schema on `server` and prepare this table's statements.
    /// Returns the number of DDL statements executed.
    pub fn reconnect(&self, server: &Arc<dyn DatabaseServer>) -> Result<usize, StoreError> {
        let (applied, binding) = match server.kind() {
            ServerKind::Embedded(embedded) => {
                let conn = server.new_connection()?;
                conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
                let dictionary = embedded.dictionary().clone();
                let applied = migrate(&conn, &dictionary, self.migrations)?;
                for key in self.statements {
                    conn.prepare_cached(dictionary.get(key)?)?;
                }
                (applied, Binding::Embedded { conn: Mutex::new(conn), dictionary })
            }
            ServerKind::Generic(generic) => {
                let dictionary = generic.dictionary().clone();
                let applied = {
                    let shared = server.singleton_connection()?;
                    let conn = lock(&shared);
                    migrate(&conn, &dictionary, self.migrations)?
                };
                let pool = generic.pool().clone();
                for key in self.statements {
                    pool.get(&PoolKey::new(*key), dictionary.get(key)?)?.release();
                }
                (applied, Binding::Generic { pool, dictionary })
            }
            ServerKind::Other(name) => {
                return Err(StoreError::UnsupportedBackend(format!(
                    "{} table cannot use server '{}'",
                    self.name, name
                )));
            }
        };

        *write(&self.binding) = Some(Arc::new(binding));
        info!(table = self.name, ddl = applied, statements = self.statements.len(), "Table ready");
        Ok(applied)
    }

    /// Drop the binding. Embedded connections close once no call holds them.
    pub fn unbind(&self) {
        if write(&self.binding).take().is_some() {
            debug!(table = self.name, "Table unbound");
        }
    }

    /// Run `f` against a connection holding the SQL for `op`.
    pub fn call<T>(
        &self,
        op: Op,
        f: impl FnOnce(&Scope<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let binding = read(&self.binding).clone().ok_or(StoreError::Closed)?;
        match &*binding {
            Binding::Embedded { conn, dictionary } => {
                let sql = op.sql(dictionary)?;
                let conn = lock(conn);
                f(&Scope { conn: &conn, sql: &sql, dictionary })
            }
            Binding::Generic { pool, dictionary } => {
                let sql = op.sql(dictionary)?;
                let statement = pool.get(&op.pool_key(), &sql)?;
                let result = f(&Scope { conn: statement.connection(), sql: &sql, dictionary });
                statement.release();
                result
            }
        }
    }
}

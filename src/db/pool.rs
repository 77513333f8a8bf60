//! Prepared statement pool used by the generic backend.
//!
//! Every pooled statement owns a dedicated connection, so a borrower can run
//! an insert and read back the generated identity without another thread
//! touching the same connection in between. Statements are keyed by
//! operation and, for variadic SQL, by the number of expanded markers.
//!
//! Variadic keys are open ended, so their idle statements share one
//! pool-wide budget and a variadic key with nothing idle or borrowed is
//! forgotten.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rusqlite::{CachedStatement, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::StoreError;
use super::lock;

/// Idle statements kept per key; extra released statements are closed.
pub const MAX_IDLE_PER_KEY: usize = 5;

/// Idle statements kept across every variadic key together.
pub const MAX_IDLE_VARIADIC: usize = 16;

pub type ConnectionFactory = Box<dyn Fn() -> Result<Connection, StoreError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    operation: String,
    arity: Option<usize>,
}

impl PoolKey {
    pub fn new(operation: impl Into<String>) -> Self {
        Self { operation: operation.into(), arity: None }
    }

    pub fn with_arity(operation: impl Into<String>, arity: usize) -> Self {
        Self { operation: operation.into(), arity: Some(arity) }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arity {
            Some(n) => write!(f, "{}[{}]", self.operation, n),
            None => f.write_str(&self.operation),
        }
    }
}

/// Usage counters for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub closed: u64,
    pub idle: usize,
    pub in_use: usize,
    /// High-water mark of concurrently borrowed statements.
    pub peak_in_use: usize,
}

/// A statement prepared on its own connection.
pub struct PreparedStatement {
    id: u64,
    sql: String,
    conn: Connection,
}

impl PreparedStatement {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The prepared statement, served from the connection's statement cache.
    pub fn statement(&self) -> rusqlite::Result<CachedStatement<'_>> {
        self.conn.prepare_cached(&self.sql)
    }

    fn close(self, key: &PoolKey) {
        if let Err((_, e)) = self.conn.close() {
            warn!(key = %key, statement = self.id, error = %e, "Failed to close pooled statement");
        }
    }
}

/// Outcome of handing a statement back to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    Idle,
    Closed,
}

/// A borrowed statement. Dropping it releases it back to the pool.
pub struct PooledStatement<'p> {
    pool: &'p StatementPool,
    key: PoolKey,
    inner: Option<PreparedStatement>,
}

impl PooledStatement<'_> {
    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn release(mut self) -> Released {
        match self.inner.take() {
            Some(statement) => self.pool.give_back(&self.key, statement),
            None => Released::Closed,
        }
    }
}

impl Deref for PooledStatement<'_> {
    type Target = PreparedStatement;

    fn deref(&self) -> &PreparedStatement {
        self.inner.as_ref().expect("pooled statement used after release")
    }
}

impl Drop for PooledStatement<'_> {
    fn drop(&mut self) {
        if let Some(statement) = self.inner.take() {
            self.pool.give_back(&self.key, statement);
        }
    }
}

#[derive(Default)]
struct KeySlot {
    idle: Vec<PreparedStatement>,
    in_use: HashSet<u64>,
    stats: PoolStats,
}

pub struct StatementPool {
    slots: DashMap<PoolKey, Arc<Mutex<KeySlot>>>,
    connect: ConnectionFactory,
    next_id: AtomicU64,
    variadic_idle: AtomicUsize,
    closed: AtomicBool,
}

impl StatementPool {
    pub fn new(connect: ConnectionFactory) -> Self {
        Self {
            slots: DashMap::new(),
            connect,
            next_id: AtomicU64::new(1),
            variadic_idle: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn slot(&self, key: &PoolKey) -> Arc<Mutex<KeySlot>> {
        self.slots.entry(key.clone()).or_default().value().clone()
    }

    /// Borrow a statement for `key`, preparing `sql` on a fresh connection
    /// when no idle statement is available.
    pub fn get(&self, key: &PoolKey, sql: &str) -> Result<PooledStatement<'_>, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }

        let slot = self.slot(key);
        let idle = lock(&slot).idle.pop();
        let reused = idle.is_some();
        if reused && key.arity.is_some() {
            self.variadic_idle.fetch_sub(1, Ordering::SeqCst);
        }
        let statement = match idle {
            Some(statement) => statement,
            None => self.prepare(sql)?,
        };

        {
            let mut slot = lock(&slot);
            if reused {
                slot.stats.reused += 1;
            } else {
                slot.stats.created += 1;
            }
            slot.in_use.insert(statement.id);
            let in_use = slot.in_use.len();
            slot.stats.peak_in_use = slot.stats.peak_in_use.max(in_use);
        }

        Ok(PooledStatement { pool: self, key: key.clone(), inner: Some(statement) })
    }

    fn prepare(&self, sql: &str) -> Result<PreparedStatement, StoreError> {
        let conn = (self.connect)()?;
        conn.prepare_cached(sql)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(statement = id, "Prepared pooled statement");
        Ok(PreparedStatement { id, sql: sql.to_string(), conn })
    }

    fn give_back(&self, key: &PoolKey, statement: PreparedStatement) -> Released {
        let slot = self.slot(key);
        let mut guard = lock(&slot);
        guard.in_use.remove(&statement.id);

        let keep = !self.closed.load(Ordering::SeqCst)
            && guard.idle.len() < MAX_IDLE_PER_KEY
            && (key.arity.is_none() || self.reserve_variadic_idle());
        if keep {
            guard.idle.push(statement);
            return Released::Idle;
        }

        guard.stats.closed += 1;
        drop(guard);
        statement.close(key);
        if key.arity.is_some() {
            self.forget_if_unused(key);
        }
        Released::Closed
    }

    fn reserve_variadic_idle(&self) -> bool {
        self.variadic_idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < MAX_IDLE_VARIADIC).then_some(n + 1)
            })
            .is_ok()
    }

    fn forget_if_unused(&self, key: &PoolKey) {
        let removed = self.slots.remove_if(key, |_, slot| {
            let slot = lock(slot);
            slot.idle.is_empty() && slot.in_use.is_empty()
        });
        if removed.is_some() {
            debug!(key = %key, "Dropped unused variadic pool key");
        }
    }

    pub fn stats(&self, key: &PoolKey) -> PoolStats {
        match self.slots.get(key) {
            Some(entry) => {
                let slot = lock(entry.value());
                PoolStats { idle: slot.idle.len(), in_use: slot.in_use.len(), ..slot.stats }
            }
            None => PoolStats::default(),
        }
    }

    pub fn keys(&self) -> Vec<PoolKey> {
        self.slots.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Connections held by idle and borrowed statements.
    pub fn open_connections(&self) -> usize {
        self.slots
            .iter()
            .map(|entry| {
                let slot = lock(entry.value());
                slot.idle.len() + slot.in_use.len()
            })
            .sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close every idle statement and refuse further borrowing. Statements
    /// still borrowed are closed as soon as they are released.
    pub fn clear(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let slots: Vec<(PoolKey, Arc<Mutex<KeySlot>>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut closed = 0;
        let mut outstanding = 0;
        for (key, slot) in slots {
            let drained: Vec<PreparedStatement> = {
                let mut slot = lock(&slot);
                outstanding += slot.in_use.len();
                let idle = slot.idle.len() as u64;
                slot.stats.closed += idle;
                slot.idle.drain(..).collect()
            };
            closed += drained.len();
            if key.arity.is_some() {
                self.variadic_idle.fetch_sub(drained.len(), Ordering::SeqCst);
            }
            for statement in drained {
                statement.close(&key);
            }
        }

        info!(closed, outstanding, "Statement pool cleared");
    }
}

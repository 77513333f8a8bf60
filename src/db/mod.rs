pub mod records;
pub mod schema;
pub mod pool;
pub mod server;
pub mod table;
pub mod alerts;
pub mod alert_metadata;
pub mod alert_tags;
pub mod scans;
pub mod sessions;
pub mod params;
pub mod history;
pub mod backend;
pub mod database;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use alert_metadata::AlertMetadataTable;
pub use alert_tags::AlertTagTable;
pub use alerts::AlertTable;
pub use backend::{create_backend, DatabaseBackend, EmbeddedDatabase, GenericDatabase, EMBEDDED_CLASS, GENERIC_CLASS};
pub use database::Database;
pub use history::HistoryTable;
pub use params::ParamTable;
pub use pool::{PoolKey, PoolStats, StatementPool, MAX_IDLE_PER_KEY, MAX_IDLE_VARIADIC};
pub use records::*;
pub use scans::ScanTable;
pub use server::{DatabaseServer, EmbeddedServer, GenericServer, ServerKind};
pub use sessions::SessionTable;
pub use table::DatabaseListener;

// A panic in another caller leaves the guarded state consistent (every
// critical section is a single push/pop or statement), so poison is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

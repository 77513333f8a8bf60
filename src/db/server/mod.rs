//! Physical access to one backend instance.

pub mod embedded;
pub mod generic;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{info, warn};

use crate::errors::StoreError;
use super::lock;

pub use embedded::EmbeddedServer;
pub use generic::GenericServer;

pub type SharedConnection = Arc<Mutex<Connection>>;

/// Concrete server behind a [`DatabaseServer`], used by table accessors to
/// pick how they bind their statements.
pub enum ServerKind<'a> {
    Embedded(&'a EmbeddedServer),
    Generic(&'a GenericServer),
    /// A server implemented outside this crate; accessors reject it.
    Other(&'a str),
}

pub trait DatabaseServer: Send + Sync {
    fn kind(&self) -> ServerKind<'_>;

    /// Path or URL this server was opened with.
    fn locator(&self) -> &str;

    /// Open a fresh connection, retrying transient failures.
    fn new_connection(&self) -> Result<Connection, StoreError>;

    /// The lazily created connection shared by this server instance.
    fn singleton_connection(&self) -> Result<SharedConnection, StoreError>;

    /// Orderly shutdown, optionally compacting the store first. Idempotent.
    fn shutdown(&self, compact: bool) -> Result<(), StoreError>;

    fn is_shut_down(&self) -> bool;
}

/// Holder for a server's cached connection.
#[derive(Default)]
pub(crate) struct SingletonSlot {
    slot: Mutex<Option<SharedConnection>>,
}

impl SingletonSlot {
    pub fn get_or_connect(
        &self,
        connect: impl FnOnce() -> Result<Connection, StoreError>,
    ) -> Result<SharedConnection, StoreError> {
        let mut slot = lock(&self.slot);
        if let Some(shared) = slot.as_ref() {
            return Ok(shared.clone());
        }
        let shared = Arc::new(Mutex::new(connect()?));
        *slot = Some(shared.clone());
        Ok(shared)
    }

    /// Remove and close the cached connection.
    pub fn close(&self, locator: &str) {
        let Some(shared) = lock(&self.slot).take() else {
            return;
        };
        match Arc::try_unwrap(shared) {
            Ok(mutex) => {
                let conn = mutex.into_inner().unwrap_or_else(|e| e.into_inner());
                if let Err((_, e)) = conn.close() {
                    warn!(locator, error = %e, "Failed to close shared connection");
                }
            }
            // still borrowed elsewhere; it closes when the last user drops it
            Err(_) => warn!(locator, "Shared connection still in use at shutdown"),
        }
    }
}

/// Checkpoint the write-ahead log (when there is one) and rebuild the file.
pub(crate) fn compact(conn: &Connection, locator: &str) -> Result<(), StoreError> {
    info!(locator, "Compacting database");
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE); VACUUM;")?;
    Ok(())
}

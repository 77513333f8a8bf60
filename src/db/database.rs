use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{error, info, warn};

use crate::config::load_db_config;
use crate::errors::StoreError;
use super::alert_metadata::AlertMetadataTable;
use super::alert_tags::AlertTagTable;
use super::alerts::AlertTable;
use super::backend::{create_backend, DatabaseBackend, EmbeddedDatabase};
use super::history::HistoryTable;
use super::params::ParamTable;
use super::scans::ScanTable;
use super::server::DatabaseServer;
use super::sessions::SessionTable;
use super::table::DatabaseListener;
use super::{lock, read, write};

/// The store a caller opens and closes. Owns one accessor per table and
/// notifies them, then any registered listeners, of lifecycle changes.
pub struct Database {
    backend: Box<dyn DatabaseBackend>,
    server: RwLock<Option<Arc<dyn DatabaseServer>>>,
    history: Arc<HistoryTable>,
    sessions: Arc<SessionTable>,
    scans: Arc<ScanTable>,
    alerts: Arc<AlertTable>,
    alert_metadata: Arc<AlertMetadataTable>,
    alert_tags: Arc<AlertTagTable>,
    params: Arc<ParamTable>,
    listeners: Mutex<Vec<Arc<dyn DatabaseListener>>>,
}

impl Database {
    pub fn new(backend: Box<dyn DatabaseBackend>) -> Self {
        Self {
            backend,
            server: RwLock::new(None),
            history: Arc::new(HistoryTable::new()),
            sessions: Arc::new(SessionTable::new()),
            scans: Arc::new(ScanTable::new()),
            alerts: Arc::new(AlertTable::new()),
            alert_metadata: Arc::new(AlertMetadataTable::new()),
            alert_tags: Arc::new(AlertTagTable::new()),
            params: Arc::new(ParamTable::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// File based store with the bundled SQLite dictionary.
    pub fn embedded() -> Result<Self, StoreError> {
        Ok(Self::new(Box::new(EmbeddedDatabase::bundled()?)))
    }

    /// Backend described by `db.properties` in `dir`.
    pub fn from_config_dir(dir: &Path) -> Result<Self, StoreError> {
        let (config, dictionary) = load_db_config(dir)?;
        let backend = create_backend(&config, dictionary)?;
        info!(dir = %dir.display(), backend = backend.name(), dialect = %config.db_type, "Database configured");
        Ok(Self::new(backend))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Register a listener for the next open and every close after it.
    pub fn add_listener(&self, listener: Arc<dyn DatabaseListener>) {
        lock(&self.listeners).push(listener);
    }

    /// Accessors in notification order.
    fn tables(&self) -> [Arc<dyn DatabaseListener>; 7] {
        [
            self.history.clone(),
            self.sessions.clone(),
            self.scans.clone(),
            self.alerts.clone(),
            self.alert_metadata.clone(),
            self.alert_tags.clone(),
            self.params.clone(),
        ]
    }

    fn external_listeners(&self) -> Vec<Arc<dyn DatabaseListener>> {
        lock(&self.listeners).clone()
    }

    /// Open `locator`, closing whatever was open before. Tables are migrated
    /// before any external listener hears about the new server.
    pub fn open(&self, locator: &str) -> Result<(), StoreError> {
        self.close(false, false)?;

        let server = self.backend.connect(locator)?;
        *write(&self.server) = Some(server.clone());

        let notified = self
            .tables()
            .into_iter()
            .chain(self.external_listeners())
            .try_for_each(|listener| listener.database_open(&server));

        if let Err(e) = notified {
            error!(locator = server.locator(), error = %e, "Database open failed");
            if let Err(close_err) = self.close(false, false) {
                warn!(error = %close_err, "Failed to close after open failure");
            }
            return Err(e);
        }

        info!(locator = server.locator(), backend = self.backend.name(), "Database open");
        Ok(())
    }

    /// Open the backend's configured locator.
    pub fn open_default(&self) -> Result<(), StoreError> {
        let locator = self
            .backend
            .default_locator()
            .ok_or_else(|| StoreError::Config(format!("{} backend needs an explicit locator", self.backend.name())))?
            .to_string();
        self.open(&locator)
    }

    /// Close the store. With `cleanup`, temporary history and alert
    /// metadata/tags without an alert are purged first. Closing a closed
    /// store does nothing.
    pub fn close(&self, compact: bool, cleanup: bool) -> Result<(), StoreError> {
        let Some(server) = write(&self.server).take() else {
            return Ok(());
        };

        let purged = if cleanup { self.purge_transient() } else { Ok(()) };
        if let Err(e) = &purged {
            error!(error = %e, "Cleanup before close failed");
        }

        for listener in self.external_listeners() {
            listener.database_closed();
        }
        for table in self.tables() {
            table.database_closed();
        }

        let shutdown = server.shutdown(compact);
        info!(locator = server.locator(), compact, cleanup, "Database closed");
        purged.and(shutdown)
    }

    fn purge_transient(&self) -> Result<(), StoreError> {
        let history = self.history.delete_temporary()?;
        let metadata = self.alert_metadata.delete_orphaned()?;
        let tags = self.alert_tags.delete_orphaned()?;
        info!(history, metadata, tags, "Purged transient rows");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        read(&self.server).is_some()
    }

    pub fn server(&self) -> Option<Arc<dyn DatabaseServer>> {
        read(&self.server).clone()
    }

    /// Locator of the open server.
    pub fn locator(&self) -> Option<String> {
        read(&self.server).as_ref().map(|server| server.locator().to_string())
    }

    /// Delete a stored session: its file family on the embedded backend, its
    /// rows on the generic backend.
    pub fn delete_session(&self, name: &str) -> Result<(), StoreError> {
        self.backend.delete_session(self, name)
    }

    /// Delete every row scoped to `session_id` from the open store.
    pub fn discard_session(&self, session_id: i64) -> Result<(), StoreError> {
        let history = self.history.delete_by_session(session_id)?;
        // alerts are found through their scans, so they go first
        let alerts = self.alerts.delete_by_session(session_id)?;
        let scans = self.scans.delete_by_session(session_id)?;
        self.sessions.delete(session_id)?;
        info!(session_id, history, alerts, scans, "Discarded session");
        Ok(())
    }

    pub fn history(&self) -> &HistoryTable {
        &self.history
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn scans(&self) -> &ScanTable {
        &self.scans
    }

    pub fn alerts(&self) -> &AlertTable {
        &self.alerts
    }

    pub fn alert_metadata(&self) -> &AlertMetadataTable {
        &self.alert_metadata
    }

    pub fn alert_tags(&self) -> &AlertTagTable {
        &self.alert_tags
    }

    pub fn params(&self) -> &ParamTable {
        &self.params
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close(false, false) {
            warn!(error = %e, "Failed to close database on drop");
        }
    }
}

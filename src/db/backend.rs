//! Backend selection: which kind of server a [`Database`] opens and how it
//! deletes a session.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::{DbConfig, EmbeddedOptions, GenericOptions, SqlDictionary};
use crate::errors::StoreError;
use super::database::Database;
use super::server::{DatabaseServer, EmbeddedServer, GenericServer, ServerKind};

pub const EMBEDDED_CLASS: &str = "proxystore::db::EmbeddedDatabase";
pub const GENERIC_CLASS: &str = "proxystore::db::GenericDatabase";

const CRATE_PREFIX: &str = "proxystore::";

pub trait DatabaseBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a server for `locator`.
    fn connect(&self, locator: &str) -> Result<Arc<dyn DatabaseServer>, StoreError>;

    /// Locator used when the caller does not supply one.
    fn default_locator(&self) -> Option<&str> {
        None
    }

    /// Remove the session called `name` from storage.
    fn delete_session(&self, database: &Database, name: &str) -> Result<(), StoreError>;
}

/// File based sessions: one file family per session path.
pub struct EmbeddedDatabase {
    options: EmbeddedOptions,
    dictionary: Arc<SqlDictionary>,
}

impl EmbeddedDatabase {
    pub fn new(options: EmbeddedOptions, dictionary: Arc<SqlDictionary>) -> Self {
        Self { options, dictionary }
    }

    /// Default options with the bundled SQLite dictionary.
    pub fn bundled() -> Result<Self, StoreError> {
        Ok(Self::new(EmbeddedOptions::default(), Arc::new(SqlDictionary::bundled()?)))
    }
}

impl DatabaseBackend for EmbeddedDatabase {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn connect(&self, locator: &str) -> Result<Arc<dyn DatabaseServer>, StoreError> {
        let server = EmbeddedServer::open(locator, self.options.clone(), self.dictionary.clone())?;
        Ok(Arc::new(server))
    }

    fn delete_session(&self, database: &Database, name: &str) -> Result<(), StoreError> {
        let path = Path::new(name);
        if let Some(server) = database.server() {
            let in_use = match server.kind() {
                ServerKind::Embedded(open) => open.is_same_store(path),
                _ => server.locator() == name,
            };
            if in_use {
                return Err(StoreError::SessionInUse(name.to_string()));
            }
        }
        EmbeddedServer::delete_family(path)?;
        Ok(())
    }
}

/// Sessions as rows in one shared store reached through a URL.
pub struct GenericDatabase {
    config: DbConfig,
    options: GenericOptions,
    dictionary: Arc<SqlDictionary>,
}

impl GenericDatabase {
    pub fn new(config: DbConfig, options: GenericOptions, dictionary: Arc<SqlDictionary>) -> Self {
        Self { config, options, dictionary }
    }
}

impl DatabaseBackend for GenericDatabase {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn connect(&self, locator: &str) -> Result<Arc<dyn DatabaseServer>, StoreError> {
        let mut config = self.config.clone();
        if !locator.trim().is_empty() {
            config.url = locator.to_string();
        }
        let server = GenericServer::open(&config, self.options.clone(), self.dictionary.clone())?;
        Ok(Arc::new(server))
    }

    fn default_locator(&self) -> Option<&str> {
        Some(&self.config.url)
    }

    fn delete_session(&self, database: &Database, name: &str) -> Result<(), StoreError> {
        let ids = database.sessions().ids_by_name(name)?;
        for session_id in &ids {
            database.discard_session(*session_id)?;
        }
        info!(session = name, discarded = ids.len(), "Deleted session rows");
        Ok(())
    }
}

/// Instantiate the backend named by `db.class`.
pub fn create_backend(
    config: &DbConfig,
    dictionary: SqlDictionary,
) -> Result<Box<dyn DatabaseBackend>, StoreError> {
    let dictionary = Arc::new(dictionary);
    match config.class.as_str() {
        "embedded" | EMBEDDED_CLASS => {
            Ok(Box::new(EmbeddedDatabase::new(EmbeddedOptions::default(), dictionary)))
        }
        "generic" | GENERIC_CLASS => Ok(Box::new(GenericDatabase::new(
            config.clone(),
            GenericOptions::default(),
            dictionary,
        ))),
        other if other.starts_with(CRATE_PREFIX) => {
            Err(StoreError::Config(format!("{} is not a database facade", other)))
        }
        other => Err(StoreError::Config(format!("Cannot resolve database class '{}'", other))),
    }
}

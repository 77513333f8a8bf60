use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::{DbConfig, GenericOptions, SqlDictionary};
use crate::db::pool::StatementPool;
use crate::errors::{with_retry, StoreError};
use super::{compact, DatabaseServer, ServerKind, SharedConnection, SingletonSlot};

const URL_PREFIX: &str = "jdbc:";
const SQLITE_SCHEME: &str = "sqlite:";

/// Resolve a connection URL to what the driver opens.
///
/// Accepts `sqlite:<path>`, `sqlite://<path>` and `sqlite:file:<uri>`, each
/// optionally prefixed with `jdbc:`.
pub fn resolve_url(url: &str) -> Result<String, StoreError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(StoreError::Config("Database URL is empty".into()));
    }

    let stripped = url.strip_prefix(URL_PREFIX).unwrap_or(url);
    let Some(target) = stripped.strip_prefix(SQLITE_SCHEME) else {
        return Err(StoreError::Config(format!("No driver for database URL: {}", url)));
    };
    let target = target.strip_prefix("//").unwrap_or(target);

    if target.is_empty() || target == ":memory:" {
        // every pooled statement has its own connection, a private in-memory
        // database would not be shared between them
        return Err(StoreError::Config(format!("Database URL has no shareable target: {}", url)));
    }
    Ok(target.to_string())
}

/// Server reached through a connection URL; statements run through a
/// [`StatementPool`].
pub struct GenericServer {
    locator: String,
    target: Arc<String>,
    options: GenericOptions,
    dictionary: Arc<SqlDictionary>,
    pool: Arc<StatementPool>,
    singleton: SingletonSlot,
    shut_down: Arc<AtomicBool>,
}

impl GenericServer {
    pub fn open(
        config: &DbConfig,
        options: GenericOptions,
        dictionary: Arc<SqlDictionary>,
    ) -> Result<Self, StoreError> {
        let target = Arc::new(resolve_url(&config.url)?);
        if !config.user.is_empty() {
            debug!(user = %config.user, "Credentials are not used by the sqlite driver");
        }

        let shut_down = Arc::new(AtomicBool::new(false));
        let pool = {
            let target = target.clone();
            let options = options.clone();
            let shut_down = shut_down.clone();
            StatementPool::new(Box::new(move || {
                if shut_down.load(Ordering::SeqCst) {
                    return Err(StoreError::Closed);
                }
                connect(&target, &options)
            }))
        };

        let server = Self {
            locator: config.url.clone(),
            target,
            options,
            dictionary,
            pool: Arc::new(pool),
            singleton: SingletonSlot::default(),
            shut_down,
        };
        server.singleton_connection()?;

        info!(url = %server.locator, dialect = server.dictionary.dialect(), "Generic database opened");
        Ok(server)
    }

    pub fn pool(&self) -> &Arc<StatementPool> {
        &self.pool
    }

    pub fn dictionary(&self) -> &Arc<SqlDictionary> {
        &self.dictionary
    }
}

fn connect(target: &str, options: &GenericOptions) -> Result<Connection, StoreError> {
    with_retry("open database connection", &options.retry, || {
        let conn = Connection::open(target)?;
        conn.busy_timeout(options.busy_timeout)?;
        Ok(conn)
    })
}

impl DatabaseServer for GenericServer {
    fn kind(&self) -> ServerKind<'_> {
        ServerKind::Generic(self)
    }

    fn locator(&self) -> &str {
        &self.locator
    }

    fn new_connection(&self) -> Result<Connection, StoreError> {
        if self.is_shut_down() {
            return Err(StoreError::Closed);
        }
        connect(&self.target, &self.options)
    }

    fn singleton_connection(&self) -> Result<SharedConnection, StoreError> {
        self.singleton.get_or_connect(|| self.new_connection())
    }

    fn shutdown(&self, compact_store: bool) -> Result<(), StoreError> {
        if self.is_shut_down() {
            return Ok(());
        }
        self.pool.clear();
        if compact_store {
            let shared = self.singleton_connection()?;
            let conn = super::lock(&shared);
            compact(&conn, &self.locator)?;
        }
        self.shut_down.store(true, Ordering::SeqCst);
        self.singleton.close(&self.locator);
        info!(url = %self.locator, compacted = compact_store, "Generic database shut down");
        Ok(())
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RetryConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(url: &str) -> DbConfig {
        DbConfig {
            db_type: "sqlite".into(),
            class: "generic".into(),
            url: url.into(),
            user: String::new(),
            password: String::new(),
        }
    }

    #[test]
    fn test_resolve_url_forms() {
        assert_eq!(resolve_url("sqlite:/tmp/a.db").unwrap(), "/tmp/a.db");
        assert_eq!(resolve_url("jdbc:sqlite:/tmp/a.db").unwrap(), "/tmp/a.db");
        assert_eq!(resolve_url("sqlite:///tmp/a.db").unwrap(), "/tmp/a.db");
        assert_eq!(resolve_url("sqlite:file:/tmp/a.db?mode=rw").unwrap(), "file:/tmp/a.db?mode=rw");
    }

    #[test]
    fn test_resolve_url_rejects_unknown_or_private() {
        for url in ["", "postgres://localhost/db", "jdbc:hsqldb:file:x", "sqlite::memory:", "sqlite:"] {
            assert!(matches!(resolve_url(url), Err(StoreError::Config(_))), "{url}");
        }
    }

    #[test]
    fn test_open_and_shutdown_clears_pool() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}", dir.path().join("store.db").display());
        let dictionary = Arc::new(SqlDictionary::bundled().unwrap());
        let server = GenericServer::open(&config(&url), GenericOptions::default(), dictionary).unwrap();

        let key = crate::db::pool::PoolKey::new("select.one");
        server.pool().get(&key, "SELECT 1").unwrap().release();
        assert_eq!(server.pool().stats(&key).idle, 1);

        server.shutdown(false).unwrap();
        assert!(server.pool().is_closed());
        assert_eq!(server.pool().stats(&key).idle, 0);
        assert!(matches!(server.new_connection(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_unreachable_url_exhausts_retries() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:file:{}?mode=rw", dir.path().join("missing/x.db").display());
        let options = GenericOptions {
            busy_timeout: Duration::from_millis(10),
            retry: RetryConfig { max_attempts: 3, delay: Duration::from_millis(1) },
        };
        let dictionary = Arc::new(SqlDictionary::bundled().unwrap());
        match GenericServer::open(&config(&url), options, dictionary) {
            Err(StoreError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("opened an unreachable database"),
        }
    }
}

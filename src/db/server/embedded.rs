use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::{parse_properties_file, EmbeddedOptions, SqlDictionary};
use crate::errors::{with_retry, StoreError};
use super::{compact, DatabaseServer, ServerKind, SharedConnection, SingletonSlot};

/// On-disk format written by this version.
pub const CURRENT_FORMAT_VERSION: &str = "2";

/// Sibling files making up one embedded store, by suffix of the base path.
pub const FILE_FAMILY: [&str; 6] = ["", ".data", ".script", ".properties", ".backup", ".lobs"];

/// Engine side files next to the data file.
const ENGINE_FILES: [&str; 3] = [".data-wal", ".data-shm", ".data-journal"];

/// File based store addressed by a filesystem path.
pub struct EmbeddedServer {
    path: PathBuf,
    locator: String,
    options: EmbeddedOptions,
    dictionary: Arc<SqlDictionary>,
    singleton: SingletonSlot,
    shut_down: AtomicBool,
}

impl EmbeddedServer {
    pub fn open(
        locator: &str,
        options: EmbeddedOptions,
        dictionary: Arc<SqlDictionary>,
    ) -> Result<Self, StoreError> {
        if locator.trim().is_empty() {
            return Err(StoreError::Config("Embedded database path is empty".into()));
        }

        let path = PathBuf::from(locator);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let server = Self {
            path,
            locator: locator.to_string(),
            options,
            dictionary,
            singleton: SingletonSlot::default(),
            shut_down: AtomicBool::new(false),
        };

        server.upgrade_legacy_format()?;
        server.singleton_connection()?;
        server.write_format_version()?;

        info!(
            path = %server.path.display(),
            transaction_log = server.options.transaction_log,
            "Embedded database opened"
        );
        Ok(server)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_file(&self) -> PathBuf {
        sibling(&self.path, ".data")
    }

    pub fn properties_file(&self) -> PathBuf {
        sibling(&self.path, ".properties")
    }

    pub fn dictionary(&self) -> &Arc<SqlDictionary> {
        &self.dictionary
    }

    /// Every file that belongs to the store at `path`, existing or not.
    pub fn family(path: &Path) -> Vec<PathBuf> {
        FILE_FAMILY
            .iter()
            .chain(ENGINE_FILES.iter())
            .map(|suffix| sibling(path, suffix))
            .collect()
    }

    /// `path` with its directory resolved, so different spellings of one store
    /// compare equal. The store itself need not exist.
    pub fn canonical_path(path: &Path) -> PathBuf {
        let resolved = match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => {
                let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
                parent.canonicalize().map(|dir| dir.join(name))
            }
            _ => path.canonicalize(),
        };
        resolved.unwrap_or_else(|_| path.to_path_buf())
    }

    /// Whether `path` names the store this server has open.
    pub fn is_same_store(&self, path: &Path) -> bool {
        Self::canonical_path(&self.path) == Self::canonical_path(path)
    }

    /// Delete the whole file family at `path`. Returns how many files existed.
    pub fn delete_family(path: &Path) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for file in Self::family(path) {
            match std::fs::remove_file(&file) {
                Ok(()) => {
                    debug!(file = %file.display(), "Deleted session file");
                    deleted += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(path = %path.display(), deleted, "Deleted session files");
        Ok(deleted)
    }

    /// The `version` recorded in the `.properties` sidecar, if any.
    pub fn stored_version(path: &Path) -> Result<Option<String>, StoreError> {
        let file = sibling(path, ".properties");
        if !file.exists() {
            return Ok(None);
        }
        Ok(parse_properties_file(&file)?.get("version").cloned())
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        if self.is_shut_down() {
            return Err(StoreError::Closed);
        }
        let data_file = self.data_file();
        with_retry("open embedded connection", &self.options.retry, || {
            let conn = Connection::open(&data_file)?;
            self.tune(&conn)?;
            Ok(conn)
        })
    }

    fn tune(&self, conn: &Connection) -> Result<(), StoreError> {
        conn.busy_timeout(self.options.busy_timeout)?;
        let journal = if self.options.transaction_log { "WAL" } else { "MEMORY" };
        conn.execute_batch(&format!("PRAGMA journal_mode={}; PRAGMA synchronous=NORMAL;", journal))?;
        Ok(())
    }

    /// Stores written before the current format get a backup copy, a compacting
    /// shutdown and a reopen before anything else touches them.
    fn upgrade_legacy_format(&self) -> Result<bool, StoreError> {
        // no sidecar at all is a fresh store
        if !self.properties_file().exists() {
            return Ok(false);
        }
        let version = match Self::stored_version(&self.path)? {
            Some(v) if !version_before(&v, CURRENT_FORMAT_VERSION) => return Ok(false),
            Some(v) => v,
            None => "unrecorded".to_string(),
        };

        info!(path = %self.path.display(), version = %version, "Upgrading legacy database format");
        let data_file = self.data_file();
        if data_file.exists() {
            std::fs::copy(&data_file, sibling(&self.path, ".backup"))?;
        }

        let conn = self.connect()?;
        compact(&conn, &self.locator)?;
        if let Err((_, e)) = conn.close() {
            return Err(e.into());
        }
        Ok(true)
    }

    fn write_format_version(&self) -> Result<(), StoreError> {
        let file = self.properties_file();
        let mut entries: BTreeMap<String, String> = if file.exists() {
            parse_properties_file(&file)?.into_iter().collect()
        } else {
            BTreeMap::new()
        };
        if entries.get("version").map(String::as_str) == Some(CURRENT_FORMAT_VERSION) {
            return Ok(());
        }

        entries.insert("version".into(), CURRENT_FORMAT_VERSION.into());
        let mut content = String::from("# proxystore embedded database\n");
        for (key, value) in &entries {
            content.push_str(&format!("{}={}\n", key, value));
        }
        std::fs::write(&file, content)?;
        debug!(file = %file.display(), "Recorded database format version");
        Ok(())
    }
}

impl DatabaseServer for EmbeddedServer {
    fn kind(&self) -> ServerKind<'_> {
        ServerKind::Embedded(self)
    }

    fn locator(&self) -> &str {
        &self.locator
    }

    fn new_connection(&self) -> Result<Connection, StoreError> {
        self.connect()
    }

    fn singleton_connection(&self) -> Result<SharedConnection, StoreError> {
        self.singleton.get_or_connect(|| self.connect())
    }

    fn shutdown(&self, compact_store: bool) -> Result<(), StoreError> {
        if self.is_shut_down() {
            return Ok(());
        }
        if compact_store {
            let shared = self.singleton_connection()?;
            let conn = super::lock(&shared);
            compact(&conn, &self.locator)?;
        }
        self.shut_down.store(true, Ordering::SeqCst);
        self.singleton.close(&self.locator);
        info!(path = %self.path.display(), compacted = compact_store, "Embedded database shut down");
        Ok(())
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Compare dotted numeric versions; non numeric parts count as zero.
fn version_before(version: &str, reference: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.trim().split('.').map(|part| part.trim().parse().unwrap_or(0)).collect()
    };
    let (mut left, mut right) = (parse(version), parse(reference));
    let len = left.len().max(right.len());
    left.resize(len, 0);
    right.resize(len, 0);
    left < right
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> EmbeddedServer {
        let path = dir.path().join("session");
        let dictionary = Arc::new(SqlDictionary::bundled().unwrap());
        EmbeddedServer::open(path.to_str().unwrap(), EmbeddedOptions::default(), dictionary).unwrap()
    }

    #[test]
    fn test_version_before() {
        assert!(version_before("1", "2"));
        assert!(version_before("1.8.0", "2"));
        assert!(version_before("", "2"));
        assert!(!version_before("2", "2"));
        assert!(!version_before("2.0", "2"));
        assert!(!version_before("3", "2"));
    }

    #[test]
    fn test_open_creates_data_file_and_version() {
        let dir = TempDir::new().unwrap();
        let server = open(&dir);
        assert!(server.data_file().exists());
        assert_eq!(
            EmbeddedServer::stored_version(server.path()).unwrap().as_deref(),
            Some(CURRENT_FORMAT_VERSION)
        );
    }

    #[test]
    fn test_open_empty_path_is_config_error() {
        let dictionary = Arc::new(SqlDictionary::bundled().unwrap());
        let result = EmbeddedServer::open("  ", EmbeddedOptions::default(), dictionary);
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_legacy_version_is_upgraded_with_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session");
        {
            let server = open(&dir);
            server.new_connection().unwrap()
                .execute_batch("CREATE TABLE kept (v TEXT); INSERT INTO kept VALUES ('row');")
                .unwrap();
            server.shutdown(false).unwrap();
        }
        std::fs::write(sibling(&path, ".properties"), "version=1.8.0\nmodified=yesterday\n").unwrap();

        let server = open(&dir);
        assert!(sibling(&path, ".backup").exists());
        let props = parse_properties_file(&server.properties_file()).unwrap();
        assert_eq!(props["version"], "2");
        assert_eq!(props["modified"], "yesterday");

        let value: String = server.new_connection().unwrap()
            .query_row("SELECT v FROM kept", [], |r| r.get(0))
            .unwrap();
        assert_eq!(value, "row");
    }

    #[test]
    fn test_versionless_sidecar_is_treated_as_legacy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session");
        {
            let server = open(&dir);
            server.shutdown(false).unwrap();
        }
        std::fs::write(sibling(&path, ".properties"), "modified=yesterday\n").unwrap();

        let server = open(&dir);
        assert!(sibling(&path, ".backup").exists());
        let props = parse_properties_file(&server.properties_file()).unwrap();
        assert_eq!(props["version"], CURRENT_FORMAT_VERSION);
        assert_eq!(props["modified"], "yesterday");
    }

    #[test]
    fn test_fresh_store_is_not_backed_up() {
        let dir = TempDir::new().unwrap();
        let server = open(&dir);
        assert!(!sibling(server.path(), ".backup").exists());
    }

    #[test]
    fn test_same_store_ignores_spelling() {
        let dir = TempDir::new().unwrap();
        let server = open(&dir);
        assert!(server.is_same_store(&dir.path().join(".").join("session")));
        assert!(!server.is_same_store(&dir.path().join("other")));
        assert_eq!(
            EmbeddedServer::canonical_path(&dir.path().join("./missing")),
            dir.path().canonicalize().unwrap().join("missing")
        );
    }

    #[test]
    fn test_shutdown_refuses_new_connections() {
        let dir = TempDir::new().unwrap();
        let server = open(&dir);
        server.shutdown(true).unwrap();
        assert!(server.is_shut_down());
        assert!(matches!(server.new_connection(), Err(StoreError::Closed)));
        // a second shutdown is a no-op
        server.shutdown(true).unwrap();
    }

    #[test]
    fn test_delete_family_removes_every_sibling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session");
        for suffix in FILE_FAMILY {
            std::fs::write(sibling(&path, suffix), b"x").unwrap();
        }
        std::fs::write(dir.path().join("unrelated"), b"x").unwrap();

        assert_eq!(EmbeddedServer::delete_family(&path).unwrap(), FILE_FAMILY.len());
        for file in EmbeddedServer::family(&path) {
            assert!(!file.exists());
        }
        assert!(dir.path().join("unrelated").exists());
    }
}

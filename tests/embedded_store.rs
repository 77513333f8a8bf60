use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use proxystore::db::records::history_type;
use proxystore::db::server::SharedConnection;
use proxystore::db::{
    AlertTable, AlertUpdate, Database, DatabaseBackend, DatabaseServer, EmbeddedServer, NewAlert,
    NewHistory, NewParam, ServerKind,
};
use proxystore::errors::StoreError;
use rusqlite::Connection;
use tempfile::TempDir;

fn session_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn open_at(path: &Path) -> Database {
    let db = Database::embedded().unwrap();
    db.open(path.to_str().unwrap()).unwrap();
    db
}

fn xss_alert() -> NewAlert {
    NewAlert {
        scan_id: 1,
        plugin_id: 10,
        name: "XSS".to_string(),
        risk: 3,
        confidence: 2,
        ..Default::default()
    }
}

#[test]
fn test_insert_alert_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));

    let inserted = db.alerts().insert(&xss_alert()).unwrap();
    assert!(inserted.alert_id > 0);
    assert_eq!(inserted.name, "XSS");
    assert_eq!(inserted.risk, 3);
    assert_eq!(inserted.cwe_id, -1);

    let read = db.alerts().read(inserted.alert_id).unwrap().unwrap();
    assert_eq!(read, inserted);
    assert!(db.alerts().read(inserted.alert_id + 1).unwrap().is_none());
}

#[test]
fn test_alert_update_and_history_ids() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));
    let alert = db.alerts().insert(&xss_alert()).unwrap();

    let mut update = AlertUpdate::from(&alert);
    update.name = "Reflected XSS".to_string();
    update.evidence = "<script>".to_string();
    assert!(db.alerts().update(alert.alert_id, &update).unwrap());
    assert!(db.alerts().update_history_ids(alert.alert_id, 42, 41).unwrap());
    assert!(!db.alerts().update(alert.alert_id + 10, &update).unwrap());

    let read = db.alerts().read(alert.alert_id).unwrap().unwrap();
    assert_eq!(read.name, "Reflected XSS");
    assert_eq!(read.evidence, "<script>");
    assert_eq!(read.history_id, 42);
    assert_eq!(read.source_history_id, 41);
    assert_eq!(read.plugin_id, 10);

    let by_source = db.alerts().alerts_by_source_history_id(41).unwrap();
    assert_eq!(by_source.len(), 1);
    assert_eq!(by_source[0].alert_id, alert.alert_id);
}

#[test]
fn test_tag_insert_or_update_keeps_one_value_per_key() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));

    let first = db.alert_tags().insert_or_update(5, "OWASP", "A1").unwrap();
    let second = db.alert_tags().insert_or_update(5, "OWASP", "A03").unwrap();
    db.alert_tags().insert_or_update(5, "CWE", "79").unwrap();

    assert_eq!(first.tag_id, second.tag_id);
    assert_eq!(second.value, "A03");

    let tags = db.alert_tags().tags_by_alert_id(5).unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags["OWASP"], "A03");

    assert!(db.alert_tags().delete_tag(5, "CWE").unwrap());
    assert!(!db.alert_tags().delete_tag(5, "CWE").unwrap());
    assert_eq!(db.alert_tags().delete_for_alert(5).unwrap(), 1);
    assert!(db.alert_tags().all_tags().unwrap().is_empty());
}

#[test]
fn test_delete_all_alerts_returns_count() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));
    for _ in 0..4 {
        db.alerts().insert(&xss_alert()).unwrap();
    }
    assert_eq!(db.alerts().alert_list().unwrap().len(), 4);

    assert_eq!(db.alerts().delete_all().unwrap(), 4);
    assert!(db.alerts().alert_list().unwrap().is_empty());
    assert_eq!(db.alerts().count().unwrap(), 0);
}

#[test]
fn test_ids_are_not_reused_after_delete() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));
    let first = db.alerts().insert(&xss_alert()).unwrap();
    db.alerts().delete(first.alert_id).unwrap();
    let second = db.alerts().insert(&xss_alert()).unwrap();
    assert!(second.alert_id > first.alert_id);
}

#[test]
fn test_compact_close_and_reopen() {
    let dir = TempDir::new().unwrap();
    let path = session_path(&dir, "session");
    let db = open_at(&path);
    let alert = db.alerts().insert(&xss_alert()).unwrap();

    db.close(true, false).unwrap();
    assert!(!db.is_open());
    assert!(dir.path().join("session.data").exists());
    assert!(dir.path().join("session.properties").exists());

    db.open(path.to_str().unwrap()).unwrap();
    assert_eq!(db.alerts().read(alert.alert_id).unwrap().unwrap().name, "XSS");
}

#[test]
fn test_reconnect_on_migrated_schema_runs_no_ddl() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));
    let alert = db.alerts().insert(&xss_alert()).unwrap();

    let server = db.server().unwrap();
    assert_eq!(db.alerts().reconnect(&server).unwrap(), 0);
    assert_eq!(db.history().reconnect(&server).unwrap(), 0);
    assert_eq!(db.alerts().read(alert.alert_id).unwrap().unwrap().name, "XSS");
}

#[test]
fn test_older_alert_table_gains_columns_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = session_path(&dir, "session");
    {
        let conn = Connection::open(dir.path().join("session.data")).unwrap();
        conn.execute_batch(
            "CREATE TABLE alert (
                alert_id INTEGER PRIMARY KEY AUTOINCREMENT,
                scan_id INTEGER NOT NULL,
                plugin_id INTEGER NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                risk INTEGER NOT NULL DEFAULT 0,
                confidence INTEGER NOT NULL DEFAULT 2,
                description TEXT NOT NULL DEFAULT '',
                uri TEXT NOT NULL DEFAULT '',
                param TEXT NOT NULL DEFAULT '',
                other_info TEXT NOT NULL DEFAULT '',
                solution TEXT NOT NULL DEFAULT '',
                reference TEXT NOT NULL DEFAULT '',
                history_id INTEGER NOT NULL DEFAULT 0);
             INSERT INTO alert (scan_id, plugin_id, name, risk) VALUES (7, 40012, 'Old finding', 2);",
        )
        .unwrap();
    }

    let db = open_at(&path);
    let ids = db.alerts().alert_list().unwrap();
    assert_eq!(ids.len(), 1);

    let old = db.alerts().read(ids[0]).unwrap().unwrap();
    assert_eq!(old.name, "Old finding");
    assert_eq!(old.scan_id, 7);
    assert_eq!(old.cwe_id, -1);
    assert_eq!(old.wasc_id, -1);
    assert_eq!(old.evidence, "");
    assert_eq!(old.input_vector, "");
    assert_eq!(old.source_history_id, 0);
}

#[test]
fn test_scans_sessions_and_alerts_by_session() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));

    db.sessions().insert(1, "first").unwrap();
    db.sessions().insert(2, "second").unwrap();
    assert!(db.sessions().update(1, "renamed").unwrap());
    assert_eq!(db.sessions().read(1).unwrap().unwrap().session_name, "renamed");
    assert_eq!(db.sessions().ids_by_name("second").unwrap(), vec![2]);
    assert_eq!(db.sessions().list().unwrap().len(), 2);

    let before = chrono::Utc::now().naive_utc() - chrono::Duration::minutes(1);
    let scan_a = db.scans().insert(1, "active scan").unwrap();
    let scan_b = db.scans().insert(2, "spider").unwrap();
    assert!(scan_a.scan_time > before);
    assert_eq!(db.scans().scans_by_session(1).unwrap(), vec![scan_a.clone()]);

    let in_a = db.alerts().insert(&NewAlert { scan_id: scan_a.scan_id, ..xss_alert() }).unwrap();
    db.alerts().insert(&NewAlert { scan_id: scan_b.scan_id, ..xss_alert() }).unwrap();

    assert_eq!(db.alerts().alert_ids_by_session(1).unwrap(), vec![in_a.alert_id]);
    assert_eq!(db.alerts().alerts_by_session(1).unwrap(), vec![in_a.clone()]);
    assert_eq!(db.alerts().alerts_by_scan(scan_b.scan_id).unwrap().len(), 1);
}

#[test]
fn test_discard_session_removes_scoped_rows_only() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));

    for session_id in [1, 2] {
        db.sessions().insert(session_id, "s").unwrap();
        let scan = db.scans().insert(session_id, "scan").unwrap();
        db.alerts().insert(&NewAlert { scan_id: scan.scan_id, ..xss_alert() }).unwrap();
        db.history().write(&NewHistory { session_id, ..Default::default() }).unwrap();
    }

    db.discard_session(1).unwrap();

    assert!(db.sessions().read(1).unwrap().is_none());
    assert!(db.scans().scans_by_session(1).unwrap().is_empty());
    assert!(db.history().history_ids(1).unwrap().is_empty());
    assert!(db.alerts().alert_ids_by_session(1).unwrap().is_empty());

    assert!(db.sessions().read(2).unwrap().is_some());
    assert_eq!(db.alerts().alert_ids_by_session(2).unwrap().len(), 1);
    assert_eq!(db.history().history_ids(2).unwrap().len(), 1);
}

#[test]
fn test_history_variadic_operations() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));

    let proxied = db.history().write(&NewHistory { session_id: 3, uri: "http://a/".into(), ..Default::default() }).unwrap();
    let spider = db
        .history()
        .write(&NewHistory { session_id: 3, history_type: history_type::SPIDER, ..Default::default() })
        .unwrap();
    let manual = db
        .history()
        .write(&NewHistory { session_id: 3, history_type: history_type::MANUAL, ..Default::default() })
        .unwrap();

    assert_eq!(proxied.uri, "http://a/");
    assert_eq!(
        db.history().history_ids_of_types(3, &[history_type::SPIDER, history_type::MANUAL]).unwrap(),
        vec![spider.history_id, manual.history_id]
    );
    assert_eq!(db.history().history_ids_of_types(3, &[history_type::PROXIED]).unwrap(), vec![proxied.history_id]);
    assert!(db.history().history_ids_of_types(3, &[]).unwrap().is_empty());

    assert!(db.history().update_note(proxied.history_id, "login").unwrap());
    assert_eq!(db.history().read(proxied.history_id).unwrap().unwrap().note, "login");
    assert_eq!(db.history().last_index().unwrap(), manual.history_id);

    assert_eq!(db.history().delete_many(&[spider.history_id, manual.history_id]).unwrap(), 2);
    assert_eq!(db.history().delete_many(&[]).unwrap(), 0);
    assert_eq!(db.history().count().unwrap(), 1);
}

#[test]
fn test_params_crud() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));

    let param = db
        .params()
        .insert(&NewParam {
            site: "example.com:443".into(),
            param_type: "url".into(),
            name: "q".into(),
            used: 1,
            flags: String::new(),
            values: "test".into(),
        })
        .unwrap();
    assert!(db.params().update(param.param_id, 5, "reflected", "test,other").unwrap());

    let read = db.params().read(param.param_id).unwrap().unwrap();
    assert_eq!(read.used, 5);
    assert_eq!(read.flags, "reflected");
    assert_eq!(db.params().by_site("example.com:443").unwrap().len(), 1);
    assert!(db.params().by_site("other:80").unwrap().is_empty());
    assert_eq!(db.params().delete_all().unwrap(), 1);
}

#[test]
fn test_alert_metadata_is_not_cascaded() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));
    let alert = db.alerts().insert(&xss_alert()).unwrap();
    let metadata = db.alert_metadata().insert(alert.alert_id, "request", "GET /").unwrap();

    assert_eq!(db.alert_metadata().read(metadata.metadata_id).unwrap().unwrap().data, "GET /");
    db.alerts().delete(alert.alert_id).unwrap();
    assert_eq!(db.alert_metadata().by_alert_id(alert.alert_id).unwrap().len(), 1);

    assert_eq!(db.alert_metadata().delete_orphaned().unwrap(), 1);
    assert!(db.alert_metadata().by_alert_id(alert.alert_id).unwrap().is_empty());
}

#[test]
fn test_delete_session_removes_file_family() {
    let dir = TempDir::new().unwrap();
    let old = session_path(&dir, "old");
    let current = session_path(&dir, "current");

    let db = open_at(&old);
    db.alerts().insert(&xss_alert()).unwrap();
    db.open(current.to_str().unwrap()).unwrap();

    assert!(dir.path().join("old.data").exists());
    db.delete_session(old.to_str().unwrap()).unwrap();
    for file in EmbeddedServer::family(&old) {
        assert!(!file.exists(), "{} still exists", file.display());
    }

    let in_use = db.delete_session(current.to_str().unwrap());
    assert!(matches!(in_use, Err(StoreError::SessionInUse(_))));
    assert!(dir.path().join("current.data").exists());
}

#[test]
fn test_delete_session_refuses_other_spellings_of_open_store() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let current = session_path(&dir, "current");
    let db = open_at(&current);
    db.alerts().insert(&xss_alert()).unwrap();

    let aliases = [
        dir.path().join(".").join("current"),
        dir.path().join("sub").join("..").join("current"),
    ];
    for alias in &aliases {
        let result = db.delete_session(alias.to_str().unwrap());
        assert!(matches!(result, Err(StoreError::SessionInUse(_))), "{} was deleted", alias.display());
    }

    assert!(dir.path().join("current.data").exists());
    assert_eq!(db.alerts().count().unwrap(), 1);
}

#[test]
fn test_concurrent_inserts_get_unique_ids() {
    let dir = TempDir::new().unwrap();
    let db = open_at(&session_path(&dir, "session"));

    let ids: Vec<i64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let db = &db;
                s.spawn(move || {
                    (0..25)
                        .map(|i| {
                            let alert = NewAlert { plugin_id: t * 100 + i, ..xss_alert() };
                            let inserted = db.alerts().insert(&alert).unwrap();
                            assert_eq!(inserted.plugin_id, alert.plugin_id);
                            inserted.alert_id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(ids.len(), 200);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 200);
    assert_eq!(db.alerts().count().unwrap(), 200);
}

struct ForeignServer;

impl DatabaseServer for ForeignServer {
    fn kind(&self) -> ServerKind<'_> {
        ServerKind::Other("foreign")
    }

    fn locator(&self) -> &str {
        "foreign:store"
    }

    fn new_connection(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open_in_memory()?)
    }

    fn singleton_connection(&self) -> Result<SharedConnection, StoreError> {
        Err(StoreError::Closed)
    }

    fn shutdown(&self, _compact: bool) -> Result<(), StoreError> {
        Ok(())
    }

    fn is_shut_down(&self) -> bool {
        false
    }
}

struct ForeignBackend;

impl DatabaseBackend for ForeignBackend {
    fn name(&self) -> &'static str {
        "foreign"
    }

    fn connect(&self, _locator: &str) -> Result<Arc<dyn DatabaseServer>, StoreError> {
        Ok(Arc::new(ForeignServer))
    }

    fn delete_session(&self, _database: &Database, _name: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[test]
fn test_unknown_server_type_is_unsupported() {
    let server: Arc<dyn DatabaseServer> = Arc::new(ForeignServer);
    let result = AlertTable::new().reconnect(&server);
    assert!(matches!(result, Err(StoreError::UnsupportedBackend(_))));

    let db = Database::new(Box::new(ForeignBackend));
    assert!(matches!(db.open("anything"), Err(StoreError::UnsupportedBackend(_))));
    assert!(!db.is_open());
}

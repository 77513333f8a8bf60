use std::sync::Arc;

use rusqlite::params;

use crate::errors::StoreError;
use super::records::{AlertRecord, AlertUpdate, NewAlert};
use super::schema::Migration;
use super::server::DatabaseServer;
use super::table::{DatabaseListener, Op, Table};

const MIGRATIONS: &[Migration] = &[
    Migration::Table { table: "alert", ddl: "alert.ps.createtable" },
    Migration::Column { table: "alert", column: "source_history_id", ddl: "alert.ps.addsourcehistoryid" },
    Migration::Column { table: "alert", column: "attack", ddl: "alert.ps.addattack" },
    Migration::Column { table: "alert", column: "evidence", ddl: "alert.ps.addevidence" },
    Migration::Column { table: "alert", column: "cwe_id", ddl: "alert.ps.addcweid" },
    Migration::Column { table: "alert", column: "wasc_id", ddl: "alert.ps.addwascid" },
    Migration::Column { table: "alert", column: "source_id", ddl: "alert.ps.addsourceid" },
    Migration::Column { table: "alert", column: "alert_ref", ddl: "alert.ps.addalertref" },
    Migration::Column { table: "alert", column: "input_vector", ddl: "alert.ps.addinputvector" },
    Migration::Index { index: "alert_index_source_history", ddl: "alert.ps.createsourcehistoryindex" },
    Migration::Index { index: "alert_index_scan", ddl: "alert.ps.createscanindex" },
];

const READ: &str = "alert.ps.read";
const INSERT: &str = "alert.ps.insert";
const UPDATE: &str = "alert.ps.update";
const UPDATE_HISTORY_IDS: &str = "alert.ps.updatehistoryids";
const BY_SOURCE_HISTORY_ID: &str = "alert.ps.getalertsbysourcehistoryid";
const BY_SCAN: &str = "alert.ps.getalertsbyscan";
const BY_SESSION: &str = "alert.ps.getalertsbysession";
const LIST: &str = "alert.ps.getalertlist";
const LIST_BY_SESSION: &str = "alert.ps.getalertlistbysession";
const COUNT: &str = "alert.ps.count";
const DELETE: &str = "alert.ps.delete";
const DELETE_ALL: &str = "alert.ps.deleteall";
const DELETE_BY_SCAN: &str = "alert.ps.deletebyscan";
const DELETE_BY_SESSION: &str = "alert.ps.deletebysession";

const STATEMENTS: &[&str] = &[
    READ, INSERT, UPDATE, UPDATE_HISTORY_IDS, BY_SOURCE_HISTORY_ID, BY_SCAN, BY_SESSION,
    LIST, LIST_BY_SESSION, COUNT, DELETE, DELETE_ALL, DELETE_BY_SCAN, DELETE_BY_SESSION,
];

/// Findings raised by the scanners.
pub struct AlertTable {
    table: Table,
}

impl AlertTable {
    pub fn new() -> Self {
        Self { table: Table::new("alert", MIGRATIONS, STATEMENTS) }
    }

    pub fn reconnect(&self, server: &Arc<dyn DatabaseServer>) -> Result<usize, StoreError> {
        self.table.reconnect(server)
    }

    pub fn read(&self, alert_id: i64) -> Result<Option<AlertRecord>, StoreError> {
        self.table.call(Op::new(READ), |scope| {
            scope.query_opt(params![alert_id], AlertRecord::from_row)
        })
    }

    /// Store a new alert and return it as persisted, id included.
    pub fn insert(&self, alert: &NewAlert) -> Result<AlertRecord, StoreError> {
        self.table.call(Op::new(INSERT), |scope| {
            let alert_id = scope.insert(params![
                alert.scan_id,
                alert.plugin_id,
                alert.name,
                alert.risk,
                alert.confidence,
                alert.description,
                alert.uri,
                alert.param,
                alert.attack,
                alert.other_info,
                alert.solution,
                alert.reference,
                alert.evidence,
                alert.cwe_id,
                alert.wasc_id,
                alert.history_id,
                alert.source_history_id,
                alert.source_id,
                alert.alert_ref,
                alert.input_vector,
            ])?;
            scope.reread(READ, params![alert_id], AlertRecord::from_row)
        })
    }

    /// Rewrite the descriptive columns of an alert. Returns false when no
    /// alert has that id.
    pub fn update(&self, alert_id: i64, update: &AlertUpdate) -> Result<bool, StoreError> {
        let changed = self.table.call(Op::new(UPDATE), |scope| {
            scope.execute(params![
                alert_id,
                update.name,
                update.risk,
                update.confidence,
                update.description,
                update.uri,
                update.param,
                update.attack,
                update.other_info,
                update.solution,
                update.reference,
                update.evidence,
                update.cwe_id,
                update.wasc_id,
                update.source_history_id,
                update.input_vector,
            ])
        })?;
        Ok(changed > 0)
    }

    pub fn update_history_ids(
        &self,
        alert_id: i64,
        history_id: i64,
        source_history_id: i64,
    ) -> Result<bool, StoreError> {
        let changed = self.table.call(Op::new(UPDATE_HISTORY_IDS), |scope| {
            scope.execute(params![alert_id, history_id, source_history_id])
        })?;
        Ok(changed > 0)
    }

    pub fn alerts_by_source_history_id(&self, source_history_id: i64) -> Result<Vec<AlertRecord>, StoreError> {
        self.table.call(Op::new(BY_SOURCE_HISTORY_ID), |scope| {
            scope.query_all(params![source_history_id], AlertRecord::from_row)
        })
    }

    pub fn alerts_by_scan(&self, scan_id: i64) -> Result<Vec<AlertRecord>, StoreError> {
        self.table.call(Op::new(BY_SCAN), |scope| {
            scope.query_all(params![scan_id], AlertRecord::from_row)
        })
    }

    /// Alerts of every scan belonging to the session.
    pub fn alerts_by_session(&self, session_id: i64) -> Result<Vec<AlertRecord>, StoreError> {
        self.table.call(Op::new(BY_SESSION), |scope| {
            scope.query_all(params![session_id], AlertRecord::from_row)
        })
    }

    /// Ids of all alerts, ascending.
    pub fn alert_list(&self) -> Result<Vec<i64>, StoreError> {
        self.table.call(Op::new(LIST), |scope| scope.query_all([], |row| row.get(0)))
    }

    pub fn alert_ids_by_session(&self, session_id: i64) -> Result<Vec<i64>, StoreError> {
        self.table.call(Op::new(LIST_BY_SESSION), |scope| {
            scope.query_all(params![session_id], |row| row.get(0))
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.table.call(Op::new(COUNT), |scope| scope.query_scalar([]))
    }

    pub fn delete(&self, alert_id: i64) -> Result<bool, StoreError> {
        let deleted = self.table.call(Op::new(DELETE), |scope| scope.execute(params![alert_id]))?;
        Ok(deleted > 0)
    }

    /// Delete every alert. Returns how many were removed.
    pub fn delete_all(&self) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_ALL), |scope| scope.execute([]))
    }

    pub fn delete_by_scan(&self, scan_id: i64) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_BY_SCAN), |scope| scope.execute(params![scan_id]))
    }

    pub fn delete_by_session(&self, session_id: i64) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_BY_SESSION), |scope| scope.execute(params![session_id]))
    }
}

impl Default for AlertTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseListener for AlertTable {
    fn database_open(&self, server: &Arc<dyn DatabaseServer>) -> Result<(), StoreError> {
        self.reconnect(server).map(|_| ())
    }

    fn database_closed(&self) {
        self.table.unbind();
    }
}

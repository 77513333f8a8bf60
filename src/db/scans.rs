use std::sync::Arc;

use rusqlite::params;

use crate::errors::StoreError;
use super::records::ScanRecord;
use super::schema::Migration;
use super::server::DatabaseServer;
use super::table::{DatabaseListener, Op, Table};

const MIGRATIONS: &[Migration] = &[
    Migration::Table { table: "scan", ddl: "scan.ps.createtable" },
    Migration::Index { index: "scan_index_session", ddl: "scan.ps.createsessionindex" },
];

const READ: &str = "scan.ps.read";
const INSERT: &str = "scan.ps.insert";
const BY_SESSION: &str = "scan.ps.getscansbysession";
const DELETE: &str = "scan.ps.delete";
const DELETE_BY_SESSION: &str = "scan.ps.deletebysession";

const STATEMENTS: &[&str] = &[READ, INSERT, BY_SESSION, DELETE, DELETE_BY_SESSION];

pub struct ScanTable {
    table: Table,
}

impl ScanTable {
    pub fn new() -> Self {
        Self { table: Table::new("scan", MIGRATIONS, STATEMENTS) }
    }

    pub fn reconnect(&self, server: &Arc<dyn DatabaseServer>) -> Result<usize, StoreError> {
        self.table.reconnect(server)
    }

    pub fn read(&self, scan_id: i64) -> Result<Option<ScanRecord>, StoreError> {
        self.table.call(Op::new(READ), |scope| scope.query_opt(params![scan_id], ScanRecord::from_row))
    }

    /// Record a scan of `session_id`; the scan time comes from the store clock.
    pub fn insert(&self, session_id: i64, scan_name: &str) -> Result<ScanRecord, StoreError> {
        self.table.call(Op::new(INSERT), |scope| {
            let scan_id = scope.insert(params![session_id, scan_name])?;
            scope.reread(READ, params![scan_id], ScanRecord::from_row)
        })
    }

    pub fn scans_by_session(&self, session_id: i64) -> Result<Vec<ScanRecord>, StoreError> {
        self.table.call(Op::new(BY_SESSION), |scope| {
            scope.query_all(params![session_id], ScanRecord::from_row)
        })
    }

    pub fn delete(&self, scan_id: i64) -> Result<bool, StoreError> {
        let deleted = self.table.call(Op::new(DELETE), |scope| scope.execute(params![scan_id]))?;
        Ok(deleted > 0)
    }

    pub fn delete_by_session(&self, session_id: i64) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_BY_SESSION), |scope| scope.execute(params![session_id]))
    }
}

impl Default for ScanTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseListener for ScanTable {
    fn database_open(&self, server: &Arc<dyn DatabaseServer>) -> Result<(), StoreError> {
        self.reconnect(server).map(|_| ())
    }

    fn database_closed(&self) {
        self.table.unbind();
    }
}

use std::sync::Arc;

use rusqlite::params;

use crate::errors::StoreError;
use super::records::AlertMetadataRecord;
use super::schema::Migration;
use super::server::DatabaseServer;
use super::table::{DatabaseListener, Op, Table};

const MIGRATIONS: &[Migration] = &[
    Migration::Table { table: "alert_metadata", ddl: "alert.metadata.ps.createtable" },
    Migration::Index { index: "alert_metadata_index_alert", ddl: "alert.metadata.ps.createalertindex" },
];

const READ: &str = "alert.metadata.ps.read";
const INSERT: &str = "alert.metadata.ps.insert";
const BY_ALERT_ID: &str = "alert.metadata.ps.getbyalertid";
const DELETE: &str = "alert.metadata.ps.delete";
const DELETE_BY_ALERT_ID: &str = "alert.metadata.ps.deletebyalertid";
const DELETE_ALL: &str = "alert.metadata.ps.deleteall";
const DELETE_ORPHANED: &str = "alert.metadata.ps.deleteorphaned";

const STATEMENTS: &[&str] = &[READ, INSERT, BY_ALERT_ID, DELETE, DELETE_BY_ALERT_ID, DELETE_ALL, DELETE_ORPHANED];

/// Typed key/value data attached to alerts. Rows are not removed with their
/// alert; [`AlertMetadataTable::delete_orphaned`] purges them.
pub struct AlertMetadataTable {
    table: Table,
}

impl AlertMetadataTable {
    pub fn new() -> Self {
        Self { table: Table::new("alert_metadata", MIGRATIONS, STATEMENTS) }
    }

    pub fn reconnect(&self, server: &Arc<dyn DatabaseServer>) -> Result<usize, StoreError> {
        self.table.reconnect(server)
    }

    pub fn read(&self, metadata_id: i64) -> Result<Option<AlertMetadataRecord>, StoreError> {
        self.table.call(Op::new(READ), |scope| {
            scope.query_opt(params![metadata_id], AlertMetadataRecord::from_row)
        })
    }

    pub fn insert(&self, alert_id: i64, metadata_type: &str, data: &str) -> Result<AlertMetadataRecord, StoreError> {
        self.table.call(Op::new(INSERT), |scope| {
            let metadata_id = scope.insert(params![alert_id, metadata_type, data])?;
            scope.reread(READ, params![metadata_id], AlertMetadataRecord::from_row)
        })
    }

    pub fn by_alert_id(&self, alert_id: i64) -> Result<Vec<AlertMetadataRecord>, StoreError> {
        self.table.call(Op::new(BY_ALERT_ID), |scope| {
            scope.query_all(params![alert_id], AlertMetadataRecord::from_row)
        })
    }

    pub fn delete(&self, metadata_id: i64) -> Result<bool, StoreError> {
        let deleted = self.table.call(Op::new(DELETE), |scope| scope.execute(params![metadata_id]))?;
        Ok(deleted > 0)
    }

    pub fn delete_by_alert_id(&self, alert_id: i64) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_BY_ALERT_ID), |scope| scope.execute(params![alert_id]))
    }

    pub fn delete_all(&self) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_ALL), |scope| scope.execute([]))
    }

    /// Remove metadata whose alert no longer exists.
    pub fn delete_orphaned(&self) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_ORPHANED), |scope| scope.execute([]))
    }
}

impl Default for AlertMetadataTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseListener for AlertMetadataTable {
    fn database_open(&self, server: &Arc<dyn DatabaseServer>) -> Result<(), StoreError> {
        self.reconnect(server).map(|_| ())
    }

    fn database_closed(&self) {
        self.table.unbind();
    }
}

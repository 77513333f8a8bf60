use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::params;

use crate::errors::StoreError;
use super::records::AlertTagRecord;
use super::schema::Migration;
use super::server::DatabaseServer;
use super::table::{DatabaseListener, Op, Table};

const MIGRATIONS: &[Migration] = &[
    Migration::Table { table: "alert_tag", ddl: "alert.tag.ps.createtable" },
    Migration::Index { index: "alert_tag_index_alert_key", ddl: "alert.tag.ps.createkeyindex" },
];

const READ: &str = "alert.tag.ps.read";
const READ_BY_KEY: &str = "alert.tag.ps.readbykey";
const INSERT_OR_UPDATE: &str = "alert.tag.ps.insertorupdate";
const ALL_TAGS: &str = "alert.tag.ps.getalltags";
const BY_ALERT_ID: &str = "alert.tag.ps.gettagsbyalertid";
const DELETE: &str = "alert.tag.ps.delete";
const DELETE_FOR_ALERT: &str = "alert.tag.ps.deleteforalert";
const DELETE_ALL: &str = "alert.tag.ps.deleteall";
const DELETE_ORPHANED: &str = "alert.tag.ps.deleteorphaned";

const STATEMENTS: &[&str] = &[
    READ, READ_BY_KEY, INSERT_OR_UPDATE, ALL_TAGS, BY_ALERT_ID, DELETE, DELETE_FOR_ALERT, DELETE_ALL,
    DELETE_ORPHANED,
];

/// Free-form tags on alerts, at most one value per key and alert.
pub struct AlertTagTable {
    table: Table,
}

impl AlertTagTable {
    pub fn new() -> Self {
        Self { table: Table::new("alert_tag", MIGRATIONS, STATEMENTS) }
    }

    pub fn reconnect(&self, server: &Arc<dyn DatabaseServer>) -> Result<usize, StoreError> {
        self.table.reconnect(server)
    }

    pub fn read(&self, tag_id: i64) -> Result<Option<AlertTagRecord>, StoreError> {
        self.table.call(Op::new(READ), |scope| {
            scope.query_opt(params![tag_id], AlertTagRecord::from_row)
        })
    }

    /// Set `key` on the alert, replacing any previous value. The tag keeps
    /// its id when it already existed.
    pub fn insert_or_update(&self, alert_id: i64, key: &str, value: &str) -> Result<AlertTagRecord, StoreError> {
        self.table.call(Op::new(INSERT_OR_UPDATE), |scope| {
            scope.execute(params![alert_id, key, value])?;
            scope.reread(READ_BY_KEY, params![alert_id, key], AlertTagRecord::from_row)
        })
    }

    pub fn all_tags(&self) -> Result<Vec<AlertTagRecord>, StoreError> {
        self.table.call(Op::new(ALL_TAGS), |scope| scope.query_all([], AlertTagRecord::from_row))
    }

    /// Tags of one alert as key to value.
    pub fn tags_by_alert_id(&self, alert_id: i64) -> Result<BTreeMap<String, String>, StoreError> {
        let tags = self.table.call(Op::new(BY_ALERT_ID), |scope| {
            scope.query_all(params![alert_id], AlertTagRecord::from_row)
        })?;
        Ok(tags.into_iter().map(|tag| (tag.key, tag.value)).collect())
    }

    pub fn delete_tag(&self, alert_id: i64, key: &str) -> Result<bool, StoreError> {
        let deleted = self.table.call(Op::new(DELETE), |scope| scope.execute(params![alert_id, key]))?;
        Ok(deleted > 0)
    }

    pub fn delete_for_alert(&self, alert_id: i64) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_FOR_ALERT), |scope| scope.execute(params![alert_id]))
    }

    pub fn delete_all(&self) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_ALL), |scope| scope.execute([]))
    }

    /// Remove tags whose alert no longer exists.
    pub fn delete_orphaned(&self) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_ORPHANED), |scope| scope.execute([]))
    }
}

impl Default for AlertTagTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseListener for AlertTagTable {
    fn database_open(&self, server: &Arc<dyn DatabaseServer>) -> Result<(), StoreError> {
        self.reconnect(server).map(|_| ())
    }

    fn database_closed(&self) {
        self.table.unbind();
    }
}

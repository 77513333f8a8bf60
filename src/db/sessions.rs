use std::sync::Arc;

use rusqlite::params;

use crate::errors::StoreError;
use super::records::SessionRecord;
use super::schema::Migration;
use super::server::DatabaseServer;
use super::table::{DatabaseListener, Op, Table};

const MIGRATIONS: &[Migration] = &[Migration::Table { table: "session", ddl: "session.ps.createtable" }];

const READ: &str = "session.ps.read";
const INSERT: &str = "session.ps.insert";
const UPDATE: &str = "session.ps.update";
const LIST: &str = "session.ps.list";
const IDS_BY_NAME: &str = "session.ps.getidsbyname";
const DELETE: &str = "session.ps.delete";

const STATEMENTS: &[&str] = &[READ, INSERT, UPDATE, LIST, IDS_BY_NAME, DELETE];

/// Named units of scanning work. Session ids are chosen by the caller.
pub struct SessionTable {
    table: Table,
}

impl SessionTable {
    pub fn new() -> Self {
        Self { table: Table::new("session", MIGRATIONS, STATEMENTS) }
    }

    pub fn reconnect(&self, server: &Arc<dyn DatabaseServer>) -> Result<usize, StoreError> {
        self.table.reconnect(server)
    }

    pub fn read(&self, session_id: i64) -> Result<Option<SessionRecord>, StoreError> {
        self.table.call(Op::new(READ), |scope| {
            scope.query_opt(params![session_id], SessionRecord::from_row)
        })
    }

    pub fn insert(&self, session_id: i64, session_name: &str) -> Result<SessionRecord, StoreError> {
        self.table.call(Op::new(INSERT), |scope| {
            scope.execute(params![session_id, session_name])?;
            scope.reread(READ, params![session_id], SessionRecord::from_row)
        })
    }

    /// Rename a session and refresh its last access time.
    pub fn update(&self, session_id: i64, session_name: &str) -> Result<bool, StoreError> {
        let changed = self.table.call(Op::new(UPDATE), |scope| {
            scope.execute(params![session_id, session_name])
        })?;
        Ok(changed > 0)
    }

    /// All sessions, most recently accessed first.
    pub fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.table.call(Op::new(LIST), |scope| scope.query_all([], SessionRecord::from_row))
    }

    pub fn ids_by_name(&self, session_name: &str) -> Result<Vec<i64>, StoreError> {
        self.table.call(Op::new(IDS_BY_NAME), |scope| {
            scope.query_all(params![session_name], |row| row.get(0))
        })
    }

    pub fn delete(&self, session_id: i64) -> Result<bool, StoreError> {
        let deleted = self.table.call(Op::new(DELETE), |scope| scope.execute(params![session_id]))?;
        Ok(deleted > 0)
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseListener for SessionTable {
    fn database_open(&self, server: &Arc<dyn DatabaseServer>) -> Result<(), StoreError> {
        self.reconnect(server).map(|_| ())
    }

    fn database_closed(&self) {
        self.table.unbind();
    }
}

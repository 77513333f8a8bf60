use std::sync::Arc;

use rusqlite::{params, params_from_iter};
use tracing::info;

use crate::errors::StoreError;
use super::records::{history_type, HistoryRecord, NewHistory};
use super::schema::Migration;
use super::server::DatabaseServer;
use super::table::{DatabaseListener, Op, Table};

const MIGRATIONS: &[Migration] = &[
    Migration::Table { table: "history", ddl: "history.ps.createtable" },
    Migration::Column { table: "history", column: "time_elapsed_millis", ddl: "history.ps.addtimeelapsed" },
    Migration::Column { table: "history", column: "note", ddl: "history.ps.addnote" },
    Migration::Index { index: "history_index_session", ddl: "history.ps.createsessionindex" },
];

const READ: &str = "history.ps.read";
const INSERT: &str = "history.ps.insert";
const IDS: &str = "history.ps.gethistoryids";
const IDS_OF_TYPES: &str = "history.ps.gethistoryidsoftypes";
const DELETE: &str = "history.ps.delete";
const DELETE_BY_IDS: &str = "history.ps.deletebyids";
const DELETE_TEMPORARY: &str = "history.ps.deletetemporary";
const DELETE_SESSION: &str = "history.ps.deletesession";
const UPDATE_NOTE: &str = "history.ps.updatenote";
const LAST_INDEX: &str = "history.ps.lastindex";
const COUNT: &str = "history.ps.count";

// variadic statements are prepared per arity on first use
const STATEMENTS: &[&str] = &[READ, INSERT, IDS, DELETE, DELETE_SESSION, UPDATE_NOTE, LAST_INDEX, COUNT];

/// Message exchanges recorded by the proxy. Alerts refer to these rows by
/// history id.
pub struct HistoryTable {
    table: Table,
}

impl HistoryTable {
    pub fn new() -> Self {
        Self { table: Table::new("history", MIGRATIONS, STATEMENTS) }
    }

    pub fn reconnect(&self, server: &Arc<dyn DatabaseServer>) -> Result<usize, StoreError> {
        self.table.reconnect(server)
    }

    pub fn read(&self, history_id: i64) -> Result<Option<HistoryRecord>, StoreError> {
        self.table.call(Op::new(READ), |scope| {
            scope.query_opt(params![history_id], HistoryRecord::from_row)
        })
    }

    pub fn write(&self, history: &NewHistory) -> Result<HistoryRecord, StoreError> {
        self.table.call(Op::new(INSERT), |scope| {
            let history_id = scope.insert(params![
                history.session_id,
                history.history_type,
                history.method,
                history.uri,
                history.status_code,
                history.time_sent_millis,
                history.time_elapsed_millis,
                history.note,
            ])?;
            scope.reread(READ, params![history_id], HistoryRecord::from_row)
        })
    }

    pub fn history_ids(&self, session_id: i64) -> Result<Vec<i64>, StoreError> {
        self.table.call(Op::new(IDS), |scope| scope.query_all(params![session_id], |row| row.get(0)))
    }

    pub fn history_ids_of_types(&self, session_id: i64, types: &[i32]) -> Result<Vec<i64>, StoreError> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<i64> = std::iter::once(session_id)
            .chain(types.iter().map(|t| i64::from(*t)))
            .collect();
        self.table.call(Op::variadic(IDS_OF_TYPES, types.len()), |scope| {
            scope.query_all(params_from_iter(values.iter()), |row| row.get(0))
        })
    }

    pub fn delete(&self, history_id: i64) -> Result<bool, StoreError> {
        let deleted = self.table.call(Op::new(DELETE), |scope| scope.execute(params![history_id]))?;
        Ok(deleted > 0)
    }

    pub fn delete_many(&self, history_ids: &[i64]) -> Result<usize, StoreError> {
        if history_ids.is_empty() {
            return Ok(0);
        }
        self.table.call(Op::variadic(DELETE_BY_IDS, history_ids.len()), |scope| {
            scope.execute(params_from_iter(history_ids.iter()))
        })
    }

    /// Remove rows of the transient history types.
    pub fn delete_temporary(&self) -> Result<usize, StoreError> {
        let types = history_type::TRANSIENT;
        let deleted = self.table.call(Op::variadic(DELETE_TEMPORARY, types.len()), |scope| {
            scope.execute(params_from_iter(types.iter()))
        })?;
        if deleted > 0 {
            info!(deleted, "Deleted temporary history");
        }
        Ok(deleted)
    }

    pub fn delete_by_session(&self, session_id: i64) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_SESSION), |scope| scope.execute(params![session_id]))
    }

    pub fn update_note(&self, history_id: i64, note: &str) -> Result<bool, StoreError> {
        let changed = self.table.call(Op::new(UPDATE_NOTE), |scope| {
            scope.execute(params![history_id, note])
        })?;
        Ok(changed > 0)
    }

    /// Highest history id currently stored, 0 for an empty table.
    pub fn last_index(&self) -> Result<i64, StoreError> {
        self.table.call(Op::new(LAST_INDEX), |scope| scope.query_scalar([]))
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.table.call(Op::new(COUNT), |scope| scope.query_scalar([]))
    }
}

impl Default for HistoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseListener for HistoryTable {
    fn database_open(&self, server: &Arc<dyn DatabaseServer>) -> Result<(), StoreError> {
        self.reconnect(server).map(|_| ())
    }

    fn database_closed(&self) {
        self.table.unbind();
    }
}

use std::sync::Arc;

use rusqlite::params;

use crate::errors::StoreError;
use super::records::{NewParam, ParamRecord};
use super::schema::Migration;
use super::server::DatabaseServer;
use super::table::{DatabaseListener, Op, Table};

const MIGRATIONS: &[Migration] = &[
    Migration::Table { table: "param", ddl: "param.ps.createtable" },
    Migration::Index { index: "param_index_site", ddl: "param.ps.createsiteindex" },
];

const READ: &str = "param.ps.read";
const INSERT: &str = "param.ps.insert";
const ALL: &str = "param.ps.getall";
const BY_SITE: &str = "param.ps.getbysite";
const UPDATE: &str = "param.ps.update";
const DELETE_ALL: &str = "param.ps.deleteall";

const STATEMENTS: &[&str] = &[READ, INSERT, ALL, BY_SITE, UPDATE, DELETE_ALL];

/// Per-site parameter usage collected from proxied traffic.
pub struct ParamTable {
    table: Table,
}

impl ParamTable {
    pub fn new() -> Self {
        Self { table: Table::new("param", MIGRATIONS, STATEMENTS) }
    }

    pub fn reconnect(&self, server: &Arc<dyn DatabaseServer>) -> Result<usize, StoreError> {
        self.table.reconnect(server)
    }

    pub fn read(&self, param_id: i64) -> Result<Option<ParamRecord>, StoreError> {
        self.table.call(Op::new(READ), |scope| scope.query_opt(params![param_id], ParamRecord::from_row))
    }

    pub fn insert(&self, param: &NewParam) -> Result<ParamRecord, StoreError> {
        self.table.call(Op::new(INSERT), |scope| {
            let param_id = scope.insert(params![
                param.site,
                param.param_type,
                param.name,
                param.used,
                param.flags,
                param.values,
            ])?;
            scope.reread(READ, params![param_id], ParamRecord::from_row)
        })
    }

    pub fn all(&self) -> Result<Vec<ParamRecord>, StoreError> {
        self.table.call(Op::new(ALL), |scope| scope.query_all([], ParamRecord::from_row))
    }

    pub fn by_site(&self, site: &str) -> Result<Vec<ParamRecord>, StoreError> {
        self.table.call(Op::new(BY_SITE), |scope| scope.query_all(params![site], ParamRecord::from_row))
    }

    pub fn update(&self, param_id: i64, used: i64, flags: &str, values: &str) -> Result<bool, StoreError> {
        let changed = self.table.call(Op::new(UPDATE), |scope| {
            scope.execute(params![param_id, used, flags, values])
        })?;
        Ok(changed > 0)
    }

    pub fn delete_all(&self) -> Result<usize, StoreError> {
        self.table.call(Op::new(DELETE_ALL), |scope| scope.execute([]))
    }
}

impl Default for ParamTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseListener for ParamTable {
    fn database_open(&self, server: &Arc<dyn DatabaseServer>) -> Result<(), StoreError> {
        self.reconnect(server).map(|_| ())
    }

    fn database_closed(&self) {
        self.table.unbind();
    }
}

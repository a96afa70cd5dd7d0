//! DuckDB warehouse backend
//!
//! Each dataset is a DuckDB schema in the connected database. The project
//! half of a [`DatasetRef`] is ignored: one DuckDB file is one project.

use crate::error::{DbError, DbResult};
use crate::sql::{quote_ident, quote_relation};
use crate::traits::{DatasetInfo, TableInfo, TableKind, Warehouse};
use async_trait::async_trait;
use bqw_core::{DatasetName, DatasetRef, ProjectId, TableName};
use duckdb::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SYSTEM_SCHEMAS: [&str; 2] = ["information_schema", "pg_catalog"];

/// DuckDB warehouse backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    /// Run one or more raw SQL statements (fixtures, local setup)
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    fn schema_exists_sync(&self, schema: &str) -> DbResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.schemata \
             WHERE catalog_name = current_database() AND schema_name = ?",
            params![schema],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_tables_sync(&self, schema: &str) -> DbResult<Vec<TableInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT table_name, table_type FROM information_schema.tables \
             WHERE table_catalog = current_database() AND table_schema = ? \
             ORDER BY table_name",
        )?;
        let rows = stmt
            .query_map(params![schema], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables = Vec::with_capacity(rows.len());
        for (name, table_type) in rows {
            match TableName::try_new(name.as_str()) {
                Ok(name) => tables.push(TableInfo {
                    name,
                    kind: TableKind::from_label(&table_type),
                }),
                Err(e) => log::warn!("Skipping relation {}.{}: {}", schema, name, e),
            }
        }
        Ok(tables)
    }

    fn schema_comment_sync(&self, schema: &str) -> DbResult<Option<String>> {
        let conn = self.lock()?;
        let comment: Option<String> = conn.query_row(
            "SELECT comment FROM duckdb_schemas() \
             WHERE database_name = current_database() AND schema_name = ?",
            params![schema],
            |row| row.get(0),
        )?;
        Ok(comment)
    }

    fn execute_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(sql, []).map_err(|e| match DbError::from(e) {
            DbError::ExecutionError(msg) => DbError::ExecutionError(format!("{}: {}", msg, sql)),
            other => other,
        })?;
        Ok(())
    }
}

#[async_trait]
impl Warehouse for DuckDbBackend {
    async fn dataset_exists(&self, dataset: &DatasetRef) -> DbResult<bool> {
        self.schema_exists_sync(dataset.dataset.as_str())
    }

    async fn list_datasets(&self, project: Option<&ProjectId>) -> DbResult<Vec<DatasetRef>> {
        let names: Vec<String> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT schema_name FROM information_schema.schemata \
                 WHERE catalog_name = current_database() ORDER BY schema_name",
            )?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        Ok(names
            .into_iter()
            .filter(|name| !SYSTEM_SCHEMAS.contains(&name.as_str()))
            .filter_map(|name| DatasetName::try_new(name).ok())
            .map(|dataset| DatasetRef::new(project.cloned(), dataset))
            .collect())
    }

    async fn list_tables(&self, dataset: &DatasetRef) -> DbResult<Vec<TableInfo>> {
        let schema = dataset.dataset.as_str();
        if !self.schema_exists_sync(schema)? {
            return Err(DbError::NotFound(format!("dataset {}", dataset)));
        }
        self.list_tables_sync(schema)
    }

    async fn describe_dataset(&self, dataset: &DatasetRef) -> DbResult<DatasetInfo> {
        let schema = dataset.dataset.as_str();
        if !self.schema_exists_sync(schema)? {
            return Err(DbError::NotFound(format!("dataset {}", dataset)));
        }
        Ok(DatasetInfo {
            dataset: dataset.clone(),
            description: self.schema_comment_sync(schema)?,
            location: None,
            labels: BTreeMap::new(),
            tables: self.list_tables_sync(schema)?,
        })
    }

    async fn create_dataset(&self, dataset: &DatasetRef, _location: &str) -> DbResult<()> {
        self.execute_sync(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(dataset.dataset.as_str())
        ))
    }

    async fn delete_dataset(&self, dataset: &DatasetRef) -> DbResult<()> {
        self.execute_sync(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE",
            quote_ident(dataset.dataset.as_str())
        ))
    }

    async fn create_or_replace_view(
        &self,
        target: &DatasetRef,
        view: &TableName,
        source: &DatasetRef,
        table: &TableName,
    ) -> DbResult<()> {
        let sql = format!(
            "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}",
            quote_relation(target.dataset.as_str(), view.as_str()),
            quote_relation(source.dataset.as_str(), table.as_str()),
        );
        self.execute_sync(&sql)
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    /// Projects are ignored, so only the schema name identifies a dataset.
    fn canonical(&self, dataset: &DatasetRef) -> DatasetRef {
        DatasetRef::new(None, dataset.dataset.clone())
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;

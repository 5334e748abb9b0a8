//! SQLite store for the aggregated tables.
//!
//! A generation covers a set of tables. Each is written into
//! `<table>__shadow` inside one transaction. Committing the generation drops
//! every live table, renames the shadows into place and rebuilds the lookup
//! indices in that same transaction, so readers on the WAL see all the old
//! tables or all the new ones and never an empty or mixed set. Dropping an
//! uncommitted generation rolls back.

pub mod schema;

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::schema::TableSchema;

#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open or create the database at `path` in WAL mode
    pub fn open(path: &Path) -> Result<Store> {
        let conn = Connection::open(path)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(target: "topic_explorer::storage", path = %path.display(), journal_mode = %mode, "Store opened");
        Ok(Store {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Read-only connection for query callers
    pub fn open_read_only(path: &Path) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        table_exists(&self.conn, name)
    }

    /// Start a new generation of every table in `schemas`
    pub fn begin(&mut self, schemas: &[TableSchema]) -> Result<Generation<'_>> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut tables = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let shadow = schema.shadow_name();
            tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{shadow}\""))?;
            tx.execute_batch(&schema.create_sql(&shadow))?;
            debug!(target: "topic_explorer::storage", table = %schema.name, "Shadow table created");
            tables.push(ShadowTable {
                insert_sql: schema.insert_sql(&shadow),
                schema: schema.clone(),
                rows: 0,
            });
        }
        Ok(Generation { tx, tables })
    }
}

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

struct ShadowTable {
    schema: TableSchema,
    insert_sql: String,
    rows: usize,
}

/// Rows of one generation of tables, not yet visible to readers
pub struct Generation<'a> {
    tx: Transaction<'a>,
    tables: Vec<ShadowTable>,
}

impl Generation<'_> {
    fn position(&self, table: &str) -> Result<usize> {
        self.tables
            .iter()
            .position(|t| t.schema.name == table)
            .ok_or_else(|| Error::Pipeline(format!("table {table} is not part of this generation")))
    }

    /// Insert one complete row into `table`
    pub fn insert(&mut self, table: &str, row: &[Value]) -> Result<()> {
        let pos = self.position(table)?;
        let shadow = &self.tables[pos];
        if row.len() != shadow.schema.columns.len() {
            return Err(Error::Pipeline(format!(
                "row for {table} has {} values, expected {}",
                row.len(),
                shadow.schema.columns.len()
            )));
        }
        let mut stmt = self.tx.prepare_cached(&shadow.insert_sql)?;
        stmt.execute(params_from_iter(row.iter()))?;
        self.tables[pos].rows += 1;
        Ok(())
    }

    /// Rows inserted into `table` so far, 0 for a table outside the generation
    pub fn rows(&self, table: &str) -> usize {
        self.tables
            .iter()
            .find(|t| t.schema.name == table)
            .map_or(0, |t| t.rows)
    }

    /// Swap every shadow table in place of its live table and commit.
    /// Returns the row count of each table, in `begin` order.
    pub fn commit(self) -> Result<Vec<usize>> {
        for table in &self.tables {
            let live = &table.schema.name;
            let shadow = table.schema.shadow_name();
            self.tx.execute_batch(&format!(
                "DROP TABLE IF EXISTS \"{live}\"; ALTER TABLE \"{shadow}\" RENAME TO \"{live}\";"
            ))?;
            for sql in table.schema.index_sql() {
                self.tx.execute_batch(&sql)?;
            }
        }
        self.tx.commit()?;
        for table in &self.tables {
            info!(
                target: "topic_explorer::storage",
                table = %table.schema.name,
                rows = table.rows,
                "Table generation committed"
            );
        }
        Ok(self.tables.iter().map(|t| t.rows).collect())
    }
}

//! Storage connection and cursor traits.
//!
//! All I/O is blocking. A connection is shared behind an `Arc` and must use
//! interior mutability for its transaction state; the engine calls
//! `begin`/`commit`/`rollback` directly on the write connection of the first
//! record touched by a bulk mutation.

use crate::Result;
use crate::bind::{BindTypes, Binds};
use crate::dialect::Dialect;
use crate::error::Error;
use crate::row::Row;
use crate::value::Value;

/// A forward cursor over the rows of an executed query.
pub trait Cursor: Send {
    /// Total number of rows in the result.
    fn num_rows(&self) -> usize;

    /// Fetch the next row, or `None` when exhausted.
    fn fetch(&mut self) -> Option<Row>;

    /// Fetch every remaining row.
    fn fetch_all(&mut self) -> Vec<Row> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch() {
            rows.push(row);
        }
        rows
    }

    /// Reposition the cursor so the next `fetch` returns row `position`.
    fn data_seek(&mut self, position: usize) -> Result<()>;
}

/// A cursor over rows already held in memory.
#[derive(Debug, Clone, Default)]
pub struct RowsCursor {
    rows: Vec<Row>,
    position: usize,
}

impl RowsCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, position: 0 }
    }
}

impl Cursor for RowsCursor {
    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn fetch(&mut self) -> Option<Row> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        row
    }

    fn fetch_all(&mut self) -> Vec<Row> {
        let rest = self.rows.get(self.position..).unwrap_or_default().to_vec();
        self.position = self.rows.len();
        rest
    }

    fn data_seek(&mut self, position: usize) -> Result<()> {
        if position > self.rows.len() {
            return Err(Error::connection(
                format!("Cannot seek to row {position} of {}", self.rows.len()),
                None,
            ));
        }
        self.position = position;
        Ok(())
    }
}

/// A storage connection.
pub trait Connection: Send + Sync {
    /// Identifier of the database system (`"mysql"`, `"postgresql"`, ...).
    ///
    /// Models joined in one statement must share the same type.
    fn db_type(&self) -> &str;

    /// The SQL dialect used to render statements for this connection.
    fn dialect(&self) -> &dyn Dialect;

    /// Run a statement that returns rows.
    ///
    /// Returns `None` when the statement produced no result set.
    fn query(&self, sql: &str, binds: &Binds, types: &BindTypes)
    -> Result<Option<Box<dyn Cursor>>>;

    /// Run a statement that does not return rows; returns affected rows.
    fn execute(&self, sql: &str, binds: &Binds, types: &BindTypes) -> Result<u64>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    fn is_under_transaction(&self) -> bool;

    /// Identity generated by the last INSERT, if the driver reports one.
    fn last_insert_id(&self) -> Option<Value> {
        None
    }
}

// ABOUTME: Source-side collaborator trait for table discovery and row streaming
// ABOUTME: Implemented by the SQLite reader and by test doubles

use crate::schema::{Row, Table};
use anyhow::Result;
use std::sync::Arc;

/// Read schema and data from a source database
///
/// `tables` must return the same tables in the same order on every call, so
/// that a freshly constructed reader (in a worker or child process) sees the
/// same view as the one the converter selected tables from.
pub trait Reader {
    /// Enumerate every table in the source, in a stable order
    fn tables(&self) -> Result<Vec<Table>>;

    /// Stream every row of `table` to `sink`, returning the number of rows read
    ///
    /// Values in each row follow the order of `table.columns`. An error
    /// returned by `sink` stops the read and is propagated.
    fn read_rows(&self, table: &Table, sink: &mut dyn FnMut(Row) -> Result<()>) -> Result<u64>;

    /// Look a table up by name through this reader's own enumeration
    fn table(&self, name: &str) -> Result<Option<Table>> {
        Ok(self.tables()?.into_iter().find(|t| t.name == name))
    }
}

/// Builds an independent reader; called once for the shared instance and
/// once per parallel worker
pub type ReaderFactory = Arc<dyn Fn() -> Result<Box<dyn Reader>> + Send + Sync>;

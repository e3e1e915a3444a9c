// ABOUTME: Destination-side collaborator trait for DDL, data, and constraint output
// ABOUTME: Implemented by the PostgreSQL file and database writers

use crate::reader::Reader;
use crate::schema::Table;
use anyhow::Result;
use std::sync::Arc;

/// Apply schema and data to a destination
pub trait Writer {
    /// Create (or recreate) the table structure
    fn write_table(&mut self, table: &Table) -> Result<()>;

    /// Remove every row from an existing table
    fn truncate(&mut self, table: &Table) -> Result<()>;

    /// Stream the table's rows from `reader`, returning the number written
    fn write_contents(&mut self, table: &Table, reader: &dyn Reader) -> Result<u64>;

    fn write_indexes(&mut self, table: &Table) -> Result<()>;

    /// Foreign keys; written after every table's indexes exist
    fn write_constraints(&mut self, table: &Table) -> Result<()>;

    fn write_triggers(&mut self, table: &Table) -> Result<()>;

    /// Flush buffered output and release the destination
    fn close(&mut self) -> Result<()>;
}

/// Builds an independent writer; called once for the shared instance and
/// once per parallel worker
pub type WriterFactory = Arc<dyn Fn() -> Result<Box<dyn Writer>> + Send + Sync>;

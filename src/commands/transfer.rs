// ABOUTME: Transfer command implementation - copy one table's rows in a child process
// ABOUTME: Entry point launched by parallel conversions with only the table name

use crate::commands::build_factories;
use crate::config::{load_config, Destination};
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;

/// Transfer the rows of a single table
///
/// The child opens its own reader and writer from the configuration, finds
/// the table through its own reader, streams it, and closes the writer.
pub fn transfer_table(config_path: &Path, table_name: &str) -> Result<u64> {
    let config = load_config(config_path)?;
    if let Destination::File(_) = config.destination()? {
        bail!("transfer-table requires a PostgreSQL destination");
    }

    let (reader_factory, writer_factory) = build_factories(&config)?;
    let reader = reader_factory().context("Failed to open source reader")?;
    let table = reader
        .table(table_name)?
        .ok_or_else(|| anyhow!("Table '{}' not found in source", table_name))?;

    let mut writer = writer_factory().context("Failed to open destination writer")?;
    let transferred = writer
        .write_contents(&table, reader.as_ref())
        .with_context(|| format!("Failed to write data for table '{}'", table_name));
    let closed = writer.close().context("Failed to close destination writer");

    let rows = transferred?;
    closed?;

    tracing::info!("Transferred {} rows for table '{}'", rows, table_name);
    Ok(rows)
}

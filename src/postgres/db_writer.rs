// ABOUTME: Writer applying the conversion directly to a live PostgreSQL database
// ABOUTME: Runs DDL through tokio-postgres and streams rows with COPY FROM STDIN

use super::{connection, copy, ddl, WriterOptions};
use crate::reader::Reader;
use crate::schema::Table;
use crate::writer::{Writer, WriterFactory};
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use futures::SinkExt;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_postgres::Client;

/// Rows are sent to the server in chunks of about this size
const COPY_CHUNK_BYTES: usize = 256 * 1024;

/// Writes into a PostgreSQL database over its own connection
///
/// Each writer owns a single-threaded runtime so it can be used from plain
/// worker threads; the connection task only makes progress inside the
/// writer's own calls.
pub struct PostgresDbWriter {
    runtime: Runtime,
    client: Option<Client>,
    options: WriterOptions,
}

impl PostgresDbWriter {
    pub fn connect(connection_string: &str) -> Result<Self> {
        Self::connect_with_options(connection_string, WriterOptions::default())
    }

    pub fn connect_with_options(connection_string: &str, options: WriterOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime for PostgreSQL writer")?;

        let client = runtime.block_on(connection::connect_with_retry(connection_string))?;
        tracing::debug!("Connected PostgreSQL writer");

        let writer = Self {
            runtime,
            client: Some(client),
            options,
        };
        writer.execute(options.session_statements())?;
        Ok(writer)
    }

    /// Factory opening a new connection on every call
    pub fn factory(connection_string: impl Into<String>, options: WriterOptions) -> WriterFactory {
        let connection_string = connection_string.into();
        Arc::new(move || {
            Ok(
                Box::new(PostgresDbWriter::connect_with_options(&connection_string, options)?)
                    as Box<dyn Writer>,
            )
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| anyhow!("PostgreSQL writer is already closed"))
    }

    fn execute(&self, statements: Vec<String>) -> Result<()> {
        let client = self.client()?;
        self.runtime.block_on(async {
            for statement in &statements {
                tracing::debug!("Executing: {}", statement);
                client
                    .batch_execute(statement)
                    .await
                    .with_context(|| format!("Failed to execute: {}", statement))?;
            }
            Ok::<(), anyhow::Error>(())
        })
    }
}

impl Writer for PostgresDbWriter {
    fn write_table(&mut self, table: &Table) -> Result<()> {
        self.execute(ddl::create_table(table, self.options.utc_timestamps))
    }

    fn truncate(&mut self, table: &Table) -> Result<()> {
        self.execute(ddl::truncate(table))
    }

    fn write_contents(&mut self, table: &Table, reader: &dyn Reader) -> Result<u64> {
        let client = self.client()?;
        let runtime = &self.runtime;
        let types = copy::column_types(table);
        let statement = copy::copy_statement(table);

        let sink = runtime
            .block_on(client.copy_in::<_, Bytes>(statement.as_str()))
            .with_context(|| format!("Failed to start COPY for table '{}'", table.name))?;
        let mut sink = Box::pin(sink);

        let mut buffer = String::with_capacity(COPY_CHUNK_BYTES);
        let rows = reader.read_rows(table, &mut |row| {
            copy::encode_row(&row, &types, &mut buffer);
            if buffer.len() >= COPY_CHUNK_BYTES {
                let chunk = Bytes::from(std::mem::take(&mut buffer));
                runtime
                    .block_on(sink.send(chunk))
                    .with_context(|| format!("Failed to send COPY data for '{}'", table.name))?;
            }
            Ok(())
        })?;

        if !buffer.is_empty() {
            runtime
                .block_on(sink.send(Bytes::from(buffer)))
                .with_context(|| format!("Failed to send COPY data for '{}'", table.name))?;
        }
        let copied = runtime
            .block_on(sink.as_mut().finish())
            .with_context(|| format!("Failed to finish COPY for table '{}'", table.name))?;

        self.execute(ddl::advance_sequences(table))?;

        tracing::info!("Copied {} rows into table '{}'", copied, table.name);
        Ok(rows)
    }

    fn write_indexes(&mut self, table: &Table) -> Result<()> {
        self.execute(ddl::indexes(table))
    }

    fn write_constraints(&mut self, table: &Table) -> Result<()> {
        self.execute(ddl::constraints(table))
    }

    fn write_triggers(&mut self, table: &Table) -> Result<()> {
        self.execute(ddl::triggers(table))
    }

    fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            tracing::debug!("Closed PostgreSQL writer");
        }
        Ok(())
    }
}

// ABOUTME: Writer producing a PostgreSQL SQL script loadable with psql
// ABOUTME: Emits DDL statements and COPY ... FROM stdin data blocks into one buffered file

use super::{copy, ddl, WriterOptions};
use crate::reader::Reader;
use crate::schema::Table;
use crate::writer::{Writer, WriterFactory};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const HEADER: &str = "\
SET client_encoding = 'UTF8';
SET standard_conforming_strings = on;
SET check_function_bodies = false;
SET client_min_messages = warning;

";

/// Rows are buffered and written to the file in chunks of about this size
const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Writes the converted schema and data as a SQL script
#[derive(Debug)]
pub struct PostgresFileWriter {
    path: PathBuf,
    out: BufWriter<File>,
    options: WriterOptions,
}

impl PostgresFileWriter {
    /// Creates (or truncates) the output file and writes the session header
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_options(path, WriterOptions::default())
    }

    pub fn create_with_options(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;

        let mut writer = Self {
            path,
            out: BufWriter::new(file),
            options,
        };
        writer.write_raw(HEADER)?;
        let session = options.session_statements();
        if !session.is_empty() {
            writer.write_statements(session)?;
            writer.write_raw("\n")?;
        }

        tracing::info!("Writing SQL script to {}", writer.path.display());
        Ok(writer)
    }

    /// Factory for the converter
    ///
    /// Every call truncates the file, which is why file destinations always
    /// run with a single worker and never call the factory twice.
    pub fn factory(path: impl Into<PathBuf>, options: WriterOptions) -> WriterFactory {
        let path = path.into();
        Arc::new(move || {
            Ok(Box::new(PostgresFileWriter::create_with_options(&path, options)?) as Box<dyn Writer>)
        })
    }

    fn write_raw(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .with_context(|| format!("Failed to write to {}", self.path.display()))
    }

    fn write_statements(&mut self, statements: Vec<String>) -> Result<()> {
        for statement in statements {
            self.write_raw(&statement)?;
            self.write_raw(";\n")?;
        }
        Ok(())
    }
}

impl Writer for PostgresFileWriter {
    fn write_table(&mut self, table: &Table) -> Result<()> {
        self.write_raw(&format!("-- Table: {}\n", table.name))?;
        self.write_statements(ddl::create_table(table, self.options.utc_timestamps))?;
        self.write_raw("\n")
    }

    fn truncate(&mut self, table: &Table) -> Result<()> {
        self.write_statements(ddl::truncate(table))
    }

    fn write_contents(&mut self, table: &Table, reader: &dyn Reader) -> Result<u64> {
        let types = copy::column_types(table);
        self.write_raw(&format!("-- Data for {}\n", table.name))?;
        self.write_raw(&copy::copy_statement(table))?;
        self.write_raw(";\n")?;

        let mut buffer = String::with_capacity(COPY_CHUNK_BYTES);
        let rows = reader.read_rows(table, &mut |row| {
            copy::encode_row(&row, &types, &mut buffer);
            if buffer.len() >= COPY_CHUNK_BYTES {
                self.write_raw(&buffer)?;
                buffer.clear();
            }
            Ok(())
        })?;
        self.write_raw(&buffer)?;
        self.write_raw("\\.\n\n")?;
        self.write_statements(ddl::advance_sequences(table))?;

        tracing::info!("Wrote {} rows for table '{}'", rows, table.name);
        Ok(rows)
    }

    fn write_indexes(&mut self, table: &Table) -> Result<()> {
        self.write_statements(ddl::indexes(table))
    }

    fn write_constraints(&mut self, table: &Table) -> Result<()> {
        self.write_statements(ddl::constraints(table))
    }

    fn write_triggers(&mut self, table: &Table) -> Result<()> {
        self.write_statements(ddl::triggers(table))
    }

    fn close(&mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        tracing::info!("Finished writing {}", self.path.display());
        Ok(())
    }
}

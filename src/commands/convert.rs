// ABOUTME: Convert command implementation - run a full SQLite or MySQL to PostgreSQL conversion
// ABOUTME: Loads configuration, builds reader/writer factories, and reports the outcome

use crate::config::{load_or_initialize, ConverterConfig, Destination, Source};
use crate::converter::{ConversionReport, Converter};
use crate::mysql::MysqlReader;
use crate::postgres::{PostgresDbWriter, PostgresFileWriter};
use crate::reader::ReaderFactory;
use crate::scheduler::ProcessLauncher;
use crate::sqlite::SqliteReader;
use crate::utils;
use crate::writer::WriterFactory;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Builds the reader and writer factories for the configured source and destination
pub fn build_factories(config: &ConverterConfig) -> Result<(ReaderFactory, WriterFactory)> {
    let reader_factory = match config.source()? {
        Source::Sqlite(path) => SqliteReader::factory(path),
        Source::Mysql(url) => MysqlReader::factory(url),
    };
    let writer_options = config.writer_options();
    let writer_factory = match config.destination()? {
        Destination::File(path) => PostgresFileWriter::factory(path, writer_options),
        Destination::Postgres(url) => PostgresDbWriter::factory(url, writer_options),
    };
    Ok((reader_factory, writer_factory))
}

/// Run a conversion as described by the configuration file
///
/// This command:
/// 1. Loads the configuration, writing a sample file on first run
/// 2. Opens the SQLite or MySQL source and the destination
/// 3. Runs every enabled phase, transferring tables in child processes
///    when more than one worker is configured
/// 4. Logs a summary, including tables whose transfer failed
pub fn convert(config_path: &Path, verbose: bool) -> Result<ConversionReport> {
    let config = load_or_initialize(config_path)?;
    let options = config.conversion_options(verbose)?;
    let (reader_factory, writer_factory) = build_factories(&config)?;

    match config.source()? {
        Source::Sqlite(path) => tracing::info!("Source: SQLite {}", path),
        Source::Mysql(url) => tracing::info!(
            "Source: MySQL {}",
            utils::sanitize_identifier(&utils::strip_password_from_url(&url))
        ),
    }
    match config.destination()? {
        Destination::File(path) => tracing::info!("Destination: file {}", path.display()),
        Destination::Postgres(url) => tracing::info!(
            "Destination: PostgreSQL {}",
            utils::sanitize_identifier(&utils::strip_password_from_url(&url))
        ),
    }

    let num_workers = options.num_workers;
    let mut converter = Converter::new(reader_factory, writer_factory, options)
        .context("Failed to open source and destination")?;

    if num_workers > 1 {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", config_path.display()))?;
        tracing::info!("Transferring tables with {} parallel workers", num_workers);
        converter =
            converter.with_launcher(Arc::new(ProcessLauncher::new(config_path)?.verbose(verbose)));
    }

    let report = converter.convert()?;

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("Conversion complete: {} tables", report.tables.len());
    tracing::info!("========================================");
    if !report.failed_transfers.is_empty() {
        tracing::warn!(
            "⚠ {} table(s) failed to transfer:",
            report.failed_transfers.len()
        );
        for failure in &report.failed_transfers {
            tracing::warn!("  - {}: {}", failure.table, failure.error);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_initializes_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("seren-converter.toml");

        let result = convert(&config_path, false);

        assert!(result.is_err());
        assert!(config_path.exists());
    }

    #[test]
    fn test_convert_reports_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("seren-converter.toml");
        std::fs::write(
            &config_path,
            format!(
                "[source]\nsqlite = \"{}\"\n\n[destination]\nfile = \"{}\"\n",
                dir.path().join("missing.db").display(),
                dir.path().join("out.sql").display()
            ),
        )
        .unwrap();

        let err = convert(&config_path, false).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open source and destination"));
    }
}

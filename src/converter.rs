// ABOUTME: Conversion orchestrator driving the phased schema and data pipeline
// ABOUTME: Selects tables, runs DDL/truncate/data/index phases, and always closes the writer

use crate::filters::TableSelection;
use crate::progress::{Phase, ProgressObserver, TracingProgress};
use crate::reader::{Reader, ReaderFactory};
use crate::scheduler::{
    InlineLauncher, TransferErrorPolicy, TransferFailure, TransferLauncher, TransferScheduler,
};
use crate::schema::Table;
use crate::writer::{Writer, WriterFactory};
use anyhow::{bail, Context, Result};
use std::sync::Arc;

/// Settings fixed for the lifetime of one conversion run
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub selection: TableSelection,
    pub suppress_ddl: bool,
    pub suppress_data: bool,
    /// Only honored together with `suppress_ddl`: truncation stands in for
    /// recreating the tables, it never runs in addition to it
    pub force_truncate: bool,
    pub num_workers: usize,
    pub verbose: bool,
    pub on_transfer_error: TransferErrorPolicy,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            selection: TableSelection::all(),
            suppress_ddl: false,
            suppress_data: false,
            force_truncate: false,
            num_workers: 1,
            verbose: false,
            on_transfer_error: TransferErrorPolicy::default(),
        }
    }
}

impl ConversionOptions {
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            bail!("Number of workers must be at least 1");
        }
        Ok(())
    }

    pub fn truncates(&self) -> bool {
        self.force_truncate && self.suppress_ddl
    }
}

/// Outcome of a completed conversion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    /// Selected table names, in processing order
    pub tables: Vec<String>,
    pub created_tables: bool,
    pub truncated_tables: bool,
    pub transferred_data: bool,
    pub created_indexes: bool,
    /// Parallel transfers that failed under the `Continue` policy
    pub failed_transfers: Vec<TransferFailure>,
}

/// Drives one conversion run from a reader to a writer
///
/// The factories build the shared reader/writer at construction and fresh,
/// independent ones for every parallel transfer worker. `convert` consumes
/// the converter, so a run happens at most once.
pub struct Converter {
    reader: Box<dyn Reader>,
    writer: Box<dyn Writer>,
    reader_factory: ReaderFactory,
    writer_factory: WriterFactory,
    options: ConversionOptions,
    launcher: Arc<dyn TransferLauncher>,
    progress: Arc<dyn ProgressObserver>,
}

impl Converter {
    pub fn new(
        reader_factory: ReaderFactory,
        writer_factory: WriterFactory,
        options: ConversionOptions,
    ) -> Result<Self> {
        options.validate()?;

        let reader = reader_factory().context("Failed to open source reader")?;
        let writer = writer_factory().context("Failed to open destination writer")?;

        Ok(Self {
            reader,
            writer,
            reader_factory,
            writer_factory,
            options,
            launcher: Arc::new(InlineLauncher),
            progress: Arc::new(TracingProgress),
        })
    }

    /// Sets how parallel workers run each table transfer
    pub fn with_launcher(mut self, launcher: Arc<dyn TransferLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Sets the observer that receives verbose progress markers
    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs every enabled phase, then closes the writer
    ///
    /// The writer is closed exactly once even when a phase fails; in that
    /// case the phase error is returned and a close error is only logged.
    pub fn convert(mut self) -> Result<ConversionReport> {
        if self.options.verbose {
            self.progress.run_started();
        }

        let outcome = self.run_phases();
        let closed = self
            .writer
            .close()
            .context("Failed to close destination writer");

        match (outcome, closed) {
            (Ok(report), Ok(())) => {
                if self.options.verbose {
                    self.progress.run_finished();
                }
                Ok(report)
            }
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                tracing::error!(
                    "Failed to close destination writer after an earlier failure: {:#}",
                    close_err
                );
                Err(e)
            }
        }
    }

    fn run_phases(&mut self) -> Result<ConversionReport> {
        let all_tables = self
            .reader
            .tables()
            .context("Failed to list source tables")?;
        let tables = self.options.selection.select(all_tables);
        tracing::info!("Converting {} tables", tables.len());

        let mut report = ConversionReport {
            tables: tables.iter().map(|t| t.name.clone()).collect(),
            ..Default::default()
        };

        if !self.options.suppress_ddl {
            self.phase_started(Phase::CreateTables);
            for table in &tables {
                self.writer
                    .write_table(table)
                    .with_context(|| format!("Failed to create table '{}'", table.name))?;
            }
            self.phase_finished(Phase::CreateTables);
            report.created_tables = true;
        }

        if self.options.truncates() {
            for table in &tables {
                self.writer
                    .truncate(table)
                    .with_context(|| format!("Failed to truncate table '{}'", table.name))?;
            }
            report.truncated_tables = true;
        }

        if !self.options.suppress_data {
            self.phase_started(Phase::WriteData);
            report.failed_transfers = self.transfer_data(&tables)?;
            self.phase_finished(Phase::WriteData);
            report.transferred_data = true;
        }

        if !self.options.suppress_ddl {
            self.phase_started(Phase::CreateIndexes);
            self.write_post_data_ddl(&tables)?;
            self.phase_finished(Phase::CreateIndexes);
            report.created_indexes = true;
        }

        Ok(report)
    }

    fn transfer_data(&mut self, tables: &[Table]) -> Result<Vec<TransferFailure>> {
        let scheduler = TransferScheduler::new(
            self.options.num_workers,
            self.options.on_transfer_error,
            self.reader_factory.clone(),
            self.writer_factory.clone(),
            self.launcher.clone(),
        );
        scheduler.run(tables, self.reader.as_ref(), self.writer.as_mut())
    }

    // Constraints and triggers may reference indexes or constraints on any
    // other table, so each kind is one full pass over the whole set.
    fn write_post_data_ddl(&mut self, tables: &[Table]) -> Result<()> {
        for table in tables {
            self.writer
                .write_indexes(table)
                .with_context(|| format!("Failed to create indexes for table '{}'", table.name))?;
        }
        for table in tables {
            self.writer.write_constraints(table).with_context(|| {
                format!("Failed to create constraints for table '{}'", table.name)
            })?;
        }
        for table in tables {
            self.writer
                .write_triggers(table)
                .with_context(|| format!("Failed to create triggers for table '{}'", table.name))?;
        }
        Ok(())
    }

    fn phase_started(&self, phase: Phase) {
        if self.options.verbose {
            self.progress.phase_started(phase);
        }
    }

    fn phase_finished(&self, phase: Phase) {
        if self.options.verbose {
            self.progress.phase_finished(phase);
        }
    }
}

// ABOUTME: Data-transfer scheduling for the conversion pipeline
// ABOUTME: Runs table transfers sequentially or through a bounded pool of dispatcher threads

use crate::reader::{Reader, ReaderFactory};
use crate::schema::Table;
use crate::writer::{Writer, WriterFactory};
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

/// What the parallel scheduler does when one table's transfer fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferErrorPolicy {
    /// Stop dispatching new tables and fail the run once in-flight transfers finish
    #[default]
    FailFast,
    /// Keep transferring the remaining tables and report failures at the end
    Continue,
}

/// A table whose parallel transfer failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub table: String,
    pub error: String,
}

/// Runs one table transfer in isolation and blocks until it completes
///
/// The reader and writer are the calling worker's private instances, never
/// the converter's shared ones.
pub trait TransferLauncher: Send + Sync {
    fn launch(&self, table: &Table, reader: &dyn Reader, writer: &mut dyn Writer) -> Result<()>;
}

/// Transfers on the dispatcher thread itself
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineLauncher;

impl TransferLauncher for InlineLauncher {
    fn launch(&self, table: &Table, reader: &dyn Reader, writer: &mut dyn Writer) -> Result<()> {
        let rows = writer.write_contents(table, reader)?;
        tracing::info!("Transferred {} rows for table '{}'", rows, table.name);
        Ok(())
    }
}

/// Transfers each table in a child process
///
/// Only the table name crosses the process boundary. The child runs the
/// hidden `transfer-table` command, opens its own source and destination from
/// the same configuration file, and finds the table through its own reader.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    config_path: PathBuf,
    verbose: bool,
}

impl ProcessLauncher {
    /// Launches children of the currently running executable
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let program =
            std::env::current_exe().context("Failed to locate the running executable")?;
        Ok(Self::with_program(program, config_path))
    }

    pub fn with_program(program: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config_path: config_path.into(),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn command(&self, table_name: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("transfer-table")
            .arg("--config")
            .arg(&self.config_path)
            .arg("--table")
            .arg(table_name)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if self.verbose {
            cmd.arg("--verbose");
        }
        cmd
    }
}

impl TransferLauncher for ProcessLauncher {
    fn launch(&self, table: &Table, _reader: &dyn Reader, _writer: &mut dyn Writer) -> Result<()> {
        let status = self.command(&table.name).status().with_context(|| {
            format!(
                "Failed to start transfer process for table '{}' ({})",
                table.name,
                self.program.display()
            )
        })?;

        if !status.success() {
            bail!(
                "Transfer process for table '{}' exited with {}",
                table.name,
                status
            );
        }

        Ok(())
    }
}

enum WorkItem<'a> {
    Transfer(&'a Table),
    Stop,
}

/// Moves row data for the selected tables from reader to writer
pub struct TransferScheduler {
    num_workers: usize,
    policy: TransferErrorPolicy,
    reader_factory: ReaderFactory,
    writer_factory: WriterFactory,
    launcher: Arc<dyn TransferLauncher>,
}

impl TransferScheduler {
    pub fn new(
        num_workers: usize,
        policy: TransferErrorPolicy,
        reader_factory: ReaderFactory,
        writer_factory: WriterFactory,
        launcher: Arc<dyn TransferLauncher>,
    ) -> Self {
        Self {
            num_workers,
            policy,
            reader_factory,
            writer_factory,
            launcher,
        }
    }

    /// Transfers every table once
    ///
    /// With one worker, tables go through the shared `reader`/`writer` in
    /// order and the first error aborts. With more, the shared instances are
    /// left untouched and failures follow the configured policy; under
    /// `Continue` they are returned rather than raised.
    pub fn run(
        &self,
        tables: &[Table],
        reader: &dyn Reader,
        writer: &mut dyn Writer,
    ) -> Result<Vec<TransferFailure>> {
        if self.num_workers <= 1 {
            self.run_sequential(tables, reader, writer)?;
            return Ok(Vec::new());
        }
        self.run_parallel(tables)
    }

    fn run_sequential(
        &self,
        tables: &[Table],
        reader: &dyn Reader,
        writer: &mut dyn Writer,
    ) -> Result<()> {
        for table in tables {
            let rows = writer
                .write_contents(table, reader)
                .with_context(|| format!("Failed to write data for table '{}'", table.name))?;
            tracing::info!("Transferred {} rows for table '{}'", rows, table.name);
        }
        Ok(())
    }

    fn run_parallel(&self, tables: &[Table]) -> Result<Vec<TransferFailure>> {
        tracing::info!(
            "Transferring {} tables with {} workers",
            tables.len(),
            self.num_workers
        );

        // Tables first, then one stop marker per worker: a worker that sees a
        // marker knows every table has already been taken.
        let (sender, receiver) = mpsc::channel();
        for table in tables {
            sender
                .send(WorkItem::Transfer(table))
                .map_err(|_| anyhow!("Transfer queue closed while loading tables"))?;
        }
        for _ in 0..self.num_workers {
            sender
                .send(WorkItem::Stop)
                .map_err(|_| anyhow!("Transfer queue closed while loading tables"))?;
        }
        drop(sender);

        let queue = Mutex::new(receiver);
        let abort = AtomicBool::new(false);
        let failures = Mutex::new(Vec::new());

        let worker_errors = thread::scope(|scope| -> Result<Vec<anyhow::Error>> {
            let queue = &queue;
            let abort = &abort;
            let failures = &failures;

            let mut handles = Vec::with_capacity(self.num_workers);
            for worker_id in 0..self.num_workers {
                let handle = thread::Builder::new()
                    .name(format!("transfer-worker-{}", worker_id))
                    .spawn_scoped(scope, move || {
                        self.dispatch(worker_id, queue, abort, failures)
                    })
                    .context("Failed to spawn transfer worker thread")?;
                handles.push(handle);
            }

            let mut errors = Vec::new();
            for (worker_id, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => errors.push(e),
                    Err(_) => errors.push(anyhow!("Transfer worker {} panicked", worker_id)),
                }
            }
            Ok(errors)
        })?;

        if let Some(error) = worker_errors.into_iter().next() {
            return Err(error);
        }

        let failures = failures
            .into_inner()
            .map_err(|_| anyhow!("Transfer failure list lock poisoned"))?;

        if !failures.is_empty() {
            let names: Vec<&str> = failures.iter().map(|f| f.table.as_str()).collect();
            match self.policy {
                TransferErrorPolicy::FailFast => bail!(
                    "{} table transfer(s) failed: {}",
                    failures.len(),
                    names.join(", ")
                ),
                TransferErrorPolicy::Continue => tracing::warn!(
                    "{} table transfer(s) failed and were skipped: {}",
                    failures.len(),
                    names.join(", ")
                ),
            }
        }

        Ok(failures)
    }

    fn dispatch(
        &self,
        worker_id: usize,
        queue: &Mutex<Receiver<WorkItem<'_>>>,
        abort: &AtomicBool,
        failures: &Mutex<Vec<TransferFailure>>,
    ) -> Result<()> {
        let (reader, mut writer) = match self.open_worker_session(worker_id) {
            Ok(session) => session,
            Err(e) => {
                if self.policy == TransferErrorPolicy::FailFast {
                    abort.store(true, Ordering::SeqCst);
                }
                return Err(e);
            }
        };

        loop {
            let item = queue
                .lock()
                .map_err(|_| anyhow!("Transfer queue lock poisoned"))?
                .recv();

            let table = match item {
                Ok(WorkItem::Transfer(table)) => table,
                Ok(WorkItem::Stop) | Err(_) => break,
            };

            if abort.load(Ordering::SeqCst) {
                tracing::debug!(
                    "Worker {} skipping table '{}' after an earlier failure",
                    worker_id,
                    table.name
                );
                continue;
            }

            tracing::debug!("Worker {} transferring table '{}'", worker_id, table.name);
            if let Err(e) = self
                .launcher
                .launch(table, reader.as_ref(), writer.as_mut())
            {
                tracing::error!("Transfer of table '{}' failed: {:#}", table.name, e);
                failures
                    .lock()
                    .map_err(|_| anyhow!("Transfer failure list lock poisoned"))?
                    .push(TransferFailure {
                        table: table.name.clone(),
                        error: format!("{:#}", e),
                    });
                if self.policy == TransferErrorPolicy::FailFast {
                    abort.store(true, Ordering::SeqCst);
                }
            }
        }

        writer
            .close()
            .with_context(|| format!("Transfer worker {} failed to close its writer", worker_id))
    }

    fn open_worker_session(&self, worker_id: usize) -> Result<(Box<dyn Reader>, Box<dyn Writer>)> {
        let reader = (self.reader_factory)()
            .with_context(|| format!("Transfer worker {} failed to open its reader", worker_id))?;
        let writer = (self.writer_factory)()
            .with_context(|| format!("Transfer worker {} failed to open its writer", worker_id))?;
        Ok((reader, writer))
    }
}

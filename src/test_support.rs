// ABOUTME: Recording reader, writer, and launcher doubles for unit tests
// ABOUTME: Each writer call is logged as "<label>:<operation>[:<table>]"

use crate::reader::{Reader, ReaderFactory};
use crate::scheduler::TransferLauncher;
use crate::schema::{Row, Table, Value};
use crate::writer::{Writer, WriterFactory};
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct MockReader {
    tables: Vec<Table>,
}

impl MockReader {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }
}

impl Reader for MockReader {
    fn tables(&self) -> Result<Vec<Table>> {
        Ok(self.tables.clone())
    }

    fn read_rows(&self, table: &Table, sink: &mut dyn FnMut(Row) -> Result<()>) -> Result<u64> {
        sink(vec![Value::Text(format!("{}-1", table.name))])?;
        sink(vec![Value::Text(format!("{}-2", table.name))])?;
        Ok(2)
    }
}

pub struct RecordingWriter {
    label: String,
    log: CallLog,
    fail_on: Option<(String, String)>,
}

impl RecordingWriter {
    pub fn new(label: &str, log: CallLog) -> Self {
        Self {
            label: label.to_string(),
            log,
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, operation: &str, table: &str) -> Self {
        self.fail_on = Some((operation.to_string(), table.to_string()));
        self
    }

    fn record(&self, operation: &str, table: &Table) -> Result<()> {
        self.log
            .push(format!("{}:{}:{}", self.label, operation, table.name));
        if let Some((op, name)) = &self.fail_on {
            if op == operation && name == &table.name {
                bail!("simulated {} failure on {}", operation, table.name);
            }
        }
        Ok(())
    }
}

impl Writer for RecordingWriter {
    fn write_table(&mut self, table: &Table) -> Result<()> {
        self.record("write_table", table)
    }

    fn truncate(&mut self, table: &Table) -> Result<()> {
        self.record("truncate", table)
    }

    fn write_contents(&mut self, table: &Table, reader: &dyn Reader) -> Result<u64> {
        self.record("write_contents", table)?;
        reader.read_rows(table, &mut |_row| Ok(()))
    }

    fn write_indexes(&mut self, table: &Table) -> Result<()> {
        self.record("write_indexes", table)
    }

    fn write_constraints(&mut self, table: &Table) -> Result<()> {
        self.record("write_constraints", table)
    }

    fn write_triggers(&mut self, table: &Table) -> Result<()> {
        self.record("write_triggers", table)
    }

    fn close(&mut self) -> Result<()> {
        self.log.push(format!("{}:close", self.label));
        if let Some((op, _)) = &self.fail_on {
            if op == "close" {
                bail!("simulated close failure");
            }
        }
        Ok(())
    }
}

pub fn reader_factory(tables: Vec<Table>) -> ReaderFactory {
    Arc::new(move || Ok(Box::new(MockReader::new(tables.clone())) as Box<dyn Reader>))
}

pub fn writer_factory(label: &str, log: CallLog) -> WriterFactory {
    let label = label.to_string();
    Arc::new(move || Ok(Box::new(RecordingWriter::new(&label, log.clone())) as Box<dyn Writer>))
}

/// Launcher that records transfers and tracks how many overlap
#[derive(Default)]
pub struct CountingLauncher {
    delay: Duration,
    fail_on: Vec<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    transferred: Mutex<Vec<String>>,
}

impl CountingLauncher {
    pub fn with_delay_ms(ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            ..Default::default()
        }
    }

    pub fn failing_on(tables: &[&str]) -> Self {
        Self {
            fail_on: tables.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn transferred(&self) -> Vec<String> {
        self.transferred.lock().unwrap().clone()
    }
}

impl TransferLauncher for CountingLauncher {
    fn launch(&self, table: &Table, _reader: &dyn Reader, _writer: &mut dyn Writer) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.transferred.lock().unwrap().push(table.name.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.contains(&table.name) {
            bail!("simulated failure for {}", table.name);
        }
        Ok(())
    }
}

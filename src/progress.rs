// ABOUTME: Phase-boundary progress reporting for conversion runs
// ABOUTME: Observer trait injected into the converter, with a tracing-backed default

use std::fmt;

/// A pipeline phase that reports start/end markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CreateTables,
    WriteData,
    CreateIndexes,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::CreateTables => "CREATING TABLES",
            Phase::WriteData => "WRITING TABLE DATA",
            Phase::CreateIndexes => "CREATING INDEXES, CONSTRAINTS, AND TRIGGERS",
        };
        f.write_str(label)
    }
}

/// Receives progress markers when the converter runs in verbose mode
///
/// Purely observational: nothing an observer does can change the run.
pub trait ProgressObserver: Send + Sync {
    fn run_started(&self) {}
    fn phase_started(&self, phase: Phase);
    fn phase_finished(&self, phase: Phase);
    fn run_finished(&self) {}
}

/// Logs progress markers through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn run_started(&self) {
        tracing::info!(">>>>>>>>>> STARTING <<<<<<<<<<");
    }

    fn phase_started(&self, phase: Phase) {
        tracing::info!("START {}", phase);
    }

    fn phase_finished(&self, phase: Phase) {
        tracing::info!("DONE {}", phase);
    }

    fn run_finished(&self) {
        tracing::info!(">>>>>>>>>> FINISHED <<<<<<<<<<");
    }
}

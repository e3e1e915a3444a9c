// ABOUTME: Command implementations behind the CLI
// ABOUTME: Exports the convert command and the per-table transfer child command

pub mod convert;
pub mod transfer;

pub use convert::{build_factories, convert};
pub use transfer::transfer_table;

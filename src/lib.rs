// ABOUTME: Library module for seren-converter
// ABOUTME: Exports the conversion pipeline, its collaborators, and the CLI commands

pub mod commands;
pub mod config;
pub mod converter;
pub mod filters;
pub mod mysql;
pub mod postgres;
pub mod progress;
pub mod reader;
pub mod scheduler;
pub mod schema;
pub mod sqlite;
pub mod utils;
pub mod writer;

#[cfg(test)]
mod test_support;

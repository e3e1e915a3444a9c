// ABOUTME: Table selection and ordering for a conversion run
// ABOUTME: Applies exclude/only lists and orders tables by the only list

use crate::schema::Table;
use anyhow::{bail, Result};
use std::collections::{BTreeSet, HashMap};

/// Represents which tables participate in a conversion, and in what order
///
/// Filtering is permissive: a name in `only_tables` that the source does not
/// have is dropped silently rather than treated as an error. A name listed in
/// both lists is excluded.
#[derive(Debug, Clone, Default)]
pub struct TableSelection {
    exclude_tables: BTreeSet<String>,
    only_tables: Vec<String>,
}

impl TableSelection {
    /// Creates a selection from configuration lists
    pub fn new(exclude_tables: Vec<String>, only_tables: Vec<String>) -> Result<Self> {
        for name in exclude_tables.iter().chain(only_tables.iter()) {
            if name.trim().is_empty() {
                bail!("Table names in exclude_tables/only_tables cannot be empty");
            }
        }

        Ok(Self {
            exclude_tables: exclude_tables.into_iter().collect(),
            only_tables,
        })
    }

    /// Creates an empty selection (convert everything)
    pub fn all() -> Self {
        Self::default()
    }

    /// Checks if any filters are active
    pub fn is_empty(&self) -> bool {
        self.exclude_tables.is_empty() && self.only_tables.is_empty()
    }

    pub fn only_tables(&self) -> &[String] {
        &self.only_tables
    }

    /// Determines if a table participates in the run
    pub fn should_convert_table(&self, table_name: &str) -> bool {
        if self.exclude_tables.contains(table_name) {
            return false;
        }

        self.only_tables.is_empty() || self.only_tables.iter().any(|t| t == table_name)
    }

    /// Filters and orders the reader's tables
    ///
    /// Without an only list the reader's enumeration order is kept; with one,
    /// tables follow their first position in that list.
    pub fn select(&self, tables: Vec<Table>) -> Vec<Table> {
        let mut selected: Vec<Table> = tables
            .into_iter()
            .filter(|table| self.should_convert_table(&table.name))
            .collect();

        if self.only_tables.is_empty() {
            return selected;
        }

        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (position, name) in self.only_tables.iter().enumerate() {
            positions.entry(name.as_str()).or_insert(position);
        }
        selected.sort_by_key(|table| positions.get(table.name.as_str()).copied());

        for name in &self.only_tables {
            if !self.exclude_tables.contains(name) && !selected.iter().any(|t| &t.name == name) {
                tracing::debug!("Table '{}' in only_tables not found in source, skipping", name);
            }
        }

        selected
    }
}

// ABOUTME: MySQL schema introspection and row streaming behind the Reader trait
// ABOUTME: Reads information_schema for columns, keys, indexes, foreign keys and triggers

use super::types::{declared_type, is_temporal};
use crate::reader::{Reader, ReaderFactory};
use crate::schema::{
    Column, ForeignKey, Index, Row, Table, Trigger, TriggerEvent, TriggerTiming, Value,
};
use crate::utils::{generated_identifier, quote_literal};
use anyhow::{anyhow, Context, Result};
use mysql_async::prelude::*;
use mysql_async::Conn;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Runtime;

/// Reads schema and data from one MySQL database
///
/// Like the PostgreSQL writer, the reader owns a single-threaded runtime so
/// it can be driven from plain worker threads. Rows are handed to the sink
/// outside of `block_on`, so a sink may drive a runtime of its own.
pub struct MysqlReader {
    runtime: Runtime,
    conn: Mutex<Option<Conn>>,
    database: String,
}

impl MysqlReader {
    pub fn connect(connection_string: &str) -> Result<Self> {
        super::validate_mysql_url(connection_string)?;
        let database = super::extract_database_name(connection_string)
            .ok_or_else(|| anyhow!("MySQL connection string must name a database"))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime for MySQL reader")?;
        let conn = runtime.block_on(super::connect_mysql(connection_string))?;

        Ok(Self {
            runtime,
            conn: Mutex::new(Some(conn)),
            database,
        })
    }

    /// Factory opening a new connection on every call
    pub fn factory(connection_string: impl Into<String>) -> ReaderFactory {
        let connection_string = connection_string.into();
        Arc::new(move || {
            Ok(Box::new(MysqlReader::connect(&connection_string)?) as Box<dyn Reader>)
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Conn>>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("MySQL connection lock poisoned"))
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let mut guard = self.lock()?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| anyhow!("MySQL reader is closed"))?;

        let tables: Vec<String> = self
            .runtime
            .block_on(conn.exec(
                r#"
                SELECT TABLE_NAME
                FROM INFORMATION_SCHEMA.TABLES
                WHERE TABLE_SCHEMA = ?
                AND TABLE_TYPE = 'BASE TABLE'
                ORDER BY TABLE_NAME
                "#,
                (self.database.as_str(),),
            ))
            .with_context(|| format!("Failed to list tables from database '{}'", self.database))?;

        tracing::info!(
            "Found {} table(s) in MySQL database '{}'",
            tables.len(),
            self.database
        );
        Ok(tables)
    }

    fn load_table(&self, name: &str) -> Result<Table> {
        let mut guard = self.lock()?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| anyhow!("MySQL reader is closed"))?;
        let database = self.database.as_str();

        let table = self.runtime.block_on(async {
            let mut table = Table::new(name);
            table.columns = load_columns(conn, database, name).await?;
            table.primary_key = load_primary_key(conn, database, name).await?;
            table.indexes = load_indexes(conn, database, name).await?;
            table.foreign_keys = load_foreign_keys(conn, database, name).await?;
            table.triggers = load_triggers(conn, database, name).await?;
            Ok::<Table, anyhow::Error>(table)
        })?;

        tracing::debug!(
            "Loaded table '{}': {} columns, {} indexes, {} foreign keys, {} triggers",
            name,
            table.columns.len(),
            table.indexes.len(),
            table.foreign_keys.len(),
            table.triggers.len()
        );

        Ok(table)
    }
}

impl Reader for MysqlReader {
    fn tables(&self) -> Result<Vec<Table>> {
        self.list_tables()?
            .iter()
            .map(|name| {
                self.load_table(name)
                    .with_context(|| format!("Failed to read schema of table '{}'", name))
            })
            .collect()
    }

    fn read_rows(&self, table: &Table, sink: &mut dyn FnMut(Row) -> Result<()>) -> Result<u64> {
        let columns: Vec<String> = table.columns.iter().map(|c| quote_backtick(&c.name)).collect();
        let query = format!(
            "SELECT {} FROM {}.{}",
            columns.join(", "),
            quote_backtick(&self.database),
            quote_backtick(&table.name)
        );
        let temporal: Vec<bool> = table
            .columns
            .iter()
            .map(|c| is_temporal(&c.data_type))
            .collect();
        let binary: Vec<bool> = table
            .columns
            .iter()
            .map(|c| declared_type(&c.data_type) == "BLOB")
            .collect();

        let mut guard = self.lock()?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| anyhow!("MySQL reader is closed"))?;
        let mut result = self
            .runtime
            .block_on(conn.query_iter(query))
            .with_context(|| format!("Failed to query rows from table '{}'", table.name))?;

        let mut count = 0u64;
        while let Some(mut row) = self
            .runtime
            .block_on(result.next())
            .with_context(|| format!("Failed to read row from table '{}'", table.name))?
        {
            let values = (0..row.len())
                .map(|idx| {
                    convert_value(
                        row.take::<mysql_async::Value, _>(idx)
                            .unwrap_or(mysql_async::Value::NULL),
                        temporal.get(idx).copied().unwrap_or(false),
                        binary.get(idx).copied().unwrap_or(false),
                    )
                })
                .collect();
            sink(values)?;
            count += 1;
        }

        tracing::debug!("Read {} rows from table '{}'", count, table.name);

        Ok(count)
    }
}

impl Drop for MysqlReader {
    fn drop(&mut self) {
        let conn = match self.conn.get_mut() {
            Ok(conn) => conn.take(),
            Err(_) => None,
        };
        if let Some(conn) = conn {
            if let Err(e) = self.runtime.block_on(conn.disconnect()) {
                tracing::debug!("Failed to disconnect from MySQL cleanly: {}", e);
            }
        }
    }
}

/// Quotes a MySQL identifier with backticks
fn quote_backtick(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

// The text protocol delivers every non-NULL value as bytes; integers and
// decimals stay textual and are parsed by PostgreSQL during COPY.
fn convert_value(value: mysql_async::Value, temporal: bool, binary: bool) -> Value {
    use mysql_async::Value as MyValue;

    match value {
        MyValue::NULL => Value::Null,
        MyValue::Bytes(bytes) if binary => Value::Blob(bytes),
        MyValue::Bytes(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            // PostgreSQL has no zero date
            if temporal && text.starts_with("0000-00-00") {
                Value::Null
            } else {
                Value::Text(text)
            }
        }
        MyValue::Int(i) => Value::Integer(i),
        MyValue::UInt(u) => match i64::try_from(u) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Text(u.to_string()),
        },
        MyValue::Float(f) => Value::Real(f64::from(f)),
        MyValue::Double(d) => Value::Real(d),
        MyValue::Date(0, 0, 0, ..) => Value::Null,
        MyValue::Date(year, month, day, hour, minute, second, micro) => Value::Text(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            year, month, day, hour, minute, second, micro
        )),
        MyValue::Time(negative, days, hours, minutes, seconds, micro) => Value::Text(format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            if negative { "-" } else { "" },
            u32::from(hours) + days * 24,
            minutes,
            seconds,
            micro
        )),
    }
}

async fn load_columns(conn: &mut Conn, database: &str, table: &str) -> Result<Vec<Column>> {
    let rows: Vec<(String, String, String, Option<String>, String)> = conn
        .exec(
            r#"
            SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, EXTRA
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#,
            (database, table),
        )
        .await
        .with_context(|| format!("Failed to read columns of table '{}'", table))?;

    Ok(rows
        .into_iter()
        .map(|(name, column_type, nullable, default, extra)| {
            let default = default.and_then(|d| default_literal(&d, &column_type));
            Column {
                name,
                nullable: nullable.eq_ignore_ascii_case("YES"),
                default,
                auto_increment: extra.to_ascii_lowercase().contains("auto_increment"),
                data_type: column_type,
            }
        })
        .collect())
}

/// Rewrites an information_schema default into the expression form the
/// PostgreSQL default translation expects
///
/// MySQL reports literal defaults unquoted, so textual ones are quoted here.
/// Zero dates have no PostgreSQL equivalent and are dropped.
fn default_literal(default: &str, column_type: &str) -> Option<String> {
    let upper = default.trim().to_ascii_uppercase();
    if upper.starts_with("CURRENT_TIMESTAMP") || upper == "NOW()" {
        return Some("CURRENT_TIMESTAMP".to_string());
    }
    // MariaDB reports NULL defaults and quoted literals as written
    if upper == "NULL" {
        return None;
    }
    if default.len() >= 2 && default.starts_with('\'') && default.ends_with('\'') {
        return Some(default.to_string());
    }
    if is_temporal(column_type) && default.starts_with("0000-00-00") {
        return None;
    }
    // MySQL 8 reports expression defaults wrapped in parentheses
    if default.starts_with('(') {
        return Some(default.to_string());
    }

    match declared_type(column_type).as_str() {
        "BOOLEAN" | "SMALLINT" | "INT" | "BIGINT" | "FLOAT4" | "DOUBLE"
            if default.trim().parse::<f64>().is_ok() =>
        {
            Some(default.trim().to_string())
        }
        declared if declared.starts_with("NUMERIC") && default.trim().parse::<f64>().is_ok() => {
            Some(default.trim().to_string())
        }
        _ => Some(quote_literal(default)),
    }
}

async fn load_primary_key(conn: &mut Conn, database: &str, table: &str) -> Result<Vec<String>> {
    conn.exec(
        r#"
        SELECT COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
        ORDER BY ORDINAL_POSITION
        "#,
        (database, table),
    )
    .await
    .with_context(|| format!("Failed to read primary key of table '{}'", table))
}

// MySQL index names are only unique per table, so they are prefixed with the
// table name to stay unique in the PostgreSQL schema.
async fn load_indexes(conn: &mut Conn, database: &str, table: &str) -> Result<Vec<Index>> {
    let rows: Vec<(String, i64, Option<String>)> = conn
        .exec(
            r#"
            SELECT INDEX_NAME, NON_UNIQUE, COLUMN_NAME
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY'
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
            "#,
            (database, table),
        )
        .await
        .with_context(|| format!("Failed to read indexes of table '{}'", table))?;

    Ok(group_indexes(table, rows))
}

fn group_indexes(table: &str, rows: Vec<(String, i64, Option<String>)>) -> Vec<Index> {
    let mut indexes: Vec<(Index, bool)> = Vec::new();
    for (name, non_unique, column) in rows {
        let full_name = generated_identifier(&[table, &name]);
        let position = match indexes.iter().position(|(index, _)| index.name == full_name) {
            Some(position) => position,
            None => {
                indexes.push((
                    Index {
                        name: full_name,
                        columns: Vec::new(),
                        unique: non_unique == 0,
                    },
                    false,
                ));
                indexes.len() - 1
            }
        };
        let entry = &mut indexes[position];
        match column {
            Some(column) => entry.0.columns.push(column),
            // Functional key part
            None => entry.1 = true,
        }
    }

    indexes
        .into_iter()
        .filter_map(|(index, has_expression)| {
            if has_expression {
                tracing::warn!(
                    "Skipping expression index '{}' on table '{}'",
                    index.name,
                    table
                );
                None
            } else {
                Some(index)
            }
        })
        .collect()
}

async fn load_foreign_keys(conn: &mut Conn, database: &str, table: &str) -> Result<Vec<ForeignKey>> {
    let rows: Vec<(String, String, String, String, String, String)> = conn
        .exec(
            r#"
            SELECT k.CONSTRAINT_NAME, k.COLUMN_NAME, k.REFERENCED_TABLE_NAME,
                   k.REFERENCED_COLUMN_NAME, r.UPDATE_RULE, r.DELETE_RULE
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
            JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS r
              ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
             AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
             AND r.TABLE_NAME = k.TABLE_NAME
            WHERE k.TABLE_SCHEMA = ? AND k.TABLE_NAME = ?
              AND k.REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION
            "#,
            (database, table),
        )
        .await
        .with_context(|| format!("Failed to read foreign keys of table '{}'", table))?;

    let mut foreign_keys: Vec<ForeignKey> = Vec::new();
    for (name, column, referenced_table, referenced_column, on_update, on_delete) in rows {
        match foreign_keys.iter_mut().find(|fk| fk.name == name) {
            Some(fk) => {
                fk.columns.push(column);
                fk.referenced_columns.push(referenced_column);
            }
            None => foreign_keys.push(ForeignKey {
                name,
                columns: vec![column],
                referenced_table,
                referenced_columns: vec![referenced_column],
                on_update: referential_action(&on_update),
                on_delete: referential_action(&on_delete),
            }),
        }
    }

    Ok(foreign_keys)
}

fn referential_action(rule: &str) -> Option<String> {
    match rule.to_ascii_uppercase().as_str() {
        "" | "NO ACTION" => None,
        other => Some(other.to_string()),
    }
}

async fn load_triggers(conn: &mut Conn, database: &str, table: &str) -> Result<Vec<Trigger>> {
    let rows: Vec<(String, String, String, String)> = conn
        .exec(
            r#"
            SELECT TRIGGER_NAME, ACTION_TIMING, EVENT_MANIPULATION, ACTION_STATEMENT
            FROM INFORMATION_SCHEMA.TRIGGERS
            WHERE EVENT_OBJECT_SCHEMA = ? AND EVENT_OBJECT_TABLE = ?
            ORDER BY TRIGGER_NAME
            "#,
            (database, table),
        )
        .await
        .with_context(|| format!("Failed to read triggers of table '{}'", table))?;

    Ok(rows
        .into_iter()
        .filter_map(|(name, timing, event, statement)| {
            let trigger = build_trigger(&name, &timing, &event, &statement);
            if trigger.is_none() {
                tracing::warn!("Skipping unsupported trigger '{}' on '{}'", name, table);
            }
            trigger
        })
        .collect())
}

fn build_trigger(name: &str, timing: &str, event: &str, statement: &str) -> Option<Trigger> {
    let timing = match timing.to_ascii_uppercase().as_str() {
        "BEFORE" => TriggerTiming::Before,
        "AFTER" => TriggerTiming::After,
        _ => return None,
    };
    let event = match event.to_ascii_uppercase().as_str() {
        "INSERT" => TriggerEvent::Insert,
        "UPDATE" => TriggerEvent::Update,
        "DELETE" => TriggerEvent::Delete,
        _ => return None,
    };

    Some(Trigger {
        name: name.to_string(),
        timing,
        event,
        body: strip_begin_end(statement).to_string(),
    })
}

/// Removes a surrounding `BEGIN ... END` block from a trigger statement
fn strip_begin_end(statement: &str) -> &str {
    let trimmed = statement.trim();
    let upper = trimmed.to_ascii_uppercase();
    if upper.starts_with("BEGIN") && upper.ends_with("END") {
        trimmed[5..trimmed.len() - 3].trim()
    } else {
        trimmed
    }
}

// ABOUTME: PostgreSQL DDL generation for tables, sequences, indexes, constraints and triggers
// ABOUTME: Statements are returned without terminators so both writers can emit them

use super::types::{default_expression, PgType};
use crate::schema::{Column, Table, Trigger, TriggerEvent, TriggerTiming};
use crate::utils::{generated_identifier, quote_ident, quote_literal};

/// Name of the sequence backing an auto-increment column
pub fn sequence_name(table: &str, column: &str) -> String {
    generated_identifier(&[table, column, "seq"])
}

/// Name of the plpgsql function generated for a trigger
pub fn trigger_function_name(table: &str, trigger: &str) -> String {
    generated_identifier(&[table, trigger, "fn"])
}

// Sequences are only generated for columns that map to an integer type
fn auto_increment_columns(table: &Table) -> impl Iterator<Item = &Column> {
    table
        .columns
        .iter()
        .filter(|c| c.auto_increment && PgType::for_column(c).is_integer())
}

fn column_definition(table: &Table, column: &Column, utc_timestamps: bool) -> String {
    let pg_type = PgType::for_column(column).with_utc_timestamps(utc_timestamps);
    let mut definition = format!("{} {}", quote_ident(&column.name), pg_type);

    if column.auto_increment && pg_type.is_integer() {
        let sequence = sequence_name(&table.name, &column.name);
        definition.push_str(&format!(
            " DEFAULT nextval({}::regclass)",
            quote_literal(&quote_ident(&sequence))
        ));
    } else if let Some(default) = column
        .default
        .as_deref()
        .and_then(|d| default_expression(d, &pg_type))
    {
        definition.push_str(" DEFAULT ");
        definition.push_str(&default);
    }

    if !column.nullable {
        definition.push_str(" NOT NULL");
    }

    definition
}

/// Drops and recreates the table, plus sequences for auto-increment columns
pub fn create_table(table: &Table, utc_timestamps: bool) -> Vec<String> {
    let table_ident = quote_ident(&table.name);
    let mut statements = vec![format!("DROP TABLE IF EXISTS {} CASCADE", table_ident)];

    for column in auto_increment_columns(table) {
        let sequence = quote_ident(&sequence_name(&table.name, &column.name));
        statements.push(format!("DROP SEQUENCE IF EXISTS {} CASCADE", sequence));
        statements.push(format!("CREATE SEQUENCE {}", sequence));
    }

    let mut definitions: Vec<String> = table
        .columns
        .iter()
        .map(|column| column_definition(table, column, utc_timestamps))
        .collect();
    if !table.primary_key.is_empty() {
        let columns: Vec<String> = table.primary_key.iter().map(|c| quote_ident(c)).collect();
        definitions.push(format!("PRIMARY KEY ({})", columns.join(", ")));
    }

    statements.push(format!(
        "CREATE TABLE {} (\n    {}\n)",
        table_ident,
        definitions.join(",\n    ")
    ));

    for column in auto_increment_columns(table) {
        statements.push(format!(
            "ALTER SEQUENCE {} OWNED BY {}.{}",
            quote_ident(&sequence_name(&table.name, &column.name)),
            table_ident,
            quote_ident(&column.name)
        ));
    }

    statements
}

/// Empties the table
///
/// Sequences are left alone; [`advance_sequences`] moves them once the new
/// rows are loaded.
pub fn truncate(table: &Table) -> Vec<String> {
    vec![format!("TRUNCATE {} CASCADE", quote_ident(&table.name))]
}

/// Moves each auto-increment sequence past the highest loaded value
///
/// Runs after every data load, including data-only reruns. The sequence is
/// looked up through `pg_get_serial_sequence`, so a column without an owned
/// sequence turns the statement into a no-op.
pub fn advance_sequences(table: &Table) -> Vec<String> {
    let table_ident = quote_ident(&table.name);
    auto_increment_columns(table)
        .map(|column| {
            format!(
                "SELECT pg_catalog.setval(pg_catalog.pg_get_serial_sequence({}, {}), COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
                quote_literal(&table_ident),
                quote_literal(&column.name),
                quote_ident(&column.name),
                table_ident
            )
        })
        .collect()
}

/// Secondary indexes
pub fn indexes(table: &Table) -> Vec<String> {
    let table_ident = quote_ident(&table.name);
    table
        .indexes
        .iter()
        .map(|index| {
            let columns: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
            format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                quote_ident(&index.name),
                table_ident,
                columns.join(", ")
            )
        })
        .collect()
}

/// Foreign key constraints
pub fn constraints(table: &Table) -> Vec<String> {
    table
        .foreign_keys
        .iter()
        .map(|fk| {
            let columns: Vec<String> = fk.columns.iter().map(|c| quote_ident(c)).collect();
            let mut statement = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}",
                quote_ident(&table.name),
                quote_ident(&fk.name),
                columns.join(", "),
                quote_ident(&fk.referenced_table)
            );
            if !fk.referenced_columns.is_empty() {
                let referenced: Vec<String> = fk
                    .referenced_columns
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect();
                statement.push_str(&format!(" ({})", referenced.join(", ")));
            }
            if let Some(action) = &fk.on_delete {
                statement.push_str(&format!(" ON DELETE {}", action));
            }
            if let Some(action) = &fk.on_update {
                statement.push_str(&format!(" ON UPDATE {}", action));
            }
            statement
        })
        .collect()
}

/// Translates each trigger into a plpgsql function and a row-level trigger
pub fn triggers(table: &Table) -> Vec<String> {
    table
        .triggers
        .iter()
        .flat_map(|trigger| trigger_statements(table, trigger))
        .collect()
}

fn trigger_statements(table: &Table, trigger: &Trigger) -> Vec<String> {
    let table_ident = quote_ident(&table.name);
    let function = quote_ident(&trigger_function_name(&table.name, &trigger.name));

    // Row-level AFTER triggers ignore the result; BEFORE/INSTEAD OF must hand
    // back the row for the operation to proceed.
    let returned = match (trigger.timing, trigger.event) {
        (TriggerTiming::After, _) => "NULL",
        (_, TriggerEvent::Delete) => "OLD",
        _ => "NEW",
    };

    let mut body = trigger.body.trim().to_string();
    if !body.ends_with(';') {
        body.push(';');
    }

    vec![
        format!(
            "CREATE OR REPLACE FUNCTION {}() RETURNS trigger AS $trigger$\nBEGIN\n    {}\n    RETURN {};\nEND;\n$trigger$ LANGUAGE plpgsql",
            function, body, returned
        ),
        format!(
            "DROP TRIGGER IF EXISTS {} ON {}",
            quote_ident(&trigger.name),
            table_ident
        ),
        format!(
            "CREATE TRIGGER {} {} {} ON {} FOR EACH ROW EXECUTE PROCEDURE {}()",
            quote_ident(&trigger.name),
            trigger.timing.as_sql(),
            trigger.event.as_sql(),
            table_ident,
            function
        ),
    ]
}

// ABOUTME: Text-format COPY encoding for streaming rows into PostgreSQL
// ABOUTME: Shared by the SQL script writer and the live database writer

use super::types::PgType;
use crate::schema::{Table, Value};
use crate::utils::quote_ident;
use std::fmt::Write;

/// `COPY "table" ("a", "b") FROM stdin`, without a terminator
pub fn copy_statement(table: &Table) -> String {
    let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
    format!(
        "COPY {} ({}) FROM stdin",
        quote_ident(&table.name),
        columns.join(", ")
    )
}

/// Destination types of the table's columns, in column order
pub fn column_types(table: &Table) -> Vec<PgType> {
    table.columns.iter().map(PgType::for_column).collect()
}

/// Appends one tab-separated, newline-terminated row
pub fn encode_row(row: &[Value], types: &[PgType], out: &mut String) {
    for (idx, value) in row.iter().enumerate() {
        if idx > 0 {
            out.push('\t');
        }
        encode_value(value, types.get(idx).unwrap_or(&PgType::Text), out);
    }
    out.push('\n');
}

fn encode_value(value: &Value, pg_type: &PgType, out: &mut String) {
    match (value, pg_type) {
        (Value::Null, _) => out.push_str("\\N"),
        (Value::Integer(i), PgType::Boolean) => out.push(if *i != 0 { 't' } else { 'f' }),
        (Value::Real(f), PgType::Boolean) => out.push(if *f != 0.0 { 't' } else { 'f' }),
        (Value::Text(s), PgType::Boolean) => match boolean_text(s) {
            Some(b) => out.push(if b { 't' } else { 'f' }),
            None => escape_text(s, out),
        },
        (Value::Integer(i), _) => {
            let _ = write!(out, "{}", i);
        }
        (Value::Real(f), _) => encode_float(*f, out),
        (Value::Text(s), PgType::Bytea) => encode_bytea(s.as_bytes(), out),
        (Value::Text(s), _) => escape_text(s, out),
        (Value::Blob(bytes), PgType::Bytea) => encode_bytea(bytes, out),
        (Value::Blob(bytes), _) => escape_text(&String::from_utf8_lossy(bytes), out),
    }
}

fn boolean_text(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn encode_float(f: f64, out: &mut String) {
    if f.is_nan() {
        out.push_str("NaN");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "Infinity" } else { "-Infinity" });
    } else {
        let _ = write!(out, "{}", f);
    }
}

// `\x` introduces hex bytea input; the backslash itself must be escaped for COPY
fn encode_bytea(bytes: &[u8], out: &mut String) {
    out.push_str("\\\\x");
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
}

/// Escapes a text value for COPY text format
///
/// PostgreSQL text cannot hold NUL, so NUL characters are dropped.
pub fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\u{0b}' => out.push_str("\\v"),
            '\0' => {}
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn encode(row: Vec<Value>, types: &[PgType]) -> String {
        let mut out = String::new();
        encode_row(&row, types, &mut out);
        out
    }

    #[test]
    fn test_copy_statement_quotes_identifiers() {
        let mut table = Table::new("order items");
        for name in ["id", "select"] {
            table.columns.push(Column {
                name: name.to_string(),
                data_type: "TEXT".to_string(),
                nullable: true,
                default: None,
                auto_increment: false,
            });
        }

        assert_eq!(
            copy_statement(&table),
            "COPY \"order items\" (\"id\", \"select\") FROM stdin"
        );
    }

    #[test]
    fn test_null_and_scalars() {
        let line = encode(
            vec![
                Value::Integer(7),
                Value::Null,
                Value::Real(2.5),
                Value::Text("plain".to_string()),
            ],
            &[
                PgType::BigInt,
                PgType::Text,
                PgType::DoublePrecision,
                PgType::Text,
            ],
        );
        assert_eq!(line, "7\t\\N\t2.5\tplain\n");
    }

    #[test]
    fn test_text_escaping() {
        let line = encode(
            vec![Value::Text("a\tb\nc\\d\re\0f".to_string())],
            &[PgType::Text],
        );
        assert_eq!(line, "a\\tb\\nc\\\\d\\ref\n");
    }

    #[test]
    fn test_booleans() {
        let line = encode(
            vec![
                Value::Integer(1),
                Value::Integer(0),
                Value::Text("true".to_string()),
                Value::Text("N".to_string()),
            ],
            &vec![PgType::Boolean; 4],
        );
        assert_eq!(line, "t\tf\tt\tf\n");
    }

    #[test]
    fn test_bytea_hex() {
        let line = encode(
            vec![Value::Blob(vec![0x00, 0x01, 0xff]), Value::Text("AB".to_string())],
            &[PgType::Bytea, PgType::Bytea],
        );
        assert_eq!(line, "\\\\x0001ff\t\\\\x4142\n");
    }

    #[test]
    fn test_special_floats() {
        let line = encode(
            vec![
                Value::Real(f64::NAN),
                Value::Real(f64::INFINITY),
                Value::Real(f64::NEG_INFINITY),
            ],
            &vec![PgType::DoublePrecision; 3],
        );
        assert_eq!(line, "NaN\tInfinity\t-Infinity\n");
    }

    #[test]
    fn test_blob_into_text_column() {
        let line = encode(vec![Value::Blob(b"hi\tthere".to_vec())], &[PgType::Text]);
        assert_eq!(line, "hi\\tthere\n");
    }
}

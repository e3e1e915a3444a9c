// ABOUTME: Maps SQLite declared column types and defaults onto PostgreSQL
// ABOUTME: Follows SQLite's affinity rules, falling back to text for unknown types

use crate::schema::Column;
use crate::utils::quote_literal;
use std::fmt;

/// PostgreSQL column type chosen for a source column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgType {
    SmallInt,
    Integer,
    BigInt,
    Boolean,
    Real,
    DoublePrecision,
    Numeric(Option<(u32, Option<u32>)>),
    Varchar(Option<u32>),
    Char(Option<u32>),
    Text,
    Bytea,
    Date,
    Timestamp,
    TimestampTz,
    Time,
}

impl PgType {
    /// Maps a SQLite declared type such as `VARCHAR(255)` or `UNSIGNED BIG INT`
    pub fn from_sqlite(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        let (base, args) = split_type_args(&upper);

        match base.as_str() {
            "BOOL" | "BOOLEAN" => return PgType::Boolean,
            "TINYINT" | "SMALLINT" | "INT2" => return PgType::SmallInt,
            "INT" | "INT4" | "MEDIUMINT" => return PgType::Integer,
            "INTEGER" | "BIGINT" | "INT8" | "UNSIGNED BIG INT" => return PgType::BigInt,
            "REAL" | "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" => return PgType::DoublePrecision,
            "FLOAT4" => return PgType::Real,
            "NUMERIC" | "DECIMAL" => {
                return PgType::Numeric(args.first().map(|p| (*p, args.get(1).copied())))
            }
            "DATE" => return PgType::Date,
            "DATETIME" | "TIMESTAMP" => return PgType::Timestamp,
            "TIME" => return PgType::Time,
            "BLOB" => return PgType::Bytea,
            // Untyped columns may hold anything; text accepts every scalar
            "" => return PgType::Text,
            _ => {}
        }

        // Affinity rules, in SQLite's order of precedence
        if base.contains("INT") {
            PgType::BigInt
        } else if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") {
            let length = args.first().copied();
            if base.contains("VAR") || base.contains("VARYING") {
                PgType::Varchar(length)
            } else if base.contains("CHAR") && length.is_some() {
                PgType::Char(length)
            } else {
                PgType::Text
            }
        } else if base.contains("BLOB") {
            PgType::Bytea
        } else if base.contains("REAL") || base.contains("FLOA") || base.contains("DOUB") {
            PgType::DoublePrecision
        } else {
            tracing::debug!("Unknown SQLite type '{}', using text", declared);
            PgType::Text
        }
    }

    pub fn for_column(column: &Column) -> Self {
        Self::from_sqlite(&column.data_type)
    }

    /// Promotes naive timestamps to `timestamp with time zone`
    pub fn with_utc_timestamps(self, utc_timestamps: bool) -> Self {
        match self {
            PgType::Timestamp if utc_timestamps => PgType::TimestampTz,
            other => other,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, PgType::SmallInt | PgType::Integer | PgType::BigInt)
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::SmallInt => f.write_str("smallint"),
            PgType::Integer => f.write_str("integer"),
            PgType::BigInt => f.write_str("bigint"),
            PgType::Boolean => f.write_str("boolean"),
            PgType::Real => f.write_str("real"),
            PgType::DoublePrecision => f.write_str("double precision"),
            PgType::Numeric(None) => f.write_str("numeric"),
            PgType::Numeric(Some((precision, None))) => write!(f, "numeric({})", precision),
            PgType::Numeric(Some((precision, Some(scale)))) => {
                write!(f, "numeric({},{})", precision, scale)
            }
            PgType::Varchar(None) => f.write_str("varchar"),
            PgType::Varchar(Some(length)) => write!(f, "varchar({})", length),
            PgType::Char(None) => f.write_str("char"),
            PgType::Char(Some(length)) => write!(f, "char({})", length),
            PgType::Text => f.write_str("text"),
            PgType::Bytea => f.write_str("bytea"),
            PgType::Date => f.write_str("date"),
            PgType::Timestamp => f.write_str("timestamp without time zone"),
            PgType::TimestampTz => f.write_str("timestamp with time zone"),
            PgType::Time => f.write_str("time without time zone"),
        }
    }
}

/// Splits `NUMERIC(10, 2)` into `("NUMERIC", [10, 2])`
fn split_type_args(upper: &str) -> (String, Vec<u32>) {
    match upper.find('(') {
        Some(open) => {
            let base = upper[..open].trim();
            let inner = upper[open + 1..].trim_end().trim_end_matches(')');
            let args = inner
                .split(',')
                .filter_map(|arg| arg.trim().parse::<u32>().ok())
                .collect();
            (normalize_spaces(base), args)
        }
        None => (normalize_spaces(upper), Vec::new()),
    }
}

fn normalize_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Translates a SQLite column default into a PostgreSQL default expression
///
/// Returns `None` for `NULL` defaults and for expressions with no portable
/// equivalent; those columns are created without a default.
pub fn default_expression(default: &str, pg_type: &PgType) -> Option<String> {
    let trimmed = default.trim();
    let unquoted = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"));

    match trimmed.to_ascii_uppercase().as_str() {
        "NULL" => return None,
        "CURRENT_TIMESTAMP" | "(DATETIME('NOW'))" | "(DATETIME('NOW', 'LOCALTIME'))" => {
            return Some("CURRENT_TIMESTAMP".to_string())
        }
        "CURRENT_DATE" | "(DATE('NOW'))" => return Some("CURRENT_DATE".to_string()),
        "CURRENT_TIME" | "(TIME('NOW'))" => return Some("CURRENT_TIME".to_string()),
        _ => {}
    }

    if *pg_type == PgType::Boolean {
        let literal = unquoted.as_deref().unwrap_or(trimmed).to_ascii_lowercase();
        return match literal.as_str() {
            "1" | "t" | "true" | "y" | "yes" => Some("true".to_string()),
            "0" | "f" | "false" | "n" | "no" => Some("false".to_string()),
            _ => {
                tracing::warn!("Dropping unsupported boolean default {}", default);
                None
            }
        };
    }

    if let Some(text) = unquoted {
        return Some(quote_literal(&text));
    }

    if trimmed.parse::<f64>().is_ok() {
        return Some(trimmed.to_string());
    }

    tracing::warn!("Dropping unsupported column default {}", default);
    None
}

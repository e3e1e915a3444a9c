// ABOUTME: Normalizes MySQL column types into portable declared type names
// ABOUTME: The PostgreSQL type mapper then treats them like any other declared type

/// Translates a MySQL `COLUMN_TYPE` such as `int(10) unsigned` or
/// `enum('a','b')` into the declared type the PostgreSQL mapper understands
pub fn declared_type(column_type: &str) -> String {
    let lower = column_type.trim().to_ascii_lowercase();
    let unsigned = lower.contains("unsigned");
    let (base, args) = match lower.find('(') {
        Some(open) => {
            let close = lower[open..].find(')').map(|i| open + i).unwrap_or(lower.len());
            (lower[..open].trim(), lower[open + 1..close].trim())
        }
        None => (
            lower.split_whitespace().next().unwrap_or_default(),
            "",
        ),
    };

    match base {
        "tinyint" if args == "1" => "BOOLEAN".to_string(),
        "bool" | "boolean" => "BOOLEAN".to_string(),
        "tinyint" => "SMALLINT".to_string(),
        "smallint" if unsigned => "INT".to_string(),
        "smallint" | "year" => "SMALLINT".to_string(),
        "mediumint" => "INT".to_string(),
        "int" | "integer" if unsigned => "BIGINT".to_string(),
        "int" | "integer" => "INT".to_string(),
        "bigint" if unsigned => "NUMERIC(20)".to_string(),
        "bigint" => "BIGINT".to_string(),
        "float" => "FLOAT4".to_string(),
        "double" | "real" => "DOUBLE".to_string(),
        "decimal" | "numeric" | "dec" | "fixed" if args.is_empty() => "NUMERIC".to_string(),
        "decimal" | "numeric" | "dec" | "fixed" => format!("NUMERIC({})", args.replace(' ', "")),
        "char" if !args.is_empty() => format!("CHAR({})", args),
        "varchar" if !args.is_empty() => format!("VARCHAR({})", args),
        "date" => "DATE".to_string(),
        "datetime" | "timestamp" => "DATETIME".to_string(),
        "time" => "TIME".to_string(),
        "binary" | "varbinary" | "bit" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            "BLOB".to_string()
        }
        // text family, enum, set, json and anything unrecognized
        _ => "TEXT".to_string(),
    }
}

/// Whether values of this MySQL type carry dates that may be zero
pub fn is_temporal(column_type: &str) -> bool {
    let lower = column_type.trim().to_ascii_lowercase();
    lower.starts_with("date") || lower.starts_with("timestamp")
}

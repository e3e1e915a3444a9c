// ABOUTME: SQLite schema introspection and row streaming behind the Reader trait
// ABOUTME: Discovers columns, keys, indexes, foreign keys and triggers via PRAGMAs

use crate::reader::{Reader, ReaderFactory};
use crate::schema::{
    Column, ForeignKey, Index, Row, Table, Trigger, TriggerEvent, TriggerTiming, Value,
};
use crate::utils::{generated_identifier, quote_ident};
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::sync::Arc;

/// Reads schema and data from a SQLite database
pub struct SqliteReader {
    conn: Connection,
}

impl SqliteReader {
    /// Opens the database read-only after validating its path
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self {
            conn: super::open_sqlite(path)?,
        })
    }

    /// Factory opening a fresh, independent connection on every call
    pub fn factory(path: impl Into<String>) -> ReaderFactory {
        let path = path.into();
        Arc::new(move || Ok(Box::new(SqliteReader::open(&path)?) as Box<dyn Reader>))
    }

    fn load_table(&self, name: &str) -> Result<Table> {
        let mut table = Table::new(name);

        load_columns(&self.conn, &mut table)?;
        table.indexes = load_indexes(&self.conn, &table)?;
        table.foreign_keys = load_foreign_keys(&self.conn, name)?;
        table.triggers = load_triggers(&self.conn, name)?;

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

impl Reader for SqliteReader {
    fn tables(&self) -> Result<Vec<Table>> {
        list_tables(&self.conn)?
            .iter()
            .map(|name| {
                self.load_table(name)
                    .with_context(|| format!("Failed to read schema of table '{}'", name))
            })
            .collect()
    }

    fn read_rows(&self, table: &Table, sink: &mut dyn FnMut(Row) -> Result<()>) -> Result<u64> {
        let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let query = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            quote_ident(&table.name)
        );

        let mut stmt = self
            .conn
            .prepare(&query)
            .with_context(|| format!("Failed to prepare statement for table '{}'", table.name))?;
        let mut rows = stmt
            .query([])
            .with_context(|| format!("Failed to query rows from table '{}'", table.name))?;

        let mut count = 0u64;
        while let Some(row) = rows
            .next()
            .with_context(|| format!("Failed to read row from table '{}'", table.name))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(convert_value(row.get_ref(idx)?));
            }
            sink(values)?;
            count += 1;
        }

        tracing::debug!("Read {} rows from table '{}'", count, table.name);

        Ok(count)
    }
}

fn convert_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// List all user tables in a SQLite database, sorted by name
///
/// Excludes sqlite_* system tables (sqlite_sequence, sqlite_stat1, etc.)
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .context("Failed to prepare statement to list tables")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query table list")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect table names")?;

    tracing::info!("Found {} user tables in SQLite database", tables.len());

    Ok(tables)
}

fn load_columns(conn: &Connection, table: &mut Table) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", quote_ident(&table.name)))
        .context("Failed to prepare table_info query")?;

    // (column, position in primary key)
    let mut pk_positions: Vec<(String, i64)> = Vec::new();

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            row.get::<_, i64>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?;

    for row in rows {
        let (name, data_type, not_null, default, pk) = row?;
        if pk > 0 {
            pk_positions.push((name.clone(), pk));
        }
        table.columns.push(Column {
            name,
            data_type,
            nullable: not_null == 0 && pk == 0,
            default,
            auto_increment: false,
        });
    }

    pk_positions.sort_by_key(|(_, position)| *position);
    table.primary_key = pk_positions.into_iter().map(|(name, _)| name).collect();

    // A lone INTEGER PRIMARY KEY aliases the rowid and is assigned automatically
    if let [pk_column] = table.primary_key.as_slice() {
        let pk_column = pk_column.clone();
        if let Some(column) = table.columns.iter_mut().find(|c| c.name == pk_column) {
            column.auto_increment = column.data_type.eq_ignore_ascii_case("INTEGER");
        }
    }

    Ok(())
}

fn load_indexes(conn: &Connection, table: &Table) -> Result<Vec<Index>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA index_list({})", quote_ident(&table.name)))
        .context("Failed to prepare index_list query")?;

    let listed = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? != 0,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut indexes = Vec::new();
    for (name, unique, origin) in listed {
        // The primary key is created with the table itself
        if origin == "pk" {
            continue;
        }

        let columns = index_columns(conn, &name)?;
        if columns.is_empty() {
            tracing::debug!("Skipping expression index '{}' on '{}'", name, table.name);
            continue;
        }

        let name = if name.starts_with("sqlite_autoindex_") {
            let joined = columns.join("_");
            generated_identifier(&[&table.name, &joined, "key"])
        } else {
            name
        };

        indexes.push(Index {
            name,
            columns,
            unique,
        });
    }

    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(indexes)
}

fn index_columns(conn: &Connection, index: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA index_info({})", quote_ident(index)))
        .context("Failed to prepare index_info query")?;

    let mut columns = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    columns.sort_by_key(|(seqno, _)| *seqno);

    // Expression columns have no name; such indexes cannot be reproduced
    if columns.iter().any(|(_, name)| name.is_none()) {
        return Ok(Vec::new());
    }

    Ok(columns.into_iter().filter_map(|(_, name)| name).collect())
}

fn load_foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))
        .context("Failed to prepare foreign_key_list query")?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grouped: Vec<(i64, ForeignKey)> = Vec::new();
    let mut sorted = rows;
    sorted.sort_by_key(|(id, seq, ..)| (*id, *seq));

    for (id, _seq, referenced_table, from, to, on_update, on_delete) in sorted {
        let position = match grouped.iter().position(|(group_id, _)| *group_id == id) {
            Some(position) => position,
            None => {
                grouped.push((
                    id,
                    ForeignKey {
                        name: String::new(),
                        columns: Vec::new(),
                        referenced_table,
                        referenced_columns: Vec::new(),
                        on_update: referential_action(&on_update),
                        on_delete: referential_action(&on_delete),
                    },
                ));
                grouped.len() - 1
            }
        };

        let fk = &mut grouped[position].1;
        fk.columns.push(from);
        // A missing target column means the referenced table's primary key
        if let Some(to) = to {
            fk.referenced_columns.push(to);
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(_, mut fk)| {
            let joined = fk.columns.join("_");
            fk.name = generated_identifier(&[table, &joined, "fkey"]);
            fk
        })
        .collect())
}

fn referential_action(action: &str) -> Option<String> {
    match action.to_ascii_uppercase().as_str() {
        "" | "NO ACTION" => None,
        other => Some(other.to_string()),
    }
}

fn load_triggers(conn: &Connection, table: &str) -> Result<Vec<Trigger>> {
    let mut stmt = conn
        .prepare(
            "SELECT name, sql FROM sqlite_master \
             WHERE type='trigger' AND tbl_name = ?1 \
             ORDER BY name",
        )
        .context("Failed to prepare trigger query")?;

    let rows = stmt
        .query_map([table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut triggers = Vec::new();
    for (name, sql) in rows {
        match sql.as_deref().and_then(|sql| parse_trigger(&name, sql)) {
            Some(trigger) => triggers.push(trigger),
            None => tracing::warn!(
                "Could not parse trigger '{}' on table '{}', skipping",
                name,
                table
            ),
        }
    }

    Ok(triggers)
}

/// Extracts timing, event and body from a `CREATE TRIGGER` statement
///
/// Triggers with a `WHEN` clause are not supported and yield `None`.
pub(crate) fn parse_trigger(name: &str, sql: &str) -> Option<Trigger> {
    let upper = sql.to_ascii_uppercase();
    let begin = find_keyword(&upper, "BEGIN")?;
    let end = rfind_keyword(&upper, "END")?;
    if end <= begin {
        return None;
    }

    let header: Vec<&str> = upper[..begin].split_whitespace().collect();
    if header.contains(&"WHEN") {
        return None;
    }

    let on = header.iter().position(|token| *token == "ON")?;
    let header = &header[..on];

    let timing = if header.contains(&"INSTEAD") {
        TriggerTiming::InsteadOf
    } else if header.contains(&"AFTER") {
        TriggerTiming::After
    } else {
        TriggerTiming::Before
    };

    let event = header.iter().find_map(|token| match *token {
        "INSERT" => Some(TriggerEvent::Insert),
        "UPDATE" => Some(TriggerEvent::Update),
        "DELETE" => Some(TriggerEvent::Delete),
        _ => None,
    })?;

    let body = sql[begin + "BEGIN".len()..end].trim().to_string();

    Some(Trigger {
        name: name.to_string(),
        timing,
        event,
        body,
    })
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'"' || byte == b'`'
}

fn is_keyword_at(haystack: &str, position: usize, keyword: &str) -> bool {
    let bytes = haystack.as_bytes();
    let after = position + keyword.len();
    let boundary_before = position == 0 || !is_word_byte(bytes[position - 1]);
    let boundary_after = after >= bytes.len() || !is_word_byte(bytes[after]);
    boundary_before && boundary_after
}

fn find_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    haystack
        .match_indices(keyword)
        .map(|(position, _)| position)
        .find(|position| is_keyword_at(haystack, *position, keyword))
}

fn rfind_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    haystack
        .rmatch_indices(keyword)
        .map(|(position, _)| position)
        .find(|position| is_keyword_at(haystack, *position, keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> (tempfile::TempDir, std::path::PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email VARCHAR(255) UNIQUE,
                age INTEGER,
                active BOOLEAN DEFAULT 1
            );
            CREATE TABLE posts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                body BLOB
            );
            CREATE TABLE tags (
                post_id INTEGER,
                tag TEXT,
                PRIMARY KEY (post_id, tag)
            );
            CREATE INDEX idx_posts_title ON posts (title);
            CREATE TABLE audit (user_id INTEGER, action TEXT);
            CREATE TRIGGER users_audit AFTER INSERT ON users
            BEGIN
                INSERT INTO audit (user_id, action) VALUES (NEW.id, 'insert');
            END;
            INSERT INTO users (id, name, email, age) VALUES (1, 'Alice', 'alice@example.com', 30);
            INSERT INTO users (id, name, email) VALUES (2, 'Bob', NULL);
            INSERT INTO posts (id, user_id, title, body) VALUES (1, 1, 'First Post', x'0001ff');",
        )
        .unwrap();

        (temp_dir, db_path)
    }

    fn open_reader(db_path: &std::path::Path) -> SqliteReader {
        SqliteReader::open(db_path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_tables_sorted_and_system_tables_excluded() {
        let (_temp_dir, db_path) = create_test_db();
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute(
                "CREATE TABLE counters (id INTEGER PRIMARY KEY AUTOINCREMENT)",
                [],
            )
            .unwrap();
        }

        let tables = open_reader(&db_path).tables().unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names, vec!["audit", "counters", "posts", "tags", "users"]);
    }

    #[test]
    fn test_columns_and_primary_key() {
        let (_temp_dir, db_path) = create_test_db();
        let users = open_reader(&db_path).table("users").unwrap().unwrap();

        assert_eq!(
            users.column_names(),
            vec!["id", "name", "email", "age", "active"]
        );
        assert_eq!(users.primary_key, vec!["id"]);

        let id = users.column("id").unwrap();
        assert!(id.auto_increment);
        assert!(!id.nullable);

        let name = users.column("name").unwrap();
        assert!(!name.nullable);
        assert_eq!(name.data_type, "TEXT");

        let active = users.column("active").unwrap();
        assert_eq!(active.default.as_deref(), Some("1"));
        assert!(active.nullable);
    }

    #[test]
    fn test_composite_primary_key_is_not_auto_increment() {
        let (_temp_dir, db_path) = create_test_db();
        let tags = open_reader(&db_path).table("tags").unwrap().unwrap();

        assert_eq!(tags.primary_key, vec!["post_id", "tag"]);
        assert!(tags.columns.iter().all(|c| !c.auto_increment));
        assert!(tags.indexes.is_empty());
    }

    #[test]
    fn test_indexes_include_unique_constraints() {
        let (_temp_dir, db_path) = create_test_db();
        let reader = open_reader(&db_path);

        let users = reader.table("users").unwrap().unwrap();
        assert_eq!(users.indexes.len(), 1);
        assert_eq!(users.indexes[0].name, "users_email_key");
        assert_eq!(users.indexes[0].columns, vec!["email"]);
        assert!(users.indexes[0].unique);

        let posts = reader.table("posts").unwrap().unwrap();
        assert_eq!(posts.indexes.len(), 1);
        assert_eq!(posts.indexes[0].name, "idx_posts_title");
        assert!(!posts.indexes[0].unique);
    }

    #[test]
    fn test_foreign_keys() {
        let (_temp_dir, db_path) = create_test_db();
        let posts = open_reader(&db_path).table("posts").unwrap().unwrap();

        assert_eq!(posts.foreign_keys.len(), 1);
        let fk = &posts.foreign_keys[0];
        assert_eq!(fk.name, "posts_user_id_fkey");
        assert_eq!(fk.columns, vec!["user_id"]);
        assert_eq!(fk.referenced_table, "users");
        assert_eq!(fk.referenced_columns, vec!["id"]);
        assert_eq!(fk.on_delete.as_deref(), Some("CASCADE"));
        assert_eq!(fk.on_update, None);
    }

    #[test]
    fn test_triggers() {
        let (_temp_dir, db_path) = create_test_db();
        let users = open_reader(&db_path).table("users").unwrap().unwrap();

        assert_eq!(users.triggers.len(), 1);
        let trigger = &users.triggers[0];
        assert_eq!(trigger.name, "users_audit");
        assert_eq!(trigger.timing, TriggerTiming::After);
        assert_eq!(trigger.event, TriggerEvent::Insert);
        assert_eq!(
            trigger.body,
            "INSERT INTO audit (user_id, action) VALUES (NEW.id, 'insert');"
        );
    }

    #[test]
    fn test_read_rows_converts_values() {
        let (_temp_dir, db_path) = create_test_db();
        let reader = open_reader(&db_path);
        let users = reader.table("users").unwrap().unwrap();

        let mut rows = Vec::new();
        let count = reader
            .read_rows(&users, &mut |row| {
                rows.push(row);
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            rows[0],
            vec![
                Value::Integer(1),
                Value::Text("Alice".to_string()),
                Value::Text("alice@example.com".to_string()),
                Value::Integer(30),
                Value::Integer(1),
            ]
        );
        assert_eq!(rows[1][2], Value::Null);
        assert_eq!(rows[1][3], Value::Null);
    }

    #[test]
    fn test_read_rows_blob() {
        let (_temp_dir, db_path) = create_test_db();
        let reader = open_reader(&db_path);
        let posts = reader.table("posts").unwrap().unwrap();

        let mut rows = Vec::new();
        reader
            .read_rows(&posts, &mut |row| {
                rows.push(row);
                Ok(())
            })
            .unwrap();

        assert_eq!(rows[0][3], Value::Blob(vec![0x00, 0x01, 0xff]));
    }

    #[test]
    fn test_read_rows_stops_on_sink_error() {
        let (_temp_dir, db_path) = create_test_db();
        let reader = open_reader(&db_path);
        let users = reader.table("users").unwrap().unwrap();

        let result = reader.read_rows(&users, &mut |_row| anyhow::bail!("sink full"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sink full"));
    }

    #[test]
    fn test_quoted_table_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("quoted.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE \"order items\" (\"select\" TEXT);
                 INSERT INTO \"order items\" VALUES ('x');",
            )
            .unwrap();
        }

        let reader = open_reader(&db_path);
        let table = reader.table("order items").unwrap().unwrap();
        assert_eq!(table.column_names(), vec!["select"]);

        let count = reader.read_rows(&table, &mut |_row| Ok(())).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_factory_opens_independent_readers() {
        let (_temp_dir, db_path) = create_test_db();
        let factory = SqliteReader::factory(db_path.to_str().unwrap());

        let first = factory().unwrap();
        let second = factory().unwrap();
        assert_eq!(first.tables().unwrap().len(), second.tables().unwrap().len());
    }

    #[test]
    fn test_factory_fails_for_missing_file() {
        let factory = SqliteReader::factory("/nonexistent/source.db");
        assert!(factory().is_err());
    }

    #[test]
    fn test_parse_trigger_variants() {
        let trigger = parse_trigger(
            "t",
            "CREATE TRIGGER IF NOT EXISTS t BEFORE UPDATE OF name ON users BEGIN SELECT 1; END",
        )
        .unwrap();
        assert_eq!(trigger.timing, TriggerTiming::Before);
        assert_eq!(trigger.event, TriggerEvent::Update);
        assert_eq!(trigger.body, "SELECT 1;");

        let trigger = parse_trigger(
            "v",
            "create trigger v instead of delete on user_view for each row begin delete from users where id = old.id; end",
        )
        .unwrap();
        assert_eq!(trigger.timing, TriggerTiming::InsteadOf);
        assert_eq!(trigger.event, TriggerEvent::Delete);

        // Default timing
        let trigger =
            parse_trigger("d", "CREATE TRIGGER d DELETE ON users BEGIN SELECT 1; END").unwrap();
        assert_eq!(trigger.timing, TriggerTiming::Before);
    }

    #[test]
    fn test_parse_trigger_ignores_keywords_inside_names() {
        let trigger = parse_trigger(
            "insert_begin_log",
            "CREATE TRIGGER insert_begin_log AFTER UPDATE ON begin_end BEGIN UPDATE begin_end SET x = 1; END",
        )
        .unwrap();
        assert_eq!(trigger.event, TriggerEvent::Update);
        assert_eq!(trigger.body, "UPDATE begin_end SET x = 1;");
    }

    #[test]
    fn test_parse_trigger_rejects_when_clause() {
        assert!(parse_trigger(
            "w",
            "CREATE TRIGGER w AFTER INSERT ON users WHEN NEW.id > 1 BEGIN SELECT 1; END"
        )
        .is_none());
    }
}

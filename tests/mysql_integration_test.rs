// ABOUTME: Integration tests converting a live MySQL database into PostgreSQL scripts
// ABOUTME: Requires TEST_MYSQL_URL; run with `cargo test -- --ignored`

use seren_converter::commands;
use std::env;
use std::fs;
use std::path::Path;

/// Helper to get test MySQL source URL from environment
fn get_test_mysql_url() -> String {
    env::var("TEST_MYSQL_URL").expect("TEST_MYSQL_URL must be set for MySQL integration tests")
}

async fn create_test_mysql_tables(mysql_url: &str) -> anyhow::Result<()> {
    use mysql_async::prelude::*;

    let mut conn = seren_converter::mysql::connect_mysql(mysql_url).await?;

    // Zero dates are only accepted with a permissive sql_mode
    conn.query_drop("SET SESSION sql_mode = ''").await?;

    for query in [
        "DROP TABLE IF EXISTS my_posts",
        "DROP TABLE IF EXISTS my_users",
        "CREATE TABLE my_users (
            id INT PRIMARY KEY AUTO_INCREMENT,
            name VARCHAR(255) NOT NULL,
            balance DECIMAL(10, 2),
            verified TINYINT(1) DEFAULT 0,
            avatar BLOB,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            KEY name_idx (name)
        ) ENGINE=InnoDB",
        "CREATE TABLE my_posts (
            id INT PRIMARY KEY AUTO_INCREMENT,
            user_id INT NOT NULL,
            title VARCHAR(255) NOT NULL,
            CONSTRAINT my_posts_user_fk FOREIGN KEY (user_id) REFERENCES my_users (id)
        ) ENGINE=InnoDB",
        "INSERT INTO my_users (name, balance, verified, avatar, created_at) VALUES
            ('Alice', 10.50, 1, X'48656c6c6f', '2024-01-02 03:04:05'),
            ('Bob', NULL, 0, NULL, '0000-00-00 00:00:00')",
        "INSERT INTO my_posts (user_id, title) VALUES (1, 'Hello'), (2, 'tab\there')",
    ] {
        conn.query_drop(query).await?;
    }

    conn.disconnect().await?;
    Ok(())
}

fn write_config(dir: &Path, mysql_url: &str, extra: &str) -> std::path::PathBuf {
    let config_path = dir.join("seren-converter.toml");
    fs::write(
        &config_path,
        format!(
            r#"
only_tables = ["my_users", "my_posts"]
{}

[source]
mysql = "{}"

[destination]
file = "{}"
"#,
            extra,
            mysql_url,
            dir.join("out.sql").display()
        ),
    )
    .unwrap();
    config_path
}

#[test]
#[ignore]
fn test_mysql_to_script_conversion() {
    let mysql_url = get_test_mysql_url();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime
        .block_on(create_test_mysql_tables(&mysql_url))
        .unwrap();
    drop(runtime);

    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &mysql_url, "");

    let report = commands::convert(&config_path, false).unwrap();
    assert_eq!(report.tables, vec!["my_users", "my_posts"]);
    assert!(report.failed_transfers.is_empty());

    let script = fs::read_to_string(dir.path().join("out.sql")).unwrap();
    assert!(script.contains("CREATE TABLE \"my_users\""));
    assert!(script.contains("\"balance\" numeric(10,2)"));
    assert!(script.contains("\"verified\" boolean"));
    assert!(script.contains("\"avatar\" bytea"));
    assert!(script.contains("\"created_at\" timestamp without time zone DEFAULT CURRENT_TIMESTAMP"));
    assert!(script.contains("nextval('\"my_users_id_seq\"'"));
    assert!(script.contains("COPY \"my_users\""));
    assert!(script.contains("COPY \"my_posts\""));
    assert!(script.contains("\\\\x48656c6c6f"));
    assert!(script.contains("tab\\there"));
    assert!(script.contains("CREATE INDEX \"my_users_name_idx\""));
    assert!(script.contains("FOREIGN KEY (\"user_id\") REFERENCES \"my_users\""));
    assert!(script.contains("pg_get_serial_sequence('\"my_users\"', 'id')"));

    // Bob's zero date is loaded as NULL
    let bob = script
        .lines()
        .find(|line| line.contains("\tBob\t"))
        .expect("Bob's row should be in the COPY block");
    assert!(bob.ends_with("\\N"), "unexpected row: {}", bob);
}

#[test]
#[ignore]
fn test_mysql_timezone_option() {
    let mysql_url = get_test_mysql_url();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime
        .block_on(create_test_mysql_tables(&mysql_url))
        .unwrap();
    drop(runtime);

    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), &mysql_url, "timezone = true");

    commands::convert(&config_path, false).unwrap();

    let script = fs::read_to_string(dir.path().join("out.sql")).unwrap();
    assert!(script.contains("SET TIME ZONE 'UTC';"));
    assert!(script.contains("\"created_at\" timestamp with time zone"));
}

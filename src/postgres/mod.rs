// ABOUTME: PostgreSQL destination support for conversion output
// ABOUTME: Type mapping, DDL and COPY encoding shared by the script and database writers

pub mod connection;
pub mod copy;
pub mod db_writer;
pub mod ddl;
pub mod file_writer;
pub mod types;

pub use connection::connect;
pub use db_writer::PostgresDbWriter;
pub use file_writer::PostgresFileWriter;

/// Output settings shared by the script and database writers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Create DATETIME/TIMESTAMP columns as `timestamp with time zone` and run
    /// the session in UTC, so naive source values are stored as UTC instants
    pub utc_timestamps: bool,
}

impl WriterOptions {
    /// Statements run at the start of every destination session
    pub fn session_statements(&self) -> Vec<String> {
        if self.utc_timestamps {
            vec!["SET TIME ZONE 'UTC'".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_statements() {
        assert!(WriterOptions::default().session_statements().is_empty());
        assert_eq!(
            WriterOptions {
                utc_timestamps: true
            }
            .session_statements(),
            vec!["SET TIME ZONE 'UTC'"]
        );
    }
}

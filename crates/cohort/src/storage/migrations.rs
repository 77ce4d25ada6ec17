//! Schema versioning for the cohort database.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Create missing tables, then migrate up to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if schema creation or migration fails, or if the database
/// was written by a newer version.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }
    for next in (version + 1)..=CURRENT_VERSION {
        migrate(conn, next)?;
        set_schema_version(conn, next)?;
        info!("Migrated database schema to version {next}");
    }
    Ok(())
}

/// Schema version recorded in the database, 0 for a fresh database.
///
/// # Errors
///
/// Returns an error if the stored value is not a number.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

fn migrate(conn: &Connection, version: i32) -> Result<()> {
    match version {
        // Base tables come from SCHEMA_STATEMENTS.
        1 => Ok(()),
        // Emails were stored as typed before v2; lookups are case-insensitive now.
        2 => lowercase_emails(conn),
        _ => Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        }),
    }
}

/// Lowercase the email index column and the `email` field of each document.
fn lowercase_emails(conn: &Connection) -> Result<()> {
    let duplicate: Option<String> = conn
        .query_row(
            "SELECT lower(email) FROM participants GROUP BY lower(email) HAVING COUNT(*) > 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(email) = duplicate {
        return Err(Error::DatabaseMigration {
            message: format!(
                "several participants use the email '{email}' with different case; \
                 merge or rename them before upgrading"
            ),
        });
    }

    conn.execute(
        r"
        UPDATE participants
        SET email = lower(email), document = json_set(document, '$.email', lower(email))
        WHERE email <> lower(email)
        ",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        Connection::open_in_memory().expect("failed to create in-memory database")
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_initialize_schema_creates_tables() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();

        assert!(table_exists(&conn, "participants"));
        assert!(table_exists(&conn, "diagnostic_domains"));
        assert!(table_exists(&conn, "metadata"));
    }

    #[test]
    fn test_initialize_schema_sets_version() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_initialize_schema_idempotent() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    fn create_v1_db() -> Connection {
        let conn = create_test_db();
        for statement in SCHEMA_STATEMENTS {
            conn.execute(statement, []).unwrap();
        }
        set_schema_version(&conn, 1).unwrap();
        conn
    }

    fn insert_v1(conn: &Connection, id: &str, email: &str) {
        let document = serde_json::json!({ "id": id, "email": email }).to_string();
        conn.execute(
            "INSERT INTO participants VALUES (?1, ?2, 'Ada', 'Lovelace', 'active', ?3, '', '')",
            (id, email, document),
        )
        .unwrap();
    }

    #[test]
    fn test_v2_lowercases_emails() {
        let conn = create_v1_db();
        insert_v1(&conn, "p1", "Ada@Example.ORG");

        initialize_schema(&conn).unwrap();
        let (email, document): (String, String) = conn
            .query_row(
                "SELECT email, document FROM participants WHERE id = 'p1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(email, "ada@example.org");
        let document: serde_json::Value = serde_json::from_str(&document).unwrap();
        assert_eq!(document["email"], "ada@example.org");
    }

    #[test]
    fn test_v2_reports_case_duplicates() {
        let conn = create_v1_db();
        insert_v1(&conn, "p1", "Ada@Example.ORG");
        insert_v1(&conn, "p2", "ada@example.org");

        let err = initialize_schema(&conn).unwrap_err();
        assert!(matches!(err, Error::DatabaseMigration { .. }));
        assert!(err.to_string().contains("ada@example.org"));
        assert_eq!(schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        set_schema_version(&conn, CURRENT_VERSION + 1).unwrap();

        let err = initialize_schema(&conn).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_unknown_migration_version() {
        let conn = create_test_db();
        let err = migrate(&conn, 999).unwrap_err();
        assert!(err.to_string().contains("unknown migration version"));
    }

    #[test]
    fn test_invalid_version_value() {
        let conn = create_test_db();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "UPDATE metadata SET value = 'abc' WHERE key = 'schema_version'",
            [],
        )
        .unwrap();
        assert!(schema_version(&conn).is_err());
    }
}

//! `SQLite` schema definitions for cohort.
//!
//! Participants are stored as whole JSON documents; the scalar columns next to
//! `document` duplicate the fields used for lookup, ordering and uniqueness.

/// SQL statement to create the participants table.
pub const CREATE_PARTICIPANTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS participants (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    status TEXT NOT NULL,
    document TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Index used by the default listing order.
pub const CREATE_NAME_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_participants_name
ON participants(last_name COLLATE NOCASE, first_name COLLATE NOCASE)
";

/// Index used when filtering by status.
pub const CREATE_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_participants_status ON participants(status)
";

/// SQL statement to create the diagnostic domains table.
pub const CREATE_DOMAINS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS diagnostic_domains (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    position INTEGER NOT NULL DEFAULT 0
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_PARTICIPANTS_TABLE,
    CREATE_NAME_INDEX,
    CREATE_STATUS_INDEX,
    CREATE_DOMAINS_TABLE,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.trim().is_empty());
        }
    }

    #[test]
    fn test_participants_table_enforces_unique_email() {
        assert!(CREATE_PARTICIPANTS_TABLE.contains("email TEXT NOT NULL UNIQUE"));
        assert!(CREATE_PARTICIPANTS_TABLE.contains("document TEXT NOT NULL"));
    }

    #[test]
    fn test_domains_table_enforces_unique_name() {
        assert!(CREATE_DOMAINS_TABLE.contains("name TEXT NOT NULL UNIQUE"));
    }
}

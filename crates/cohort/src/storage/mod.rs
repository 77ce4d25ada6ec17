//! Storage layer for cohort.
//!
//! This module provides `SQLite`-based persistent storage for participant
//! documents and diagnostic domains.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{DiagnosticDomain, Participant, ParticipantStatus};

/// Default page size for participant listings.
pub const DEFAULT_LIMIT: usize = 100;

/// Document store for participants and diagnostic domains.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

/// Filter and paging for participant listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantQuery {
    /// Case-insensitive substring matched against names and email.
    pub search: Option<String>,
    /// Only participants in this state.
    pub status: Option<ParticipantStatus>,
    /// Maximum number of results.
    pub limit: usize,
    /// Number of results to skip.
    pub offset: usize,
}

impl Default for ParticipantQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Participants ===

    /// Insert a new participant document.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id or email is already taken.
    pub fn insert_participant(&self, participant: &Participant) -> Result<()> {
        let document = serde_json::to_string(participant)?;
        self.conn
            .execute(
                r"
                INSERT INTO participants
                    (id, email, first_name, last_name, status, document, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
                params![
                    participant.id,
                    participant.email,
                    participant.first_name,
                    participant.last_name,
                    participant.status.to_string(),
                    document,
                    participant.created_at.to_rfc3339(),
                    participant.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| constraint_to_conflict(e, &participant.email))?;

        debug!("Inserted participant {}", participant.id);
        Ok(())
    }

    /// Get a participant by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored document is corrupt.
    pub fn get_participant(&self, id: &str) -> Result<Option<Participant>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM participants WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        document.as_deref().map(decode_document).transpose()
    }

    /// Find a participant by email, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored document is corrupt.
    pub fn find_by_email(&self, email: &str) -> Result<Option<Participant>> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM participants WHERE email = lower(?1)",
                [email.trim()],
                |row| row.get(0),
            )
            .optional()?;
        document.as_deref().map(decode_document).transpose()
    }

    /// List participants ordered by last name, then first name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored document is corrupt.
    pub fn list_participants(&self, query: &ParticipantQuery) -> Result<Vec<Participant>> {
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));
        let status = query.status.map(|s| s.to_string());
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);

        let mut stmt = self.conn.prepare(
            r"
            SELECT document FROM participants
            WHERE (?1 IS NULL
                   OR first_name LIKE ?1 ESCAPE '\'
                   OR last_name LIKE ?1 ESCAPE '\'
                   OR email LIKE ?1 ESCAPE '\')
              AND (?2 IS NULL OR status = ?2)
            ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE, id
            LIMIT ?3 OFFSET ?4
            ",
        )?;

        let documents = stmt
            .query_map(params![pattern, status, limit, offset], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        documents.iter().map(|doc| decode_document(doc)).collect()
    }

    /// Replace a stored participant document.
    ///
    /// Returns `false` if no participant has this id.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the new email belongs to another participant.
    pub fn update_participant(&self, participant: &Participant) -> Result<bool> {
        let document = serde_json::to_string(participant)?;
        let affected = self
            .conn
            .execute(
                r"
                UPDATE participants
                SET email = ?2, first_name = ?3, last_name = ?4, status = ?5,
                    document = ?6, updated_at = ?7
                WHERE id = ?1
                ",
                params![
                    participant.id,
                    participant.email,
                    participant.first_name,
                    participant.last_name,
                    participant.status.to_string(),
                    document,
                    participant.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| constraint_to_conflict(e, &participant.email))?;
        Ok(affected > 0)
    }

    /// Delete a participant by id.
    ///
    /// Returns `true` if a participant was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_participant(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM participants WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Count stored participants.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_participants(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM participants", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Diagnostic domains ===

    /// Insert a diagnostic domain.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the name is already taken.
    pub fn insert_domain(&self, domain: &DiagnosticDomain) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO diagnostic_domains (id, name, description, position) VALUES (?1, ?2, ?3, ?4)",
                params![domain.id, domain.name, domain.description, domain.position],
            )
            .map_err(|e| constraint_to_conflict(e, &domain.name))?;
        Ok(())
    }

    /// List diagnostic domains by position, then name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_domains(&self) -> Result<Vec<DiagnosticDomain>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, position FROM diagnostic_domains ORDER BY position, name",
        )?;
        let domains = stmt
            .query_map([], |row| {
                Ok(DiagnosticDomain {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    position: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(domains)
    }

    /// Delete a diagnostic domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_domain(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM diagnostic_domains WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    // === Statistics ===

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats {
            participants: self.count_participants()?,
            ..StorageStats::default()
        };

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM participants GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (status, count) in rows {
            match status.parse::<ParticipantStatus>() {
                Ok(ParticipantStatus::Active) => stats.active = count,
                Ok(ParticipantStatus::Inactive) => stats.inactive = count,
                Ok(ParticipantStatus::Completed) => stats.completed = count,
                Err(_) => debug!("Ignoring unknown status '{status}' in stats"),
            }
        }

        stats.domains = self
            .conn
            .query_row("SELECT COUNT(*) FROM diagnostic_domains", [], |row| row.get(0))?;

        let newest: Option<String> = self
            .conn
            .query_row("SELECT MAX(updated_at) FROM participants", [], |row| row.get(0))?;
        stats.last_updated = newest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        stats.db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(stats)
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Total participants.
    pub participants: i64,
    /// Participants with status `active`.
    pub active: i64,
    /// Participants with status `inactive`.
    pub inactive: i64,
    /// Participants with status `completed`.
    pub completed: i64,
    /// Diagnostic domains.
    pub domains: i64,
    /// Most recent participant modification.
    pub last_updated: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Parse a stored document; a document that no longer parses is an internal fault.
fn decode_document(document: &str) -> Result<Participant> {
    serde_json::from_str(document)
        .map_err(|e| Error::internal(format!("corrupt participant document: {e}")))
}

/// Escape `LIKE` wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn constraint_to_conflict(err: rusqlite::Error, key: &str) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _) if e.code == ErrorCode::ConstraintViolation => {
            Error::conflict(format!("'{key}' is already registered"))
        }
        other => other.into(),
    }
}

//! Participant registry service.
//!
//! [`Registry`] is the single entry point the HTTP layer uses to read and
//! change participant documents. It owns the [`Storage`] behind a mutex so it
//! can be cloned into every request handler.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{
    new_id, DiagnosticDomain, NewParticipant, Participant, ParticipantPatch, Progress,
};
use crate::storage::{ParticipantQuery, Storage, StorageStats};

/// Whether an upsert created or replaced the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// No participant had this id.
    Created,
    /// An existing participant was replaced.
    Replaced,
}

/// Shared handle to the participant store.
#[derive(Debug, Clone)]
pub struct Registry {
    storage: Arc<Mutex<Storage>>,
}

impl Registry {
    /// Wrap an opened storage.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Storage>> {
        self.storage
            .lock()
            .map_err(|_| Error::internal("storage lock poisoned"))
    }

    /// Register a new participant.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or `Conflict` if the email is taken.
    pub fn create(&self, input: NewParticipant) -> Result<Participant> {
        let participant = Participant::create(input)?;
        self.lock()?.insert_participant(&participant)?;
        info!(id = %participant.id, "Registered participant {}", participant.full_name());
        Ok(participant)
    }

    /// Fetch one participant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no participant has this id.
    pub fn get(&self, id: &str) -> Result<Participant> {
        self.lock()?
            .get_participant(id)?
            .ok_or_else(|| Error::not_found(format!("participant {id}")))
    }

    /// List participants matching a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn list(&self, query: &ParticipantQuery) -> Result<Vec<Participant>> {
        self.lock()?.list_participants(query)
    }

    /// Store a full document under `id`, creating it if needed.
    ///
    /// The stored id is always `id`. When replacing, the original
    /// `created_at` is kept; `updated_at` is set to now.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or `Conflict` if the email belongs to
    /// another participant.
    pub fn upsert(&self, id: &str, mut document: Participant) -> Result<(Participant, Upsert)> {
        document.id = id.to_string();
        document.email = document.email.trim().to_lowercase();

        let storage = self.lock()?;
        let outcome = match storage.get_participant(id)? {
            Some(existing) => {
                document.created_at = existing.created_at;
                document.touch();
                document.validate()?;
                storage.update_participant(&document)?;
                Upsert::Replaced
            }
            None => {
                let now = Utc::now();
                if document.created_at > now {
                    document.created_at = now;
                }
                document.touch();
                document.validate()?;
                storage.insert_participant(&document)?;
                Upsert::Created
            }
        };
        debug!(id, ?outcome, "Stored participant document");
        Ok((document, outcome))
    }

    /// Apply a partial update to a participant's own fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, a validation error, or `Conflict`.
    pub fn patch(&self, id: &str, patch: ParticipantPatch) -> Result<Participant> {
        self.edit(id, |participant| {
            participant.apply_patch(patch)?;
            Ok(participant.clone())
        })
    }

    /// Run an edit against one participant and persist the result.
    ///
    /// The closure receives the stored document; if it returns an error
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or whatever the closure or storage returns.
    pub fn edit<T>(&self, id: &str, f: impl FnOnce(&mut Participant) -> Result<T>) -> Result<T> {
        let storage = self.lock()?;
        let mut participant = storage
            .get_participant(id)?
            .ok_or_else(|| Error::not_found(format!("participant {id}")))?;
        let value = f(&mut participant)?;
        storage.update_participant(&participant)?;
        Ok(value)
    }

    /// Remove a participant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no participant has this id.
    pub fn delete(&self, id: &str) -> Result<()> {
        if self.lock()?.delete_participant(id)? {
            info!(id, "Deleted participant");
            Ok(())
        } else {
            Err(Error::not_found(format!("participant {id}")))
        }
    }

    /// Completion summary for one participant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no participant has this id.
    pub fn progress(&self, id: &str) -> Result<Progress> {
        Ok(self.get(id)?.progress())
    }

    /// Number of stored participants.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn count(&self) -> Result<i64> {
        self.lock()?.count_participants()
    }

    /// Storage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn stats(&self) -> Result<StorageStats> {
        self.lock()?.stats()
    }

    /// List diagnostic domains in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage query fails.
    pub fn domains(&self) -> Result<Vec<DiagnosticDomain>> {
        self.lock()?.list_domains()
    }

    /// Create a diagnostic domain with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or `Conflict` if the name is taken.
    pub fn create_domain(&self, mut domain: DiagnosticDomain) -> Result<DiagnosticDomain> {
        domain.id = new_id();
        domain.name = domain.name.trim().to_string();
        domain.validate()?;
        self.lock()?.insert_domain(&domain)?;
        Ok(domain)
    }

    /// Delete a diagnostic domain.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no domain has this id.
    pub fn delete_domain(&self, id: &str) -> Result<()> {
        if self.lock()?.delete_domain(id)? {
            Ok(())
        } else {
            Err(Error::not_found(format!("diagnostic domain {id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Formation, ParticipantStatus};

    fn registry() -> Registry {
        Registry::new(Storage::open_in_memory().unwrap())
    }

    fn input(email: &str) -> NewParticipant {
        NewParticipant {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            phone: None,
            company: None,
            status: ParticipantStatus::Active,
        }
    }

    #[test]
    fn test_create_and_get() {
        let registry = registry();
        let created = registry.create(input("ada@example.org")).unwrap();
        assert_eq!(registry.get(&created.id).unwrap(), created);
        assert_eq!(registry.count().unwrap(), 1);
    }

    #[test]
    fn test_get_missing() {
        assert!(registry().get("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_edit_persists() {
        let registry = registry();
        let p = registry.create(input("ada@example.org")).unwrap();
        let fid = registry
            .edit(&p.id, |p| Ok(p.add_formation(Formation::new("Engines"))?.id.clone()))
            .unwrap();
        let stored = registry.get(&p.id).unwrap();
        assert_eq!(stored.formations[0].id, fid);
    }

    #[test]
    fn test_failed_edit_writes_nothing() {
        let registry = registry();
        let p = registry.create(input("ada@example.org")).unwrap();
        let result = registry.edit(&p.id, |p| {
            p.first_name = "Changed".to_string();
            p.add_formation(Formation::new("")).map(|_| ())
        });
        assert!(result.is_err());
        assert_eq!(registry.get(&p.id).unwrap().first_name, "Ada");
    }

    #[test]
    fn test_patch_email_conflict() {
        let registry = registry();
        registry.create(input("ada@example.org")).unwrap();
        let other = registry.create(input("other@example.org")).unwrap();
        let err = registry
            .patch(
                &other.id,
                ParticipantPatch {
                    email: Some("ADA@example.org".to_string()),
                    ..ParticipantPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn test_upsert_creates_then_replaces() {
        let registry = registry();
        let doc = Participant::create(input("ada@example.org")).unwrap();

        let (created, outcome) = registry.upsert("fixed-id", doc.clone()).unwrap();
        assert_eq!(outcome, Upsert::Created);
        assert_eq!(created.id, "fixed-id");

        let mut changed = doc;
        changed.company = Some("Babbage & Co".to_string());
        let (replaced, outcome) = registry.upsert("fixed-id", changed).unwrap();
        assert_eq!(outcome, Upsert::Replaced);
        assert_eq!(replaced.created_at, created.created_at);
        assert_eq!(
            registry.get("fixed-id").unwrap().company.as_deref(),
            Some("Babbage & Co")
        );
    }

    #[test]
    fn test_delete() {
        let registry = registry();
        let p = registry.create(input("ada@example.org")).unwrap();
        registry.delete(&p.id).unwrap();
        assert!(registry.delete(&p.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_domains() {
        let registry = registry();
        let domain = registry
            .create_domain(DiagnosticDomain {
                id: "ignored".to_string(),
                name: " Strategy ".to_string(),
                description: Some("Positioning and goals".to_string()),
                position: 1,
            })
            .unwrap();
        assert_ne!(domain.id, "ignored");
        assert_eq!(domain.name, "Strategy");
        assert_eq!(registry.domains().unwrap().len(), 1);
        registry.delete_domain(&domain.id).unwrap();
        assert!(registry.delete_domain(&domain.id).unwrap_err().is_not_found());
    }
}

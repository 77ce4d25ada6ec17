//! Local JSON copy of participant documents used when the API is down.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::Participant;
use crate::storage::ParticipantQuery;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Snapshot {
    participants: Vec<Participant>,
    /// Ids changed locally and not yet pushed.
    pending: Vec<String>,
    /// Ids deleted locally and not yet deleted remotely.
    tombstones: Vec<String>,
}

/// File-backed offline store.
///
/// The whole snapshot is rewritten on every change through a temporary file
/// and a rename, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct OfflineStore {
    path: PathBuf,
    snapshot: Snapshot,
}

impl OfflineStore {
    /// Load the store at `path`, or start empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let data = fs::read(&path)?;
            serde_json::from_slice(&data)?
        } else {
            Snapshot::default()
        };
        debug!(
            path = %path.display(),
            participants = snapshot.participants.len(),
            pending = snapshot.pending.len(),
            "Opened offline store"
        );
        Ok(Self { path, snapshot })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All cached participants.
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.snapshot.participants
    }

    /// Look up a cached participant.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.snapshot.participants.iter().find(|p| p.id == id)
    }

    /// Find a cached participant by email, ignoring case.
    #[must_use]
    pub fn find_by_email(&self, email: &str) -> Option<&Participant> {
        let email = email.trim().to_lowercase();
        self.snapshot.participants.iter().find(|p| p.email == email)
    }

    /// Filter cached participants the same way the server does.
    #[must_use]
    pub fn list(&self, query: &ParticipantQuery) -> Vec<Participant> {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let mut matches: Vec<&Participant> = self
            .snapshot
            .participants
            .iter()
            .filter(|p| query.status.map_or(true, |status| p.status == status))
            .filter(|p| {
                needle.as_deref().map_or(true, |needle| {
                    p.first_name.to_lowercase().contains(needle)
                        || p.last_name.to_lowercase().contains(needle)
                        || p.email.contains(needle)
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            a.last_name
                .to_lowercase()
                .cmp(&b.last_name.to_lowercase())
                .then_with(|| a.first_name.to_lowercase().cmp(&b.first_name.to_lowercase()))
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect()
    }

    /// Participants with local changes not yet pushed.
    #[must_use]
    pub fn pending(&self) -> Vec<Participant> {
        self.snapshot
            .pending
            .iter()
            .filter_map(|id| self.get(id).cloned())
            .collect()
    }

    /// Ids deleted locally and not yet deleted remotely.
    #[must_use]
    pub fn tombstones(&self) -> &[String] {
        &self.snapshot.tombstones
    }

    /// Whether anything is waiting to be synced.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.snapshot.pending.is_empty() || !self.snapshot.tombstones.is_empty()
    }

    /// Refresh the cache with documents fetched from the API.
    ///
    /// Documents with unpushed local changes are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn cache(&mut self, participants: &[Participant]) -> Result<()> {
        let mut changed = false;
        for participant in participants {
            if self.is_pending(&participant.id) || self.is_tombstoned(&participant.id) {
                continue;
            }
            changed |= self.upsert(participant.clone());
        }
        if changed {
            self.save()?;
        }
        Ok(())
    }

    /// Store a locally changed document and mark it pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn store_local(&mut self, participant: Participant) -> Result<()> {
        let id = participant.id.clone();
        self.upsert(participant);
        if !self.is_pending(&id) {
            self.snapshot.pending.push(id);
        }
        self.save()
    }

    /// Delete a document locally and remember to delete it remotely.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document is not cached, or an error if the
    /// file cannot be written.
    pub fn remove_local(&mut self, id: &str) -> Result<()> {
        if !self.take(id) {
            return Err(Error::not_found(format!("participant {id}")));
        }
        self.snapshot.pending.retain(|p| p != id);
        if !self.is_tombstoned(id) {
            self.snapshot.tombstones.push(id.to_string());
        }
        self.save()
    }

    /// Drop a document that no longer exists remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn forget(&mut self, id: &str) -> Result<()> {
        let removed = self.take(id);
        let before = self.snapshot.pending.len() + self.snapshot.tombstones.len();
        self.snapshot.pending.retain(|p| p != id);
        self.snapshot.tombstones.retain(|t| t != id);
        let after = self.snapshot.pending.len() + self.snapshot.tombstones.len();
        if removed || before != after {
            self.save()?;
        }
        Ok(())
    }

    /// Record that a pending document was pushed, replacing it with the
    /// server's copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn mark_synced(&mut self, participant: Participant) -> Result<()> {
        self.snapshot.pending.retain(|p| *p != participant.id);
        self.upsert(participant);
        self.save()
    }

    /// Record that a tombstone was applied remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn clear_tombstone(&mut self, id: &str) -> Result<()> {
        self.snapshot.tombstones.retain(|t| t != id);
        self.save()
    }

    fn is_pending(&self, id: &str) -> bool {
        self.snapshot.pending.iter().any(|p| p == id)
    }

    fn is_tombstoned(&self, id: &str) -> bool {
        self.snapshot.tombstones.iter().any(|t| t == id)
    }

    /// Insert or replace; returns whether the snapshot changed.
    fn upsert(&mut self, participant: Participant) -> bool {
        match self
            .snapshot
            .participants
            .iter_mut()
            .find(|p| p.id == participant.id)
        {
            Some(existing) if existing.revision() == participant.revision() => false,
            Some(existing) => {
                *existing = participant;
                true
            }
            None => {
                self.snapshot.participants.push(participant);
                true
            }
        }
    }

    fn take(&mut self, id: &str) -> bool {
        let before = self.snapshot.participants.len();
        self.snapshot.participants.retain(|p| p.id != id);
        self.snapshot.participants.len() != before
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&self.snapshot)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewParticipant, ParticipantStatus};
    use tempfile::TempDir;

    fn participant(first: &str, last: &str, email: &str) -> Participant {
        Participant::create(NewParticipant {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.to_string(),
            phone: None,
            company: None,
            status: ParticipantStatus::Active,
        })
        .unwrap()
    }

    fn open(dir: &TempDir) -> OfflineStore {
        OfflineStore::open(dir.path().join("offline.json")).unwrap()
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.participants().is_empty());
        assert!(!store.has_changes());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_local_changes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let p = participant("Ada", "Lovelace", "ada@example.org");
        {
            let mut store = open(&dir);
            store.store_local(p.clone()).unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.get(&p.id), Some(&p));
        assert_eq!(store.pending(), vec![p]);
        assert!(!dir.path().join("offline.json.tmp").exists());
    }

    #[test]
    fn test_cache_keeps_pending_documents() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let mut local = participant("Ada", "Lovelace", "ada@example.org");
        local.company = Some("Local".to_string());
        store.store_local(local.clone()).unwrap();

        let mut remote = local.clone();
        remote.company = Some("Remote".to_string());
        store.cache(&[remote]).unwrap();

        assert_eq!(store.get(&local.id).unwrap().company.as_deref(), Some("Local"));
    }

    #[test]
    fn test_remove_local_records_tombstone() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let p = participant("Ada", "Lovelace", "ada@example.org");
        store.store_local(p.clone()).unwrap();
        store.remove_local(&p.id).unwrap();

        assert!(store.get(&p.id).is_none());
        assert!(store.pending().is_empty());
        assert_eq!(store.tombstones(), [p.id.clone()]);
        assert!(store.remove_local(&p.id).unwrap_err().is_not_found());

        store.clear_tombstone(&p.id).unwrap();
        assert!(!store.has_changes());
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let mut grace = participant("Grace", "Hopper", "grace@example.org");
        grace.status = ParticipantStatus::Completed;
        store
            .cache(&[
                participant("Ada", "Lovelace", "ada@example.org"),
                grace,
                participant("Alan", "Turing", "alan@example.org"),
            ])
            .unwrap();

        let all = store.list(&ParticipantQuery::default());
        let names: Vec<_> = all.iter().map(|p| p.last_name.as_str()).collect();
        assert_eq!(names, ["Hopper", "Lovelace", "Turing"]);

        let query = ParticipantQuery {
            search: Some("AL".to_string()),
            ..ParticipantQuery::default()
        };
        assert_eq!(store.list(&query).len(), 1);

        let query = ParticipantQuery {
            status: Some(ParticipantStatus::Completed),
            ..ParticipantQuery::default()
        };
        assert_eq!(store.list(&query)[0].first_name, "Grace");

        let query = ParticipantQuery {
            limit: 1,
            offset: 1,
            ..ParticipantQuery::default()
        };
        assert_eq!(store.list(&query)[0].last_name, "Lovelace");
    }

    #[test]
    fn test_search_matches_storage() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let storage = crate::storage::Storage::open_in_memory().unwrap();
        let people = [
            participant("Ada", "Lovelace", "ada_l@example.org"),
            participant("Alan", "Turing", "alan@example.org"),
        ];
        for p in &people {
            storage.insert_participant(p).unwrap();
        }
        store.cache(&people).unwrap();

        for search in ["  ", " ada ", "_", "%", "AL", "example", "nobody"] {
            let query = ParticipantQuery {
                search: Some(search.to_string()),
                ..ParticipantQuery::default()
            };
            let ids = |list: Vec<Participant>| list.into_iter().map(|p| p.id).collect::<Vec<_>>();
            assert_eq!(
                ids(store.list(&query)),
                ids(storage.list_participants(&query).unwrap()),
                "search {search:?}"
            );
        }
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("offline.json");
        fs::write(&path, "{not json").unwrap();
        assert!(OfflineStore::open(&path).is_err());
    }
}

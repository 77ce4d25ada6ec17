//! Participant operations with transparent offline fallback.

use serde::Serialize;
use tracing::{info, warn};

use super::api::RemoteParticipants;
use super::offline::OfflineStore;
use crate::error::{Error, Result};
use crate::model::{NewParticipant, Participant, ParticipantPatch};
use crate::storage::ParticipantQuery;

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Answered by the API.
    Remote,
    /// Answered from the offline store.
    Offline,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A value tagged with its [`Source`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<T> {
    /// The result itself.
    pub value: T,
    /// Who answered.
    pub source: Source,
}

impl<T> Sourced<T> {
    fn remote(value: T) -> Self {
        Self {
            value,
            source: Source::Remote,
        }
    }

    fn offline(value: T) -> Self {
        Self {
            value,
            source: Source::Offline,
        }
    }
}

/// Outcome of pushing local changes to the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Documents created or updated remotely.
    pub pushed: usize,
    /// Documents deleted remotely.
    pub deleted: usize,
    /// Ids that could not be synced, with the reason.
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    /// Whether every pending change was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Front door for participant operations on the client side.
///
/// Every call goes to the API first. Only when the API is unreachable, and
/// fallback is enabled, is the offline store used instead; API errors such
/// as 400 or 404 are returned unchanged.
#[derive(Debug)]
pub struct ParticipantService<R> {
    remote: R,
    offline: OfflineStore,
    fallback: bool,
}

impl<R: RemoteParticipants> ParticipantService<R> {
    /// Combine a remote with an offline store. `fallback` enables serving
    /// from the store when the remote is unreachable.
    #[must_use]
    pub fn new(remote: R, offline: OfflineStore, fallback: bool) -> Self {
        Self {
            remote,
            offline,
            fallback,
        }
    }

    /// The remote this service talks to.
    #[must_use]
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// The offline store backing this service.
    #[must_use]
    pub fn offline(&self) -> &OfflineStore {
        &self.offline
    }

    fn falls_back(&self, err: &Error) -> bool {
        if self.fallback && err.is_unreachable() {
            warn!("{err}; using offline data");
            true
        } else {
            false
        }
    }

    /// List participants.
    ///
    /// # Errors
    ///
    /// Returns the API error, or a storage error from the offline store.
    pub async fn list(&mut self, query: &ParticipantQuery) -> Result<Sourced<Vec<Participant>>> {
        match self.remote.list(query).await {
            Ok(participants) => {
                self.offline.cache(&participants)?;
                Ok(Sourced::remote(participants))
            }
            Err(e) if self.falls_back(&e) => Ok(Sourced::offline(self.offline.list(query))),
            Err(e) => Err(e),
        }
    }

    /// Fetch one participant.
    ///
    /// # Errors
    ///
    /// Returns the API error, or `NotFound` if offline and not cached.
    pub async fn get(&mut self, id: &str) -> Result<Sourced<Participant>> {
        match self.remote.get(id).await {
            Ok(participant) => {
                self.offline.cache(std::slice::from_ref(&participant))?;
                Ok(Sourced::remote(participant))
            }
            Err(e) if self.falls_back(&e) => self
                .offline
                .get(id)
                .cloned()
                .map(Sourced::offline)
                .ok_or_else(|| Error::not_found(format!("participant {id}"))),
            Err(e) => Err(e),
        }
    }

    /// Register a participant.
    ///
    /// # Errors
    ///
    /// Returns the API error, or a validation or `Conflict` error when
    /// created offline.
    pub async fn create(&mut self, input: NewParticipant) -> Result<Sourced<Participant>> {
        match self.remote.create(&input).await {
            Ok(participant) => {
                self.offline.cache(std::slice::from_ref(&participant))?;
                Ok(Sourced::remote(participant))
            }
            Err(e) if self.falls_back(&e) => {
                let participant = Participant::create(input)?;
                self.ensure_email_free(&participant)?;
                self.offline.store_local(participant.clone())?;
                Ok(Sourced::offline(participant))
            }
            Err(e) => Err(e),
        }
    }

    /// Partially update a participant.
    ///
    /// # Errors
    ///
    /// Returns the API error, or `NotFound`, validation or `Conflict` errors
    /// when updated offline.
    pub async fn update(&mut self, id: &str, patch: ParticipantPatch) -> Result<Sourced<Participant>> {
        match self.remote.patch(id, &patch).await {
            Ok(participant) => {
                self.offline.cache(std::slice::from_ref(&participant))?;
                Ok(Sourced::remote(participant))
            }
            Err(e) if self.falls_back(&e) => {
                let mut participant = self
                    .offline
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::not_found(format!("participant {id}")))?;
                participant.apply_patch(patch)?;
                self.ensure_email_free(&participant)?;
                self.offline.store_local(participant.clone())?;
                Ok(Sourced::offline(participant))
            }
            Err(e) => Err(e),
        }
    }

    /// Store a full document, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the API error, or validation or `Conflict` errors when stored
    /// offline.
    pub async fn replace(&mut self, mut participant: Participant) -> Result<Sourced<Participant>> {
        match self.remote.put(&participant).await {
            Ok(stored) => {
                self.offline.cache(std::slice::from_ref(&stored))?;
                Ok(Sourced::remote(stored))
            }
            Err(e) if self.falls_back(&e) => {
                if let Some(existing) = self.offline.get(&participant.id) {
                    participant.created_at = existing.created_at;
                }
                participant.touch();
                participant.validate()?;
                self.ensure_email_free(&participant)?;
                self.offline.store_local(participant.clone())?;
                Ok(Sourced::offline(participant))
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a participant.
    ///
    /// # Errors
    ///
    /// Returns the API error, or `NotFound` if offline and not cached.
    pub async fn delete(&mut self, id: &str) -> Result<Source> {
        match self.remote.delete(id).await {
            Ok(()) => {
                self.offline.forget(id)?;
                Ok(Source::Remote)
            }
            Err(e) if self.falls_back(&e) => {
                self.offline.remove_local(id)?;
                Ok(Source::Offline)
            }
            Err(e) => Err(e),
        }
    }

    /// Push local changes to the API.
    ///
    /// Pending documents are sent with PUT, which creates them when the API
    /// lacks the id. Changes that fail with an API error stay pending and are
    /// listed in the report.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` if the API cannot be reached; changes applied
    /// before that point stay applied.
    pub async fn sync(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for participant in self.offline.pending() {
            match self.remote.put(&participant).await {
                Ok(stored) => {
                    self.offline.mark_synced(stored)?;
                    report.pushed += 1;
                }
                Err(e) if e.is_unreachable() => return Err(e),
                Err(e) => {
                    warn!(id = %participant.id, "Sync failed: {e}");
                    report.failed.push((participant.id.clone(), e.to_string()));
                }
            }
        }

        for id in self.offline.tombstones().to_vec() {
            match self.remote.delete(&id).await {
                Ok(()) => {
                    self.offline.clear_tombstone(&id)?;
                    report.deleted += 1;
                }
                Err(e) if e.is_not_found() => self.offline.clear_tombstone(&id)?,
                Err(e) if e.is_unreachable() => return Err(e),
                Err(e) => {
                    warn!(%id, "Sync delete failed: {e}");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        info!(
            pushed = report.pushed,
            deleted = report.deleted,
            failed = report.failed.len(),
            "Sync finished"
        );
        Ok(report)
    }

    fn ensure_email_free(&self, participant: &Participant) -> Result<()> {
        match self.offline.find_by_email(&participant.email) {
            Some(other) if other.id != participant.id => Err(Error::conflict(format!(
                "email {} is already registered",
                participant.email
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParticipantStatus;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory stand-in for the API that can be switched offline.
    #[derive(Default)]
    struct FakeRemote {
        online: AtomicBool,
        docs: Mutex<BTreeMap<String, Participant>>,
    }

    impl FakeRemote {
        fn online() -> Self {
            let remote = Self::default();
            remote.online.store(true, Ordering::SeqCst);
            remote
        }

        fn check(&self) -> Result<()> {
            if self.online.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(Error::unreachable("http://fake/api", "connection refused"))
            }
        }

        fn missing(id: &str) -> Error {
            Error::Api {
                status: 404,
                message: format!("participant {id} not found"),
            }
        }
    }

    #[async_trait]
    impl RemoteParticipants for FakeRemote {
        async fn list(&self, _query: &ParticipantQuery) -> Result<Vec<Participant>> {
            self.check()?;
            Ok(self.docs.lock().unwrap().values().cloned().collect())
        }

        async fn get(&self, id: &str) -> Result<Participant> {
            self.check()?;
            self.docs
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| FakeRemote::missing(id))
        }

        async fn create(&self, input: &NewParticipant) -> Result<Participant> {
            self.check()?;
            let participant = Participant::create(input.clone())?;
            self.docs
                .lock()
                .unwrap()
                .insert(participant.id.clone(), participant.clone());
            Ok(participant)
        }

        async fn put(&self, participant: &Participant) -> Result<Participant> {
            self.check()?;
            self.docs
                .lock()
                .unwrap()
                .insert(participant.id.clone(), participant.clone());
            Ok(participant.clone())
        }

        async fn patch(&self, id: &str, patch: &ParticipantPatch) -> Result<Participant> {
            self.check()?;
            let mut docs = self.docs.lock().unwrap();
            let participant = docs.get_mut(id).ok_or_else(|| FakeRemote::missing(id))?;
            participant.apply_patch(patch.clone())?;
            Ok(participant.clone())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.check()?;
            self.docs
                .lock()
                .unwrap()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| FakeRemote::missing(id))
        }
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

    fn service(remote: FakeRemote, dir: &TempDir, fallback: bool) -> ParticipantService<FakeRemote> {
        let offline = OfflineStore::open(dir.path().join("offline.json")).unwrap();
        ParticipantService::new(remote, offline, fallback)
    }

    #[tokio::test]
    async fn test_remote_results_are_cached() {
        let remote = FakeRemote::online();
        let dir = TempDir::new().unwrap();
        let mut service = service(remote, &dir, true);

        let created = service.create(input("ada@example.org")).await.unwrap();
        assert_eq!(created.source, Source::Remote);
        assert!(service.offline().get(&created.value.id).is_some());
        assert!(!service.offline().has_changes());
    }

    #[tokio::test]
    async fn test_reads_fall_back_when_unreachable() {
        let remote = FakeRemote::online();
        let dir = TempDir::new().unwrap();
        let mut service = service(remote, &dir, true);
        let created = service.create(input("ada@example.org")).await.unwrap().value;

        service.remote().online.store(false, Ordering::SeqCst);
        let listed = service.list(&ParticipantQuery::default()).await.unwrap();
        assert_eq!(listed.source, Source::Offline);
        assert_eq!(listed.value.len(), 1);

        let fetched = service.get(&created.id).await.unwrap();
        assert_eq!(fetched.source, Source::Offline);
        assert!(service.get("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_no_fallback_when_disabled() {
        let remote = FakeRemote::default();
        let dir = TempDir::new().unwrap();
        let mut service = service(remote, &dir, false);
        let err = service.list(&ParticipantQuery::default()).await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_api_errors_do_not_fall_back() {
        let remote = FakeRemote::online();
        let dir = TempDir::new().unwrap();
        let mut service = service(remote, &dir, true);
        let err = service.get("missing").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_offline_writes_sync_later() {
        let remote = FakeRemote::default();
        let dir = TempDir::new().unwrap();
        let mut service = service(remote, &dir, true);

        let created = service.create(input("ada@example.org")).await.unwrap();
        assert_eq!(created.source, Source::Offline);
        let id = created.value.id.clone();

        let updated = service
            .update(
                &id,
                ParticipantPatch {
                    company: Some("Engines Ltd".to_string()),
                    ..ParticipantPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.source, Source::Offline);

        let err = service.sync().await.unwrap_err();
        assert!(err.is_unreachable());
        assert!(service.offline().has_changes());

        service.remote().online.store(true, Ordering::SeqCst);
        let report = service.sync().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert!(report.is_complete());
        assert!(!service.offline().has_changes());

        let stored = service.remote().docs.lock().unwrap().get(&id).cloned().unwrap();
        assert_eq!(stored.company.as_deref(), Some("Engines Ltd"));
    }

    #[tokio::test]
    async fn test_offline_delete_syncs_tombstone() {
        let remote = FakeRemote::online();
        let dir = TempDir::new().unwrap();
        let mut service = service(remote, &dir, true);
        let id = service.create(input("ada@example.org")).await.unwrap().value.id;

        service.remote().online.store(false, Ordering::SeqCst);
        assert_eq!(service.delete(&id).await.unwrap(), Source::Offline);

        service.remote().online.store(true, Ordering::SeqCst);
        let report = service.sync().await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(service.remote().docs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_create_rejects_duplicate_email() {
        let remote = FakeRemote::default();
        let dir = TempDir::new().unwrap();
        let mut service = service(remote, &dir, true);
        service.create(input("ada@example.org")).await.unwrap();
        let err = service.create(input("ADA@example.org")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }
}

//! Mutex-guarded registry with a pluggable journal.
//!
//! Every call runs on the blocking pool: journaling fsyncs, and a desk waiting
//! on the lock must not hold up a runtime worker. A caller that stops waiting
//! (a timeout) does not cancel the call; it still commits or fails on its own.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::records::{Plan, Records};
use super::{CasOutcome, ParticipantStore, RegisterError, StoreError};
use crate::persistence::{EventLog, RegistryEvent};
use crate::types::{AttendanceStatus, NewParticipant, Participant, ParticipantId, QrToken};

/// Where committed registry events go before they become visible.
pub trait Journal: Send + 'static {
    /// Makes `event` durable. An error aborts the mutation.
    fn record(&mut self, event: &RegistryEvent) -> Result<(), StoreError>;
}

/// Journal for in-memory registries: nothing to persist.
#[derive(Debug, Default)]
pub struct NoJournal;

impl Journal for NoJournal {
    fn record(&mut self, _event: &RegistryEvent) -> Result<(), StoreError> {
        Ok(())
    }
}

impl Journal for EventLog<RegistryEvent> {
    fn record(&mut self, event: &RegistryEvent) -> Result<(), StoreError> {
        self.append(event.clone())?;
        Ok(())
    }
}

/// A participant registry.
///
/// The mutex is the store's conditional-write primitive: a compare-and-set
/// checks, journals, and applies under one lock acquisition.
pub struct Registry<J> {
    state: Arc<Mutex<State<J>>>,
}

struct State<J> {
    records: Records,
    journal: J,
}

/// Registry that lives only in memory.
pub type MemoryStore = Registry<NoJournal>;

/// Registry backed by a JSON Lines journal.
pub type JournaledStore = Registry<EventLog<RegistryEvent>>;

impl MemoryStore {
    pub fn new() -> Self {
        Registry::with_journal(NoJournal)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JournaledStore {
    /// Opens (or creates) the journal at `path` and rebuilds the registry from it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let (journal, events) = EventLog::<RegistryEvent>::open(path.as_ref())?;

        let mut records = Records::default();
        let replayed = events.len();
        for event in events {
            let seq = event.seq;
            records.apply(event.payload).map_err(|e| {
                StoreError::Unavailable(format!("journal replay failed at seq {seq}: {e}"))
            })?;
        }

        info!(
            path = %path.as_ref().display(),
            events = replayed,
            "Registry journal replayed"
        );

        Ok(Registry::from_state(State { records, journal }))
    }
}

impl<J: Journal> Registry<J> {
    /// An empty registry writing through `journal`.
    pub fn with_journal(journal: J) -> Self {
        Registry::from_state(State {
            records: Records::default(),
            journal,
        })
    }

    fn from_state(state: State<J>) -> Self {
        Registry {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Runs `op` under the lock on the blocking pool.
    async fn locked<T, E>(
        &self,
        op: impl FnOnce(&mut State<J>) -> Result<T, E> + Send + 'static,
    ) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            let mut guard = state
                .lock()
                .map_err(|_| StoreError::Unavailable("registry lock poisoned".to_string()))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("registry task failed: {e}")))?
    }
}

impl<J> State<J>
where
    J: Journal,
{
    /// Journals then applies an event.
    fn commit(&mut self, event: RegistryEvent) -> Result<Participant, StoreError> {
        self.journal.record(&event)?;
        self.records.apply(event)
    }

    fn cas(
        &mut self,
        plan: impl FnOnce(&Records) -> Result<Plan, StoreError>,
    ) -> Result<CasOutcome, StoreError> {
        match plan(&self.records)? {
            Plan::Commit(event) => self.commit(event).map(CasOutcome::Committed),
            Plan::Conflict(current) => Ok(CasOutcome::Conflict(current)),
        }
    }
}

impl<J: Journal> ParticipantStore for Registry<J> {
    async fn get(&self, id: &ParticipantId) -> Result<Option<Participant>, StoreError> {
        let id = id.clone();
        self.locked(move |state| Ok(state.records.get(&id).cloned()))
            .await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Participant>, StoreError> {
        let token = token.to_string();
        self.locked(move |state| Ok(state.records.find_by_token(&token).cloned()))
            .await
    }

    async fn compare_and_set_status(
        &self,
        id: &ParticipantId,
        expected: AttendanceStatus,
        new: AttendanceStatus,
    ) -> Result<CasOutcome, StoreError> {
        let id = id.clone();
        self.locked(move |state| {
            let outcome = state.cas(|records| records.plan_status(&id, expected, new))?;
            debug!(
                participant_id = %id,
                expected = %expected,
                new = %new,
                committed = outcome.is_committed(),
                "Status compare-and-set"
            );
            Ok(outcome)
        })
        .await
    }

    async fn compare_and_set_gift(&self, id: &ParticipantId) -> Result<CasOutcome, StoreError> {
        let id = id.clone();
        self.locked(move |state| {
            let outcome = state.cas(|records| records.plan_gift(&id))?;
            debug!(
                participant_id = %id,
                committed = outcome.is_committed(),
                "Gift compare-and-set"
            );
            Ok(outcome)
        })
        .await
    }

    async fn register(&self, new: NewParticipant) -> Result<Participant, RegisterError> {
        self.locked(move |state| {
            let event = state.records.plan_register(new)?;
            let participant = state.commit(event)?;
            info!(participant_id = %participant.id, "Participant registered");
            Ok(participant)
        })
        .await
    }

    async fn reissue_token(
        &self,
        id: &ParticipantId,
        token: QrToken,
    ) -> Result<Participant, RegisterError> {
        let id = id.clone();
        self.locked(move |state| {
            let event = state.records.plan_reissue(&id, token)?;
            Ok(state.commit(event)?)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Participant>, StoreError> {
        self.locked(|state| Ok(state.records.list())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SlowJournal;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn asha() -> NewParticipant {
        NewParticipant::new("p1", "Asha", "asha@example.org").with_token("t1")
    }

    #[tokio::test]
    async fn register_then_get() {
        let store = MemoryStore::new();
        let p = store.register(asha()).await.unwrap();
        assert_eq!(p.status, AttendanceStatus::Registered);

        let fetched = store.get(&ParticipantId::new("p1")).await.unwrap();
        assert_eq!(fetched, Some(p));
        assert_eq!(store.get(&ParticipantId::new("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let store = MemoryStore::new();
        store.register(asha()).await.unwrap();
        let again = store.register(asha()).await;
        assert_eq!(
            again,
            Err(RegisterError::DuplicateId(ParticipantId::new("p1")))
        );
    }

    #[tokio::test]
    async fn find_by_token_resolves() {
        let store = MemoryStore::new();
        store.register(asha()).await.unwrap();
        let found = store.find_by_token("t1").await.unwrap().unwrap();
        assert_eq!(found.id, ParticipantId::new("p1"));
        assert!(store.find_by_token("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cas_status_commits_once() {
        let store = MemoryStore::new();
        store.register(asha()).await.unwrap();
        let id = ParticipantId::new("p1");

        let first = store
            .compare_and_set_status(&id, AttendanceStatus::Registered, AttendanceStatus::Scanned)
            .await
            .unwrap();
        assert!(first.is_committed());
        assert_eq!(first.participant().status, AttendanceStatus::Scanned);

        let second = store
            .compare_and_set_status(&id, AttendanceStatus::Registered, AttendanceStatus::Scanned)
            .await
            .unwrap();
        assert!(!second.is_committed());
    }

    #[tokio::test]
    async fn cas_gift_commits_once() {
        let store = MemoryStore::new();
        store.register(asha()).await.unwrap();
        let id = ParticipantId::new("p1");

        assert!(store.compare_and_set_gift(&id).await.unwrap().is_committed());
        assert!(!store.compare_and_set_gift(&id).await.unwrap().is_committed());
    }

    #[tokio::test]
    async fn cas_on_unknown_participant_errors() {
        let store = MemoryStore::new();
        let result = store.compare_and_set_gift(&ParticipantId::new("ghost")).await;
        assert_eq!(
            result,
            Err(StoreError::UnknownParticipant(ParticipantId::new("ghost")))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cas_has_exactly_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store.register(asha()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_set_status(
                        &ParticipantId::new("p1"),
                        AttendanceStatus::Registered,
                        AttendanceStatus::Scanned,
                    )
                    .await
                    .unwrap()
                    .is_committed()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn list_is_in_registration_order() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .register(NewParticipant::new(format!("p{i}"), "X", "x@example.org"))
                .await
                .unwrap();
        }
        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id.0)
            .collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4"]);
    }

    #[tokio::test]
    async fn journaled_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("participants.log");
        let id = ParticipantId::new("p1");

        {
            let store = JournaledStore::open(&path).unwrap();
            store.register(asha()).await.unwrap();
            store
                .compare_and_set_status(
                    &id,
                    AttendanceStatus::Registered,
                    AttendanceStatus::Scanned,
                )
                .await
                .unwrap();
            store.compare_and_set_gift(&id).await.unwrap();
            store.reissue_token(&id, QrToken::new("t2")).await.unwrap();
        }

        let store = JournaledStore::open(&path).unwrap();
        let p = store.get(&id).await.unwrap().unwrap();
        assert_eq!(p.status, AttendanceStatus::Scanned);
        assert!(p.gift_redeemed);
        assert_eq!(p.qr_token, QrToken::new("t2"));
        assert_eq!(store.find_by_token("t1").await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn conflicts_are_not_journaled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("participants.log");
        let id = ParticipantId::new("p1");

        let store = JournaledStore::open(&path).unwrap();
        store.register(asha()).await.unwrap();
        for _ in 0..3 {
            store.compare_and_set_gift(&id).await.unwrap();
        }
        drop(store);

        let (events, _) = EventLog::<RegistryEvent>::replay(&path).unwrap();
        assert_eq!(events.len(), 2, "one registration and one gift commit");
    }

    #[tokio::test]
    async fn slow_journal_does_not_block_the_caller() {
        let store = Registry::with_journal(SlowJournal::new(Duration::from_millis(400)));
        store.register(asha()).await.unwrap();
        let id = ParticipantId::new("p1");

        // Single-threaded runtime: the timeout can only fire if the write is off-thread.
        let started = Instant::now();
        let gave_up = tokio::time::timeout(
            Duration::from_millis(50),
            store.compare_and_set_gift(&id),
        )
        .await;
        assert!(gave_up.is_err());
        assert!(started.elapsed() < Duration::from_millis(300));

        // The abandoned write still lands.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(store.get(&id).await.unwrap().unwrap().gift_redeemed);
    }
}

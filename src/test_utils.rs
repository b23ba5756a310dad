//! Shared test utilities and arbitrary generators for property-based testing.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use crate::audit::{AuditError, AuditSink};
use crate::persistence::{EventLogError, RegistryEvent};
use crate::registry::{
    CasOutcome, Journal, MemoryStore, ParticipantStore, RegisterError, StoreError,
};
use crate::types::{
    AttendanceStatus, NewParticipant, Participant, ParticipantId, Purpose, QrToken,
    ScanLogEntry,
};

pub fn arb_participant_id() -> impl Strategy<Value = ParticipantId> {
    "[a-z0-9@._-]{1,40}".prop_map(ParticipantId)
}

pub fn arb_purpose() -> impl Strategy<Value = Purpose> {
    prop_oneof![
        Just(Purpose::CheckIn),
        Just(Purpose::Attendance),
        Just(Purpose::Gift),
    ]
}

pub fn arb_status() -> impl Strategy<Value = AttendanceStatus> {
    prop_oneof![
        Just(AttendanceStatus::Registered),
        Just(AttendanceStatus::CheckedIn),
        Just(AttendanceStatus::Scanned),
    ]
}

pub fn arb_token() -> impl Strategy<Value = QrToken> {
    "qr-[0-9a-f]{8,32}".prop_map(QrToken)
}

pub fn arb_participant() -> impl Strategy<Value = Participant> {
    (
        arb_participant_id(),
        "[A-Za-z ]{1,30}",
        "[a-z]{1,10}@example\\.org",
        arb_token(),
        0i64..4_000_000_000,
    )
        .prop_map(|(id, name, email, token, secs)| {
            let at = Utc.timestamp_opt(secs, 0).single().unwrap();
            Participant::registered(
                NewParticipant {
                    id: Some(id),
                    name,
                    email,
                    phone: None,
                    qr_token: Some(token),
                },
                at,
            )
        })
}

pub fn arb_registry_event() -> impl Strategy<Value = RegistryEvent> {
    prop_oneof![
        arb_participant().prop_map(|participant| RegistryEvent::Registered { participant }),
        (arb_participant_id(), arb_status(), arb_status())
            .prop_map(|(id, from, to)| RegistryEvent::StatusChanged { id, from, to }),
        arb_participant_id().prop_map(|id| RegistryEvent::GiftRedeemed { id }),
        (arb_participant_id(), arb_token())
            .prop_map(|(id, token)| RegistryEvent::TokenReissued { id, token }),
    ]
}

/// A sequence of `(participant index, purpose)` scans over `participants` people.
pub fn arb_scan_plan(
    participants: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<(usize, Purpose)>> {
    prop::collection::vec((0..participants, arb_purpose()), 1..max_len)
}

/// Registers `p0..p{n-1}` with distinct names and emails.
pub async fn seed_participants<S: ParticipantStore>(store: &S, n: usize) {
    for i in 0..n {
        store
            .register(NewParticipant::new(
                format!("p{i}"),
                format!("Participant {i}"),
                format!("p{i}@example.org"),
            ))
            .await
            .unwrap();
    }
}

/// A registry journal whose writes take `delay` of wall-clock time, like a
/// disk that is slow to fsync. Registrations are written immediately.
pub struct SlowJournal {
    delay: Duration,
}

impl SlowJournal {
    pub fn new(delay: Duration) -> Self {
        SlowJournal { delay }
    }
}

impl Journal for SlowJournal {
    fn record(&mut self, event: &RegistryEvent) -> Result<(), StoreError> {
        if !matches!(event, RegistryEvent::Registered { .. }) {
            std::thread::sleep(self.delay);
        }
        Ok(())
    }
}

/// An audit sink that can be switched into failing. Clones share the switch.
#[derive(Clone, Default)]
pub struct FlakySink {
    failing: Arc<AtomicBool>,
}

impl FlakySink {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AuditSink for FlakySink {
    fn record(&mut self, _entry: &ScanLogEntry) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventLogError::Io(io::Error::other("injected failure")).into());
        }
        Ok(())
    }
}

/// How a [`FlakyStore`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoreFault {
    None = 0,
    /// Every call returns `StoreError::Unavailable`.
    Fail = 1,
    /// Every call hangs for an hour before answering.
    Hang = 2,
}

/// A [`MemoryStore`] whose calls can be made to fail or hang.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fault: AtomicU8,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fault(&self, fault: StoreFault) {
        self.fault.store(fault as u8, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), StoreError> {
        match self.fault.load(Ordering::SeqCst) {
            1 => Err(StoreError::Unavailable("injected failure".to_string())),
            2 => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl ParticipantStore for FlakyStore {
    async fn get(&self, id: &ParticipantId) -> Result<Option<Participant>, StoreError> {
        self.gate().await?;
        self.inner.get(id).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Participant>, StoreError> {
        self.gate().await?;
        self.inner.find_by_token(token).await
    }

    async fn compare_and_set_status(
        &self,
        id: &ParticipantId,
        expected: AttendanceStatus,
        new: AttendanceStatus,
    ) -> Result<CasOutcome, StoreError> {
        self.gate().await?;
        self.inner.compare_and_set_status(id, expected, new).await
    }

    async fn compare_and_set_gift(&self, id: &ParticipantId) -> Result<CasOutcome, StoreError> {
        self.gate().await?;
        self.inner.compare_and_set_gift(id).await
    }

    async fn register(&self, new: NewParticipant) -> Result<Participant, RegisterError> {
        self.gate().await?;
        self.inner.register(new).await
    }

    async fn reissue_token(
        &self,
        id: &ParticipantId,
        token: QrToken,
    ) -> Result<Participant, RegisterError> {
        self.gate().await?;
        self.inner.reissue_token(id, token).await
    }

    async fn list(&self) -> Result<Vec<Participant>, StoreError> {
        self.gate().await?;
        self.inner.list().await
    }
}

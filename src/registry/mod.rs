//! Participant registry: the single source of truth for participant state.
//!
//! All status and gift mutations go through the compare-and-set primitives on
//! [`ParticipantStore`]. Each one is a single conditional write: the store checks
//! the currently stored value and applies the write in one atomic step, so two
//! desks scanning the same participant within the same millisecond can never
//! both commit.
//!
//! # Backends
//!
//! - [`MemoryStore`]: records behind a mutex. Used in tests and for ephemeral runs.
//! - [`JournaledStore`]: the same records, with every mutation appended (and
//!   fsynced) to a JSON Lines journal before it becomes visible. Replayed on open.

mod records;
mod store;

use std::future::Future;

use thiserror::Error;

use crate::persistence::EventLogError;
use crate::types::{AttendanceStatus, NewParticipant, Participant, ParticipantId, QrToken};

pub use store::{Journal, JournaledStore, MemoryStore, NoJournal, Registry};

/// Infrastructure and integrity failures of the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or could not persist a write.
    /// Safe to retry.
    #[error("participant store unavailable: {0}")]
    Unavailable(String),

    /// A write named a participant the store doesn't hold.
    #[error("unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// A compare-and-set asked to move status backwards or sideways.
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: AttendanceStatus,
        to: AttendanceStatus,
    },
}

impl From<EventLogError> for StoreError {
    fn from(e: EventLogError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Failures of the registration write path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("participant already registered: {0}")]
    DuplicateId(ParticipantId),

    /// Tokens are never reused across participants, even after regeneration.
    #[error("QR token already issued")]
    DuplicateToken(QrToken),

    #[error("unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied. Carries the record as it now stands.
    Committed(Participant),

    /// The stored value didn't match the expectation; nothing was written.
    /// Carries the record as it currently stands.
    Conflict(Participant),
}

impl CasOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CasOutcome::Committed(_))
    }

    pub fn participant(&self) -> &Participant {
        match self {
            CasOutcome::Committed(p) | CasOutcome::Conflict(p) => p,
        }
    }
}

/// A durable store of participant records with conditional writes.
///
/// Lookups return `Ok(None)` for unknown participants; `Err` is reserved for
/// infrastructure failures so callers can tell "not registered" from "ask again".
pub trait ParticipantStore: Send + Sync {
    /// Fetches a participant by id.
    fn get(
        &self,
        id: &ParticipantId,
    ) -> impl Future<Output = Result<Option<Participant>, StoreError>> + Send;

    /// Resolves an opaque token (current or previously issued) to its participant.
    fn find_by_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Option<Participant>, StoreError>> + Send;

    /// Sets `status` to `new` only if it currently equals `expected`.
    fn compare_and_set_status(
        &self,
        id: &ParticipantId,
        expected: AttendanceStatus,
        new: AttendanceStatus,
    ) -> impl Future<Output = Result<CasOutcome, StoreError>> + Send;

    /// Sets `gift_redeemed` only if it is currently false.
    fn compare_and_set_gift(
        &self,
        id: &ParticipantId,
    ) -> impl Future<Output = Result<CasOutcome, StoreError>> + Send;

    /// Adds a participant in the `registered` state.
    fn register(
        &self,
        new: NewParticipant,
    ) -> impl Future<Output = Result<Participant, RegisterError>> + Send;

    /// Installs a regenerated opaque token. Earlier tokens keep resolving.
    fn reissue_token(
        &self,
        id: &ParticipantId,
        token: QrToken,
    ) -> impl Future<Output = Result<Participant, RegisterError>> + Send;

    /// All participants, in registration order.
    fn list(&self) -> impl Future<Output = Result<Vec<Participant>, StoreError>> + Send;
}

//! Append-only scan audit log.
//!
//! Every scan attempt, whatever its outcome, becomes a [`ScanLogEntry`].
//! The log assigns each entry a monotonic `seq` on append. Entries are never
//! updated or removed.
//!
//! Two backends share one type:
//! - in memory, for tests and ephemeral runs
//! - a JSON Lines journal (`scans.log`), fsynced per entry and replayed on open
//!
//! Entries for committed scans are never dropped on a failed write; see
//! [`ScanLog::append_committed`].

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::persistence::{AuditEvent, EventLog, EventLogError};
use crate::types::{ParticipantId, PendingLogEntry, ScanLogEntry};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit journal error: {0}")]
    Journal(#[from] EventLogError),

    #[error("audit log lock poisoned")]
    Poisoned,
}

/// Durable destination for audit entries.
pub trait AuditSink: Send {
    /// Persists `entry`. An error leaves the log without it.
    fn record(&mut self, entry: &ScanLogEntry) -> Result<(), AuditError>;
}

impl AuditSink for EventLog<AuditEvent> {
    fn record(&mut self, entry: &ScanLogEntry) -> Result<(), AuditError> {
        self.append(AuditEvent::ScanRecorded {
            entry: entry.clone(),
        })?;
        Ok(())
    }
}

/// The scan audit log.
pub struct ScanLog {
    inner: Mutex<Inner>,
}

struct Inner {
    entries: Vec<ScanLogEntry>,
    sink: Option<Box<dyn AuditSink>>,
    next_seq: u64,
    /// Entries for committed scans whose write failed, oldest first.
    deferred: VecDeque<(PendingLogEntry, DateTime<Utc>)>,
}

impl Inner {
    fn new(entries: Vec<ScanLogEntry>, sink: Option<Box<dyn AuditSink>>) -> Self {
        let next_seq = entries.last().map_or(0, |e| e.seq + 1);
        Inner {
            entries,
            sink,
            next_seq,
            deferred: VecDeque::new(),
        }
    }

    fn write(
        &mut self,
        pending: PendingLogEntry,
        at: DateTime<Utc>,
    ) -> Result<ScanLogEntry, AuditError> {
        let entry = pending.into_entry(self.next_seq, at);
        if let Some(sink) = self.sink.as_mut() {
            sink.record(&entry)?;
        }
        self.next_seq += 1;
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Writes deferred entries ahead of anything new. Stops at the first failure.
    fn flush_deferred(&mut self) -> Result<(), AuditError> {
        while let Some((pending, at)) = self.deferred.front().cloned() {
            let entry = self.write(pending, at)?;
            self.deferred.pop_front();
            info!(
                seq = entry.seq,
                participant_id = ?entry.participant_id,
                "Deferred audit entry recorded"
            );
        }
        Ok(())
    }
}

impl ScanLog {
    /// An audit log that lives only in memory.
    pub fn in_memory() -> Self {
        ScanLog {
            inner: Mutex::new(Inner::new(Vec::new(), None)),
        }
    }

    /// An empty audit log that writes through `sink`.
    pub fn with_sink(sink: impl AuditSink + 'static) -> Self {
        ScanLog {
            inner: Mutex::new(Inner::new(Vec::new(), Some(Box::new(sink)))),
        }
    }

    /// Opens (or creates) a journaled audit log and loads its history.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let (journal, events) = EventLog::<AuditEvent>::open(path.as_ref())?;
        let entries: Vec<ScanLogEntry> = events
            .into_iter()
            .map(|event| match event.payload {
                AuditEvent::ScanRecorded { entry } => entry,
            })
            .collect();

        info!(
            path = %path.as_ref().display(),
            entries = entries.len(),
            "Audit log replayed"
        );

        Ok(ScanLog {
            inner: Mutex::new(Inner::new(entries, Some(Box::new(journal)))),
        })
    }

    /// Appends one entry and returns it with its assigned `seq` and timestamp.
    ///
    /// For the journaled backend the entry is on disk when this returns. A failed
    /// write leaves the log unchanged.
    pub fn append(&self, pending: PendingLogEntry) -> Result<ScanLogEntry, AuditError> {
        let mut inner = self.inner.lock().map_err(|_| AuditError::Poisoned)?;
        inner.flush_deferred()?;
        inner.write(pending, Utc::now())
    }

    /// Appends the entry for a scan whose registry change has already committed.
    ///
    /// The change can't be undone, so a failed write doesn't drop the entry: it is
    /// held in memory, keeping its timestamp, and written ahead of the next append.
    pub fn append_committed(&self, pending: PendingLogEntry) -> Result<ScanLogEntry, AuditError> {
        let mut inner = self.inner.lock().map_err(|_| AuditError::Poisoned)?;
        let at = Utc::now();
        let written = inner
            .flush_deferred()
            .and_then(|()| inner.write(pending.clone(), at));
        if written.is_err() {
            warn!(
                participant_id = ?pending.participant_id,
                deferred = inner.deferred.len() + 1,
                "Deferring audit entry for committed scan"
            );
            inner.deferred.push_back((pending, at));
        }
        written
    }

    /// Committed-scan entries still waiting to be written.
    pub fn deferred(&self) -> Result<usize, AuditError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| AuditError::Poisoned)?
            .deferred
            .len())
    }

    /// The most recent entries, newest first, optionally only for one participant.
    pub fn recent(
        &self,
        participant: Option<&ParticipantId>,
        limit: usize,
    ) -> Result<Vec<ScanLogEntry>, AuditError> {
        let inner = self.inner.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(inner
            .entries
            .iter()
            .rev()
            .filter(|e| participant.is_none_or(|id| e.participant_id.as_ref() == Some(id)))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Number of entries recorded against `participant`.
    pub fn count_for(&self, participant: &ParticipantId) -> Result<usize, AuditError> {
        let inner = self.inner.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(inner
            .entries
            .iter()
            .filter(|e| e.participant_id.as_ref() == Some(participant))
            .count())
    }

    /// Number of entries recorded.
    pub fn count(&self) -> Result<usize, AuditError> {
        Ok(self.inner.lock().map_err(|_| AuditError::Poisoned)?.entries.len())
    }
}

impl Default for ScanLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

//! Scan processor: the state machine behind every desk scan.
//!
//! A scan is `(raw_token, volunteer_id, purpose)`. Processing goes:
//!
//! 1. Decode the raw string. Strings that aren't structured tokens get one more
//!    chance as opaque registry tokens via `find_by_token`.
//! 2. Resolve the participant in the registry.
//! 3. Branch on purpose and attempt the matching compare-and-set.
//! 4. Append exactly one audit entry, then publish a change event if something
//!    was committed.
//!
//! Compare-and-sets run in their own task. If the registry doesn't answer within
//! the store timeout the desk is told to retry, but the write is not cancelled:
//! should it commit afterwards, that commit still gets its `success` entry and
//! its change event. Such a scan leaves two entries, `unavailable` then `success`.
//!
//! ```text
//!   registered ──check-in──▶ checked-in ──attendance──▶ scanned ──gift──▶ scanned+gift
//!        └──────────────────attendance──────────────────────▲
//! ```
//!
//! Losing a compare-and-set race is reported as a duplicate, never as an error.
//! Registry failures and timeouts are the only retryable outcome
//! ([`ScanOutcome::Unavailable`]); nothing here retries on its own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audit::{AuditError, ScanLog};
use crate::codec::{QrCodec, TokenError};
use crate::notify::ChangeNotifier;
use crate::registry::{CasOutcome, ParticipantStore, StoreError};
use crate::types::{
    AttendanceStatus, Participant, ParticipantId, PendingLogEntry, Purpose, ScanLogEntry,
    ScanOutcome, ScanRequest, ScanResponse, VolunteerId,
};

/// Default bound on a single registry call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

pub const MSG_NOT_RECOGNIZED: &str = "code not recognized";
pub const MSG_NOT_FOUND: &str = "participant not found";
pub const MSG_ALREADY_CHECKED_IN: &str = "already checked in, no action taken";
pub const MSG_ATTENDANCE_FIRST: &str = "must complete attendance scan first";
pub const MSG_GIFT_COLLECTED: &str = "gift already collected";
pub const MSG_GIFT_RELEASED: &str = "gift released";
pub const MSG_UNAVAILABLE: &str = "unknown — retry";

/// How a scan ended, before it is logged.
#[derive(Debug)]
struct Verdict {
    outcome: ScanOutcome,
    message: String,
    /// Participant the audit entry is recorded against.
    subject: Option<ParticipantId>,
    participant: Option<Participant>,
    committed: bool,
}

impl Verdict {
    fn unresolved(outcome: ScanOutcome, message: impl Into<String>) -> Self {
        Verdict {
            outcome,
            message: message.into(),
            subject: None,
            participant: None,
            committed: false,
        }
    }

    fn about(outcome: ScanOutcome, message: impl Into<String>, participant: Participant) -> Self {
        Verdict {
            outcome,
            message: message.into(),
            subject: Some(participant.id.clone()),
            participant: Some(participant),
            committed: false,
        }
    }

    fn committed(message: impl Into<String>, participant: Participant) -> Self {
        Verdict {
            committed: true,
            ..Verdict::about(ScanOutcome::Success, message, participant)
        }
    }

    fn unavailable(subject: Option<ParticipantId>) -> Self {
        Verdict {
            subject,
            ..Verdict::unresolved(ScanOutcome::Unavailable, MSG_UNAVAILABLE)
        }
    }

    /// Maps a store failure mid-scan onto an outcome.
    fn from_store_error(error: StoreError, subject: &ParticipantId) -> Self {
        match error {
            StoreError::UnknownParticipant(_) => {
                Verdict::unresolved(ScanOutcome::NotFound, MSG_NOT_FOUND)
            }
            StoreError::Unavailable(reason) => {
                warn!(participant_id = %subject, %reason, "Registry unavailable during scan");
                Verdict::unavailable(Some(subject.clone()))
            }
            StoreError::IllegalTransition { from, to } => {
                // The processor only ever asks to move forward from a freshly read status.
                warn!(participant_id = %subject, %from, %to, "Unexpected illegal transition");
                Verdict::unavailable(Some(subject.clone()))
            }
        }
    }
}

/// Processes scans against a participant store.
pub struct ScanProcessor<S> {
    codec: QrCodec,
    store: Arc<S>,
    audit: Arc<ScanLog>,
    notifier: ChangeNotifier,
    store_timeout: Duration,
}

impl<S> ScanProcessor<S> {
    pub fn new(
        codec: QrCodec,
        store: Arc<S>,
        audit: Arc<ScanLog>,
        notifier: ChangeNotifier,
    ) -> Self {
        ScanProcessor {
            codec,
            store,
            audit,
            notifier,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &QrCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn audit(&self) -> &Arc<ScanLog> {
        &self.audit
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

impl<S: ParticipantStore + 'static> ScanProcessor<S> {
    /// Entrance check-in: `registered -> checked-in`.
    pub async fn check_in(&self, raw_token: &str, volunteer: &VolunteerId) -> ScanResponse {
        self.scan(raw_token, volunteer, Purpose::CheckIn).await
    }

    /// Attendance scan: `registered | checked-in -> scanned`.
    pub async fn attendance(&self, raw_token: &str, volunteer: &VolunteerId) -> ScanResponse {
        self.scan(raw_token, volunteer, Purpose::Attendance).await
    }

    /// Gift redemption. Only for participants whose attendance has been scanned.
    pub async fn gift(&self, raw_token: &str, volunteer: &VolunteerId) -> ScanResponse {
        self.scan(raw_token, volunteer, Purpose::Gift).await
    }

    pub async fn process(&self, request: ScanRequest) -> ScanResponse {
        self.scan(&request.raw_token, &request.volunteer_id, request.purpose)
            .await
    }

    async fn scan(
        &self,
        raw_token: &str,
        volunteer: &VolunteerId,
        purpose: Purpose,
    ) -> ScanResponse {
        let recorded = match self.resolve(raw_token, purpose).await {
            Ok(participant) => match purpose {
                Purpose::CheckIn => self.apply_check_in(participant, volunteer).await,
                Purpose::Attendance => self.apply_attendance(participant, volunteer).await,
                Purpose::Gift => self.apply_gift(participant, volunteer).await,
            },
            Err(verdict) => self.record(volunteer, purpose, verdict),
        };
        respond(volunteer, purpose, recorded)
    }

    /// Turns the raw string into a registry record, or the verdict that ends the scan.
    async fn resolve(&self, raw_token: &str, purpose: Purpose) -> Result<Participant, Verdict> {
        let participant_id = match self.codec.decode(raw_token) {
            Ok(token) => {
                if token.purpose != purpose {
                    // Resolve first so the attempt is recorded against the participant.
                    let participant = self.lookup(&token.participant_id).await?;
                    return Err(Verdict::about(
                        ScanOutcome::InvalidToken,
                        format!("this is a {} code, not a {} code", token.purpose, purpose),
                        participant,
                    ));
                }
                token.participant_id
            }
            Err(TokenError::Unstructured) => {
                return match self.bounded(self.store.find_by_token(raw_token.trim())).await {
                    Ok(Some(participant)) => Ok(participant),
                    Ok(None) => Err(Verdict::unresolved(
                        ScanOutcome::InvalidToken,
                        MSG_NOT_RECOGNIZED,
                    )),
                    Err(e) => {
                        warn!(error = %e, "Registry unavailable during token lookup");
                        Err(Verdict::unavailable(None))
                    }
                };
            }
            Err(e) => {
                debug!(error = %e, "Rejected scan token");
                return Err(Verdict::unresolved(
                    ScanOutcome::InvalidToken,
                    MSG_NOT_RECOGNIZED,
                ));
            }
        };

        self.lookup(&participant_id).await
    }

    async fn lookup(&self, id: &ParticipantId) -> Result<Participant, Verdict> {
        match self.bounded(self.store.get(id)).await {
            Ok(Some(participant)) => Ok(participant),
            Ok(None) => Err(Verdict::unresolved(ScanOutcome::NotFound, MSG_NOT_FOUND)),
            Err(e) => Err(Verdict::from_store_error(e, id)),
        }
    }

    async fn apply_check_in(&self, participant: Participant, volunteer: &VolunteerId) -> Recorded {
        if participant.status != AttendanceStatus::Registered {
            let verdict =
                Verdict::about(ScanOutcome::Duplicate, MSG_ALREADY_CHECKED_IN, participant);
            return self.record(volunteer, Purpose::CheckIn, verdict);
        }
        let mutation = Mutation::Status {
            expected: AttendanceStatus::Registered,
            new: AttendanceStatus::CheckedIn,
        };
        self.settle(
            volunteer,
            Purpose::CheckIn,
            participant.id,
            mutation,
            |p| Verdict::committed(format!("checked in, welcome {}", p.name), p),
            |p| Verdict::about(ScanOutcome::Duplicate, MSG_ALREADY_CHECKED_IN, p),
        )
        .await
    }

    async fn apply_attendance(
        &self,
        participant: Participant,
        volunteer: &VolunteerId,
    ) -> Recorded {
        if participant.status == AttendanceStatus::Scanned {
            let verdict =
                Verdict::about(ScanOutcome::Duplicate, MSG_ALREADY_CHECKED_IN, participant);
            return self.record(volunteer, Purpose::Attendance, verdict);
        }
        let mutation = Mutation::Status {
            expected: participant.status,
            new: AttendanceStatus::Scanned,
        };
        self.settle(
            volunteer,
            Purpose::Attendance,
            participant.id,
            mutation,
            |p| Verdict::committed(format!("success, welcome {}", p.name), p),
            // Another desk got there first.
            |p| Verdict::about(ScanOutcome::Duplicate, MSG_ALREADY_CHECKED_IN, p),
        )
        .await
    }

    async fn apply_gift(&self, participant: Participant, volunteer: &VolunteerId) -> Recorded {
        if participant.status != AttendanceStatus::Scanned {
            let verdict =
                Verdict::about(ScanOutcome::RuleViolation, MSG_ATTENDANCE_FIRST, participant);
            return self.record(volunteer, Purpose::Gift, verdict);
        }
        if participant.gift_redeemed {
            let verdict = Verdict::about(ScanOutcome::Duplicate, MSG_GIFT_COLLECTED, participant);
            return self.record(volunteer, Purpose::Gift, verdict);
        }
        self.settle(
            volunteer,
            Purpose::Gift,
            participant.id,
            Mutation::Gift,
            |p| Verdict::committed(MSG_GIFT_RELEASED, p),
            |p| Verdict::about(ScanOutcome::Duplicate, MSG_GIFT_COLLECTED, p),
        )
        .await
    }

    /// Runs a compare-and-set in its own task and waits up to the store timeout.
    ///
    /// A commit is logged and published by the task itself, so a write that
    /// lands after the desk was told to retry still gets its success entry and
    /// its change event.
    async fn settle(
        &self,
        volunteer: &VolunteerId,
        purpose: Purpose,
        id: ParticipantId,
        mutation: Mutation,
        on_commit: fn(Participant) -> Verdict,
        on_conflict: fn(Participant) -> Verdict,
    ) -> Recorded {
        let task = tokio::spawn({
            let store = Arc::clone(&self.store);
            let audit = Arc::clone(&self.audit);
            let notifier = self.notifier.clone();
            let volunteer = volunteer.clone();
            let id = id.clone();
            async move {
                let outcome = match mutation {
                    Mutation::Status { expected, new } => {
                        store.compare_and_set_status(&id, expected, new).await
                    }
                    Mutation::Gift => store.compare_and_set_gift(&id).await,
                };
                match outcome {
                    Ok(CasOutcome::Committed(p)) => Settled::Recorded(record_verdict(
                        &audit,
                        &notifier,
                        &volunteer,
                        purpose,
                        on_commit(p),
                    )),
                    Ok(CasOutcome::Conflict(p)) => Settled::Open(on_conflict(p)),
                    Err(e) => Settled::Open(Verdict::from_store_error(e, &id)),
                }
            }
        });

        let settled = match tokio::time::timeout(self.store_timeout, task).await {
            Ok(Ok(settled)) => settled,
            Ok(Err(e)) => {
                warn!(participant_id = %id, error = %e, "Compare-and-set task failed");
                Settled::Open(Verdict::unavailable(Some(id)))
            }
            Err(_) => {
                warn!(
                    participant_id = %id,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "No answer from registry; the write may still land"
                );
                Settled::Open(Verdict::unavailable(Some(id)))
            }
        };

        match settled {
            Settled::Recorded(recorded) => recorded,
            Settled::Open(verdict) => self.record(volunteer, purpose, verdict),
        }
    }

    fn record(&self, volunteer: &VolunteerId, purpose: Purpose, verdict: Verdict) -> Recorded {
        record_verdict(&self.audit, &self.notifier, volunteer, purpose, verdict)
    }

    /// Bounds a registry read by the store timeout. A timeout is an unavailable store.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "no answer within {}ms",
                self.store_timeout.as_millis()
            ))),
        }
    }
}

/// The write a scan attempts once it has a participant.
#[derive(Debug, Clone, Copy)]
enum Mutation {
    Status {
        expected: AttendanceStatus,
        new: AttendanceStatus,
    },
    Gift,
}

/// A verdict and the result of writing its audit entry.
struct Recorded {
    verdict: Verdict,
    logged: Result<ScanLogEntry, AuditError>,
}

/// What a compare-and-set task hands back.
enum Settled {
    /// Committed, logged and published.
    Recorded(Recorded),
    /// Nothing committed; the caller still has to log it.
    Open(Verdict),
}

/// Writes the audit entry for `verdict` and publishes it if it committed.
fn record_verdict(
    audit: &ScanLog,
    notifier: &ChangeNotifier,
    volunteer: &VolunteerId,
    purpose: Purpose,
    verdict: Verdict,
) -> Recorded {
    let pending = PendingLogEntry {
        participant_id: verdict.subject.clone(),
        volunteer_id: volunteer.clone(),
        purpose,
        outcome: verdict.outcome.log_outcome(),
        message: verdict.message.clone(),
    };
    let logged = if verdict.committed {
        audit.append_committed(pending)
    } else {
        audit.append(pending)
    };

    if let (true, Some(participant)) = (verdict.committed, &verdict.participant) {
        info!(
            participant_id = %participant.id,
            volunteer_id = %volunteer,
            %purpose,
            status = %participant.status,
            gift_redeemed = participant.gift_redeemed,
            "Scan committed"
        );
        notifier.publish(participant);
    }

    Recorded { verdict, logged }
}

fn respond(volunteer: &VolunteerId, purpose: Purpose, recorded: Recorded) -> ScanResponse {
    let Recorded { verdict, logged } = recorded;
    match logged {
        Ok(entry) => {
            debug!(
                seq = entry.seq,
                participant_id = ?verdict.subject,
                volunteer_id = %volunteer,
                %purpose,
                outcome = ?verdict.outcome,
                "Scan recorded"
            );
            ScanResponse {
                outcome: verdict.outcome,
                message: verdict.message,
                participant: verdict.participant,
            }
        }
        Err(e) => {
            // The desk retries. A committed scan's entry is deferred by the log and
            // the retry lands in the duplicate branch.
            warn!(
                error = %e,
                participant_id = ?verdict.subject,
                outcome = ?verdict.outcome,
                "Failed to record scan"
            );
            ScanResponse {
                outcome: ScanOutcome::Unavailable,
                message: MSG_UNAVAILABLE.to_string(),
                participant: verdict.participant,
            }
        }
    }
}

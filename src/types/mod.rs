//! Core domain types for the scan desk.
//!
//! Identifiers, participant lifecycle state, and the scan/audit vocabulary shared by
//! every other module.

pub mod ids;
pub mod participant;
pub mod scan;

pub use ids::{ParticipantId, QrToken, VolunteerId};
pub use participant::{AttendanceStatus, NewParticipant, Participant, Purpose, UnknownPurpose};
pub use scan::{LogOutcome, PendingLogEntry, ScanLogEntry, ScanOutcome, ScanRequest, ScanResponse};

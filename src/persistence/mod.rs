//! Persistence layer for the scan desk.
//!
//! Crash-safe, append-only JSON Lines journals with replay. Two journals live in
//! the state directory:
//!
//! ```text
//! <state_dir>/
//!   participants.log   # registry mutations (RegistryEvent)
//!   scans.log          # scan audit trail (AuditEvent)
//! ```
//!
//! # Recovery
//!
//! On startup each journal is replayed from the beginning. A torn final line
//! (crash mid-write) or a sequence regression is truncated away, so the journal
//! always holds a valid prefix of what was acknowledged.
//!
//! # Crash Safety
//!
//! - Every registry mutation and every audit record is fsynced before the
//!   operation that produced it returns
//! - New journal files also fsync their directory

pub mod event;
pub mod fsync;
pub mod log;

pub use event::{AuditEvent, Event, JournalPayload, RegistryEvent};
pub use log::{EventLog, EventLogError};

/// File name of the registry journal inside the state directory.
pub const PARTICIPANTS_JOURNAL: &str = "participants.log";

/// File name of the audit journal inside the state directory.
pub const SCANS_JOURNAL: &str = "scans.log";

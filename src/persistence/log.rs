//! Append-only event log with crash-safe replay.
//!
//! The event log uses JSON Lines format: one JSON object per line.
//! This format is crash-safe because:
//! - Complete lines are always valid JSON
//! - Partial lines (from crash mid-write) are detected and truncated on replay
//!
//! Every append is followed by `sync_all()`: journals here only hold commit
//! points, and nothing is acknowledged before it is on disk.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::Path;

use thiserror::Error;

use super::event::{Event, JournalPayload};
use super::fsync::{sync_file, sync_parent_dir};

/// Errors that can occur during event log operations.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;

/// An append-only event log of `P` payloads.
///
/// The log tracks the next sequence number to assign.
pub struct EventLog<P> {
    file: File,
    next_seq: u64,
    _payload: PhantomData<fn(P)>,
}

impl<P: JournalPayload> EventLog<P> {
    /// Replays an existing log (truncating any torn tail) and opens it for append.
    ///
    /// Creates the file, and syncs its parent directory, if it doesn't exist yet.
    /// Returns the log together with the events that were already in it.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<Event<P>>)> {
        let path = path.as_ref();
        let existed = path.exists();
        let (events, next_seq) = Self::replay(path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        if !existed {
            sync_parent_dir(path)?;
        }

        let log = EventLog {
            file,
            next_seq,
            _payload: PhantomData,
        };
        Ok((log, events))
    }

    /// Appends an event to the log and fsyncs it.
    ///
    /// The event is assigned the next sequence number and the current timestamp.
    pub fn append(&mut self, payload: P) -> Result<Event<P>> {
        let event = Event::new(self.next_seq, payload);

        // One write call per line so a crash can only tear the final line.
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        sync_file(&self.file)?;

        self.next_seq += 1;
        Ok(event)
    }

    /// Returns the next sequence number that will be assigned.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Replays every event in the file, truncating any invalid tail.
    ///
    /// Returns `(events, next_seq)`. A missing or empty file yields `(vec![], 0)`.
    ///
    /// # Truncation
    ///
    /// If a line doesn't parse (crash mid-write) or breaks the sequence order,
    /// the file is truncated at the start of that line so the log always holds
    /// a valid prefix.
    pub fn replay(path: impl AsRef<Path>) -> Result<(Vec<Event<P>>, u64)> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok((vec![], 0));
        }

        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut events = Vec::new();
        let mut last_valid_pos = 0u64;
        let mut current_pos = 0u64;
        let mut max_seq: Option<u64> = None;

        loop {
            let mut line = String::new();
            let bytes_read = match reader.read_line(&mut line) {
                Ok(n) => n,
                // A torn multi-byte character is a partial line too.
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            };
            if bytes_read == 0 {
                break;
            }

            let line_start = current_pos;
            current_pos += bytes_read as u64;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                last_valid_pos = current_pos;
                continue;
            }

            // A line without its newline was never completely written.
            if !line.ends_with('\n') {
                last_valid_pos = line_start;
                break;
            }

            match serde_json::from_str::<Event<P>>(trimmed) {
                Ok(event) => {
                    if max_seq.is_some_and(|prev| event.seq <= prev) {
                        break;
                    }
                    max_seq = Some(event.seq);
                    events.push(event);
                    last_valid_pos = current_pos;
                }
                Err(_) => {
                    last_valid_pos = line_start;
                    break;
                }
            }
        }

        if last_valid_pos < file_len {
            tracing::warn!(
                path = %path.display(),
                kept_bytes = last_valid_pos,
                dropped_bytes = file_len - last_valid_pos,
                "Truncating invalid journal tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(last_valid_pos)?;
            sync_file(&file)?;
        }

        let next_seq = max_seq.map(|s| s + 1).unwrap_or(0);
        Ok((events, next_seq))
    }
}

//! Live attendance statistics, computed on demand from registry state.

use serde::{Deserialize, Serialize};

use crate::registry::{ParticipantStore, StoreError};
use crate::types::{AttendanceStatus, Participant};

/// Aggregate counts at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total: usize,
    pub registered: usize,
    pub checked_in: usize,
    pub scanned: usize,
    pub gifts_redeemed: usize,
    /// `scanned / total` as a percentage rounded to one decimal; 0 with no participants.
    pub scan_rate_percent: f64,
}

impl StatsSnapshot {
    pub fn from_participants<'a>(participants: impl IntoIterator<Item = &'a Participant>) -> Self {
        let mut snapshot = StatsSnapshot {
            total: 0,
            registered: 0,
            checked_in: 0,
            scanned: 0,
            gifts_redeemed: 0,
            scan_rate_percent: 0.0,
        };

        for p in participants {
            snapshot.total += 1;
            match p.status {
                AttendanceStatus::Registered => snapshot.registered += 1,
                AttendanceStatus::CheckedIn => snapshot.checked_in += 1,
                AttendanceStatus::Scanned => snapshot.scanned += 1,
            }
            if p.gift_redeemed {
                snapshot.gifts_redeemed += 1;
            }
        }

        snapshot.scan_rate_percent = scan_rate(snapshot.scanned, snapshot.total);
        snapshot
    }
}

fn scan_rate(scanned: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (scanned as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Reads the registry and aggregates it.
pub async fn snapshot<S: ParticipantStore>(store: &S) -> Result<StatsSnapshot, StoreError> {
    let participants = store.list().await?;
    Ok(StatsSnapshot::from_participants(&participants))
}

//! Liveness endpoint.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::registry::ParticipantStore;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// `ok`, or `degraded` while the audit log can't be written.
    pub status: String,
    /// Desks and dashboards currently connected to the change stream.
    pub subscribers: usize,
    /// Whether structured tokens must carry a valid signature.
    pub signed_tokens: bool,
    pub scans_recorded: usize,
    /// Committed scans whose audit entry is still waiting to be written.
    pub audit_backlog: usize,
}

/// Returns 200 with a small status document while the server is accepting requests.
pub async fn health_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
) -> Json<Health> {
    let processor = app.processor();
    let audit = processor.audit();
    let (scans_recorded, audit_backlog, readable) = match (audit.count(), audit.deferred()) {
        (Ok(recorded), Ok(backlog)) => (recorded, backlog, true),
        _ => (0, 0, false),
    };
    let status = if readable && audit_backlog == 0 {
        "ok"
    } else {
        "degraded"
    };

    Json(Health {
        status: status.to_string(),
        subscribers: processor.notifier().subscriber_count(),
        signed_tokens: processor.codec().is_signing(),
        scans_recorded,
        audit_backlog,
    })
}

//! Scan submission, statistics and audit endpoints.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::registry::ParticipantStore;
use crate::stats::{self, StatsSnapshot};
use crate::types::{ParticipantId, ScanLogEntry, ScanOutcome, ScanRequest, ScanResponse};

/// Default number of audit entries returned.
pub const DEFAULT_SCAN_LIMIT: usize = 50;

/// Upper bound on audit entries returned in one response.
pub const MAX_SCAN_LIMIT: usize = 500;

/// Processes one scan.
///
/// Every business outcome (including duplicates and rejections) is `200 OK`;
/// the outcome is in the body. `503` means the effect is unknown and the desk
/// should scan again.
///
/// ```ignore
/// POST /api/v1/scan HTTP/1.1
/// {"rawToken":"{\"type\":\"attendance\",\"userId\":\"p1\",\"timestamp\":1}","volunteerId":"vol-1","purpose":"attendance"}
///
/// HTTP/1.1 200 OK
/// {"outcome":"success","message":"success, welcome Asha","participant":{...}}
/// ```
pub async fn scan_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
    Json(request): Json<ScanRequest>,
) -> (StatusCode, Json<ScanResponse>) {
    let response = app.processor().process(request).await;
    let status = match response.outcome {
        ScanOutcome::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(response))
}

/// Live attendance statistics.
pub async fn stats_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
) -> Result<Json<StatsSnapshot>, ApiError> {
    let snapshot = stats::snapshot(app.processor().store().as_ref()).await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScansQuery {
    pub participant: Option<ParticipantId>,
    pub limit: Option<usize>,
}

/// Recent audit entries, newest first.
pub async fn scans_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
    Query(query): Query<ScansQuery>,
) -> Result<Json<Vec<ScanLogEntry>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SCAN_LIMIT)
        .min(MAX_SCAN_LIMIT);
    let entries = app
        .processor()
        .audit()
        .recent(query.participant.as_ref(), limit)?;
    Ok(Json(entries))
}

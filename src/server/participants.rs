//! Participant endpoints: the registration write path and live lists for desks.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::registry::ParticipantStore;
use crate::types::{NewParticipant, Participant, ParticipantId, Purpose};

/// Registers a participant. Called by the external registration system.
///
/// Returns `201 Created` with the stored record, `409 Conflict` if the id or
/// token is already taken.
pub async fn register_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
    Json(new): Json<NewParticipant>,
) -> Result<(StatusCode, Json<Participant>), ApiError> {
    let participant = app.processor().store().register(new).await?;
    app.processor().notifier().publish(&participant);
    Ok((StatusCode::CREATED, Json(participant)))
}

pub async fn list_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    Ok(Json(app.processor().store().list().await?))
}

pub async fn get_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
    Path(id): Path<ParticipantId>,
) -> Result<Json<Participant>, ApiError> {
    app.processor()
        .store()
        .get(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::ParticipantNotFound(id))
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub purpose: Option<Purpose>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub participant_id: ParticipantId,
    pub purpose: Purpose,
    /// The string to render into the QR image.
    pub token: String,
}

/// Issues a freshly timestamped token for a participant's QR page.
///
/// The page polls this every few seconds so that a screenshot of an old code is
/// quickly out of date. Purpose defaults to `attendance`.
pub async fn token_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
    Path(id): Path<ParticipantId>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<IssuedToken>, ApiError> {
    let processor = app.processor();
    let participant = processor
        .store()
        .get(&id)
        .await?
        .ok_or(ApiError::ParticipantNotFound(id))?;

    let purpose = query.purpose.unwrap_or(Purpose::Attendance);
    let token = processor.codec().issue(&participant.id, purpose);
    Ok(Json(IssuedToken {
        participant_id: participant.id,
        purpose,
        token,
    }))
}

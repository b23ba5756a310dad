//! Server-Sent Events stream of participant changes.
//!
//! Two event names are sent:
//! - `change`: a [`ChangeEvent`](crate::notify::ChangeEvent) as JSON
//! - `resync`: `{"missed": n}`; the client fell behind and should re-fetch
//!   `/api/v1/participants`
//!
//! On a resync the stream re-reads the registry itself, so events older than
//! what the client is about to fetch are not sent afterwards.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt, stream};
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::notify::Notification;
use crate::registry::ParticipantStore;

pub async fn events_handler<S: ParticipantStore + 'static>(
    State(app): State<AppState<S>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = app.processor().notifier().subscribe();
    let shutdown = app.shutdown().clone();

    let events = stream::unfold((subscription, app), |(mut subscription, app)| async move {
        let notification = subscription.next().await?;
        if let Notification::Resync { .. } = notification {
            match app.processor().store().list().await {
                Ok(participants) => subscription.observe(&participants),
                Err(e) => warn!(error = %e, "Could not re-read participants for resync"),
            }
        }
        Some((Ok(to_sse(&notification)), (subscription, app)))
    })
    .take_until(shutdown.cancelled_owned());

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(notification: &Notification) -> Event {
    match notification {
        Notification::Change(change) => Event::default()
            .event("change")
            .id(change.seq.to_string())
            .data(serde_json::to_string(change).unwrap_or_default()),
        Notification::Resync { missed } => Event::default()
            .event("resync")
            .data(json!({ "missed": missed }).to_string()),
    }
}

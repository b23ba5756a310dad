//! HTTP server for the scan desk.
//!
//! # Endpoints
//!
//! - `POST /api/v1/scan` - Processes one scan (200 for every business outcome, 503 if unknown)
//! - `GET /api/v1/stats` - Live attendance statistics
//! - `GET /api/v1/events` - Server-Sent Events stream of participant changes
//! - `POST /api/v1/participants` - Registers a participant (registration system only)
//! - `GET /api/v1/participants` - All participants, in registration order
//! - `GET /api/v1/participants/{id}` - One participant
//! - `GET /api/v1/participants/{id}/token?purpose=` - Fresh QR token for the participant page
//! - `GET /api/v1/scans?participant=&limit=` - Recent audit entries, newest first
//! - `GET /health` - Returns 200 if the server is running
//!
//! Volunteer identity is established upstream; the `volunteerId` in a scan
//! request is taken as given.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::registry::ParticipantStore;
use crate::scan::ScanProcessor;

pub mod error;
pub mod events;
pub mod health;
pub mod participants;
pub mod scan;

pub use error::ApiError;
pub use events::events_handler;
pub use health::health_handler;
pub use participants::{get_handler, list_handler, register_handler, token_handler};
pub use scan::{scan_handler, scans_handler, stats_handler};

/// Shared application state.
///
/// Passed to all handlers via axum's `State` extractor.
pub struct AppState<S> {
    inner: Arc<AppStateInner<S>>,
}

struct AppStateInner<S> {
    processor: Arc<ScanProcessor<S>>,

    /// Cancelled on shutdown; ends long-lived event streams so the server can drain.
    shutdown: CancellationToken,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ParticipantStore> AppState<S> {
    pub fn new(processor: Arc<ScanProcessor<S>>, shutdown: CancellationToken) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                processor,
                shutdown,
            }),
        }
    }

    pub fn processor(&self) -> &Arc<ScanProcessor<S>> {
        &self.inner.processor
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.inner.shutdown
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<S: ParticipantStore + 'static>(app_state: AppState<S>) -> Router {
    Router::new()
        .route("/api/v1/scan", post(scan_handler::<S>))
        .route("/api/v1/stats", get(stats_handler::<S>))
        .route("/api/v1/events", get(events_handler::<S>))
        .route(
            "/api/v1/participants",
            post(register_handler::<S>).get(list_handler::<S>),
        )
        .route("/api/v1/participants/{id}", get(get_handler::<S>))
        .route("/api/v1/participants/{id}/token", get(token_handler::<S>))
        .route("/api/v1/scans", get(scans_handler::<S>))
        .route("/health", get(health_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Serves `router` until `shutdown` is cancelled, then drains open connections.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

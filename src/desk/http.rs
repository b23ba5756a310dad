//! Transport for a desk on its own device, talking to the scan service over HTTP.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use super::client::ScanTransport;
use crate::types::{ScanRequest, ScanResponse};

/// Default bound on one scan round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on establishing the connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum HttpTransportError {
    #[error("cannot connect to {0}")]
    Connection(String),

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Anything other than `200` or `503` from the scan endpoint.
    #[error("unexpected status {0}")]
    Status(StatusCode),
}

/// Submits scans to `POST {base_url}/api/v1/scan`.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self, HttpTransportError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, HttpTransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .build()?;

        Ok(HttpTransport {
            client,
            endpoint: format!("{}/api/v1/scan", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, error: reqwest::Error) -> HttpTransportError {
        if error.is_connect() {
            HttpTransportError::Connection(self.endpoint.clone())
        } else if error.is_timeout() {
            HttpTransportError::Timeout(self.timeout)
        } else {
            HttpTransportError::Http(error)
        }
    }
}

impl ScanTransport for HttpTransport {
    type Error = HttpTransportError;

    /// `200` carries every business outcome and `503` an unavailable registry;
    /// both bodies are a [`ScanResponse`].
    async fn submit(&self, request: ScanRequest) -> Result<ScanResponse, Self::Error> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::SERVICE_UNAVAILABLE {
            return Err(HttpTransportError::Status(status));
        }

        let body: ScanResponse = response.json().await.map_err(|e| self.classify(e))?;
        debug!(%status, outcome = ?body.outcome, "Scan service answered");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    use crate::audit::ScanLog;
    use crate::codec::QrCodec;
    use crate::desk::{DeskClient, Frame, PayloadDecoder, Tone};
    use crate::notify::ChangeNotifier;
    use crate::registry::ParticipantStore;
    use crate::scan::{MSG_UNAVAILABLE, ScanProcessor};
    use crate::server::{self, AppState};
    use crate::test_utils::{FlakyStore, StoreFault, seed_participants};
    use crate::types::{ParticipantId, Purpose, ScanOutcome, VolunteerId};

    /// Serves the full router on an ephemeral port.
    async fn spawn_service<S: ParticipantStore + 'static>(
        store: Arc<S>,
    ) -> (SocketAddr, QrCodec, CancellationToken) {
        let codec = QrCodec::new();
        let processor = ScanProcessor::new(
            codec.clone(),
            store,
            Arc::new(ScanLog::in_memory()),
            ChangeNotifier::default(),
        )
        .with_store_timeout(Duration::from_millis(100));
        let shutdown = CancellationToken::new();
        let router = server::build_router(AppState::new(Arc::new(processor), shutdown.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener, router, shutdown.clone()));
        (addr, codec, shutdown)
    }

    fn request(codec: &QrCodec, id: &str, purpose: Purpose) -> ScanRequest {
        ScanRequest {
            raw_token: codec.issue(&ParticipantId::new(id), purpose),
            volunteer_id: VolunteerId::new("vol-remote"),
            purpose,
        }
    }

    #[tokio::test]
    async fn submits_scans_over_http() {
        let store = Arc::new(FlakyStore::new());
        seed_participants(store.as_ref(), 1).await;
        let (addr, codec, shutdown) = spawn_service(store).await;
        let transport = HttpTransport::new(&format!("http://{addr}/")).unwrap();
        assert_eq!(transport.endpoint(), format!("http://{addr}/api/v1/scan"));

        let first = transport
            .submit(request(&codec, "p0", Purpose::Attendance))
            .await
            .unwrap();
        assert_eq!(first.outcome, ScanOutcome::Success);
        assert_eq!(first.participant.unwrap().name, "Participant 0");

        let second = transport
            .submit(request(&codec, "p0", Purpose::Attendance))
            .await
            .unwrap();
        assert_eq!(second.outcome, ScanOutcome::Duplicate);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn service_unavailable_decodes_as_a_response() {
        let store = Arc::new(FlakyStore::new());
        seed_participants(store.as_ref(), 1).await;
        store.set_fault(StoreFault::Fail);
        let (addr, codec, shutdown) = spawn_service(store).await;
        let transport = HttpTransport::new(&format!("http://{addr}")).unwrap();

        let response = transport
            .submit(request(&codec, "p0", Purpose::Attendance))
            .await
            .unwrap();
        assert_eq!(response.outcome, ScanOutcome::Unavailable);
        assert_eq!(response.message, MSG_UNAVAILABLE);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn unreachable_service_renders_a_retry() {
        // Bind then drop to get a port nothing listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let transport =
            HttpTransport::with_timeout(&format!("http://{addr}"), Duration::from_millis(500))
                .unwrap();

        let err = transport
            .submit(request(&QrCodec::new(), "p0", Purpose::Attendance))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpTransportError::Connection(_)), "{err:?}");

        let mut desk = DeskClient::new(
            PayloadDecoder,
            transport,
            VolunteerId::new("vol-remote"),
            Purpose::Attendance,
        );
        let shown = desk
            .on_frame(&Frame::Text("qr-anything".to_string()))
            .await
            .unwrap();
        assert_eq!(shown.tone, Tone::Retry);
        assert!(shown.detail.contains("cannot connect"));
    }
}

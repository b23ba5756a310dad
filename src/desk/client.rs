//! The desk-side scan loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::display::DeskDisplay;
use super::frame::{Frame, FrameDecoder};
use crate::registry::ParticipantStore;
use crate::scan::ScanProcessor;
use crate::types::{Purpose, ScanRequest, ScanResponse, VolunteerId};

/// Default window in which a repeated read of the same code is ignored.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

/// Delivers scan requests to the scan processor.
pub trait ScanTransport {
    /// The error type returned when a request cannot be delivered.
    type Error: std::fmt::Display;

    fn submit(
        &self,
        request: ScanRequest,
    ) -> impl Future<Output = Result<ScanResponse, Self::Error>> + Send;
}

/// Transport for a desk running in the same process as the processor.
pub struct LocalTransport<S> {
    processor: Arc<ScanProcessor<S>>,
}

impl<S> LocalTransport<S> {
    pub fn new(processor: Arc<ScanProcessor<S>>) -> Self {
        LocalTransport { processor }
    }
}

impl<S: ParticipantStore + 'static> ScanTransport for LocalTransport<S> {
    type Error = std::convert::Infallible;

    async fn submit(&self, request: ScanRequest) -> Result<ScanResponse, Self::Error> {
        Ok(self.processor.process(request).await)
    }
}

/// One volunteer's scanning station.
///
/// Cameras report the same code many times a second while it is in view, so a
/// payload identical to the last one submitted is ignored until the cooldown has
/// passed. Retry results clear the cooldown so the next read goes straight through.
pub struct DeskClient<D, T> {
    decoder: D,
    transport: T,
    volunteer: VolunteerId,
    purpose: Purpose,
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl<D: FrameDecoder, T: ScanTransport> DeskClient<D, T> {
    pub fn new(decoder: D, transport: T, volunteer: VolunteerId, purpose: Purpose) -> Self {
        DeskClient {
            decoder,
            transport,
            volunteer,
            purpose,
            cooldown: DEFAULT_COOLDOWN,
            last: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// Switches the desk between check-in, attendance and gift scanning.
    pub fn set_purpose(&mut self, purpose: Purpose) {
        self.purpose = purpose;
        self.last = None;
    }

    /// Handles one camera frame. Returns `None` if nothing was submitted.
    pub async fn on_frame(&mut self, frame: &Frame) -> Option<DeskDisplay> {
        let payload = self.decoder.decode(frame)?;

        let now = Instant::now();
        if let Some((previous, at)) = &self.last {
            if *previous == payload && now.duration_since(*at) < self.cooldown {
                return None;
            }
        }
        self.last = Some((payload.clone(), now));

        let request = ScanRequest {
            raw_token: payload,
            volunteer_id: self.volunteer.clone(),
            purpose: self.purpose,
        };
        let display = match self.transport.submit(request).await {
            Ok(response) => {
                debug!(
                    volunteer_id = %self.volunteer,
                    outcome = ?response.outcome,
                    "Desk scan answered"
                );
                DeskDisplay::from_response(&response)
            }
            Err(e) => {
                warn!(volunteer_id = %self.volunteer, error = %e, "Desk scan not delivered");
                DeskDisplay::unreachable(e)
            }
        };

        if display.is_retry() {
            self.last = None;
        }
        Some(display)
    }
}

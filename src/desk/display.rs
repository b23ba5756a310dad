//! What a volunteer sees after a scan.

use serde::Serialize;

use crate::types::{ScanOutcome, ScanResponse};

/// Colour/sound class of a scan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tone {
    /// Green: let them through / hand over the gift.
    Positive,
    /// Amber: nothing changed, but nothing is wrong either.
    Notice,
    /// Red: turn them away or send them elsewhere.
    Negative,
    /// Blue: the result is unknown, scan again.
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskDisplay {
    pub tone: Tone,
    pub headline: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
}

impl DeskDisplay {
    pub fn from_response(response: &ScanResponse) -> Self {
        let (tone, headline) = match response.outcome {
            ScanOutcome::Success => (Tone::Positive, "Done"),
            ScanOutcome::Duplicate => (Tone::Notice, "Already done"),
            ScanOutcome::NotFound => (Tone::Negative, "Not registered"),
            ScanOutcome::InvalidToken => (Tone::Negative, "Code not recognized"),
            ScanOutcome::RuleViolation => (Tone::Negative, "Not yet"),
            ScanOutcome::Unavailable => (Tone::Retry, "Scan again"),
        };
        DeskDisplay {
            tone,
            headline: headline.to_string(),
            detail: response.message.clone(),
            participant_name: response.participant.as_ref().map(|p| p.name.clone()),
        }
    }

    /// The scan never reached the service.
    pub fn unreachable(reason: impl std::fmt::Display) -> Self {
        DeskDisplay {
            tone: Tone::Retry,
            headline: "Scan again".to_string(),
            detail: format!("scan service unreachable: {reason}"),
            participant_name: None,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.tone == Tone::Retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(outcome: ScanOutcome, message: &str) -> ScanResponse {
        ScanResponse {
            outcome,
            message: message.to_string(),
            participant: None,
        }
    }

    #[test]
    fn outcomes_map_to_tones() {
        let cases = [
            (ScanOutcome::Success, Tone::Positive),
            (ScanOutcome::Duplicate, Tone::Notice),
            (ScanOutcome::NotFound, Tone::Negative),
            (ScanOutcome::InvalidToken, Tone::Negative),
            (ScanOutcome::RuleViolation, Tone::Negative),
            (ScanOutcome::Unavailable, Tone::Retry),
        ];
        for (outcome, tone) in cases {
            assert_eq!(DeskDisplay::from_response(&response(outcome, "m")).tone, tone);
        }
    }

    #[test]
    fn detail_carries_the_service_message() {
        let display = DeskDisplay::from_response(&response(
            ScanOutcome::RuleViolation,
            "must complete attendance scan first",
        ));
        assert_eq!(display.detail, "must complete attendance scan first");
        assert!(!display.is_retry());
        assert!(DeskDisplay::unreachable("connection refused").is_retry());
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use nightingale_core::{DetectionEvent, DetectionSource, Severity};
use serde::Serialize;
use tracing::{debug, error};

/// Hard cap on one delivery attempt. No retries behind it.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Body for `POST {base}/alert`, carrying voice-triggered alerts.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub subject: String,
    /// Uppercased alert type, e.g. `DISTRESS`.
    pub event: String,
    pub source: DetectionSource,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub confidence: f64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Body for `POST {base}/motion-detection`, carrying vision-triggered alerts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionPayload {
    pub subject: String,
    /// Snake_case alert type, e.g. `bed_exit`.
    pub detection_type: String,
    pub confidence: f64,
    pub description: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub ok: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl DispatchResult {
    fn delivered(status: u16) -> Self {
        DispatchResult {
            ok: true,
            status: Some(status),
            error: None,
        }
    }

    fn rejected(status: u16) -> Self {
        DispatchResult {
            ok: false,
            status: Some(status),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        DispatchResult {
            ok: false,
            status: None,
            error: Some(error),
        }
    }
}

/// Posts alerts to the notification backend. Delivery is at-most-once: one
/// POST with a fixed timeout, non-2xx logged and dropped.
#[derive(Clone)]
pub struct AlertDispatcher {
    client: reqwest::Client,
    base_url: String,
}

impl AlertDispatcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        AlertDispatcher {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one alert and reports the outcome. Never retries; the caller
    /// decides what a failure means.
    pub async fn dispatch(&self, event: &DetectionEvent) -> DispatchResult {
        let url = format!("{}{}", self.base_url, Self::route_for(event.source));
        let request = match event.source {
            DetectionSource::Voice => self.client.post(&url).json(&self.alert_payload(event)),
            DetectionSource::Vision => self.client.post(&url).json(&self.motion_payload(event)),
        };
        match request.timeout(DISPATCH_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    "delivered {} alert for {} to {}",
                    event.alert_type, event.subject, url
                );
                DispatchResult::delivered(response.status().as_u16())
            }
            Ok(response) => {
                let status = response.status();
                error!(
                    "alert sink rejected {} alert for {}: status {}",
                    event.alert_type, event.subject, status
                );
                DispatchResult::rejected(status.as_u16())
            }
            Err(e) => {
                error!(
                    "failed to deliver {} alert for {}: {}",
                    event.alert_type, event.subject, e
                );
                DispatchResult::failed(e.to_string())
            }
        }
    }

    /// Spawns the delivery and returns immediately. The task logs its own
    /// outcome; the caller gets fire-and-forget, at-most-once semantics.
    pub fn dispatch_detached(&self, event: DetectionEvent) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(&event).await;
        });
    }

    fn route_for(source: DetectionSource) -> &'static str {
        match source {
            DetectionSource::Voice => "/alert",
            DetectionSource::Vision => "/motion-detection",
        }
    }

    fn alert_payload(&self, event: &DetectionEvent) -> AlertPayload {
        AlertPayload {
            subject: event.subject.to_string(),
            event: event.alert_type.event_label(),
            source: event.source,
            severity: event.severity,
            transcript: event.transcript.clone(),
            confidence: event.confidence,
            description: event.description.clone(),
            timestamp: Utc::now(),
        }
    }

    fn motion_payload(&self, event: &DetectionEvent) -> MotionPayload {
        MotionPayload {
            subject: event.subject.to_string(),
            detection_type: event.alert_type.as_str().to_string(),
            confidence: event.confidence,
            description: event.description.clone(),
            severity: event.severity,
            timestamp: Utc::now(),
        }
    }
}

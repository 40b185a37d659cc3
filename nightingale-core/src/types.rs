use std::fmt;

use serde::{Deserialize, Serialize};

/// Confidence attached to keyword-triggered voice detections. The transcript
/// is already the transport's best hypothesis, so a keyword hit is treated as
/// near-certain.
pub const VOICE_CONFIDENCE: f64 = 0.95;

/// Identifier of the monitored entity, typically a room or patient id.
/// Assigned when a session starts and never changes for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Subject(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Subject {
    fn from(id: &str) -> Self {
        Subject(id.to_string())
    }
}

impl From<String> for Subject {
    fn from(id: String) -> Self {
        Subject(id)
    }
}

/// Situations the assistant can raise an alert for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Distress,
    Fall,
    Choking,
    BedExit,
    Wandering,
    Inactivity,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Distress => "distress",
            AlertType::Fall => "fall",
            AlertType::Choking => "choking",
            AlertType::BedExit => "bed_exit",
            AlertType::Wandering => "wandering",
            AlertType::Inactivity => "inactivity",
        }
    }

    /// Uppercased form used for the `event` field of outbound alerts.
    pub fn event_label(&self) -> String {
        self.as_str().to_uppercase()
    }

    /// Maps a label from a vision payload to an alert type. Returns `None`
    /// for anything unrecognized, including the analyzer's own `none`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_lowercase().as_str() {
            "distress" => Some(AlertType::Distress),
            "fall" => Some(AlertType::Fall),
            "choking" => Some(AlertType::Choking),
            "bed_exit" => Some(AlertType::BedExit),
            "wandering" => Some(AlertType::Wandering),
            "inactivity" => Some(AlertType::Inactivity),
            _ => None,
        }
    }

    /// Fallback description when the analyzer supplies no explanation.
    pub fn default_description(&self) -> &'static str {
        match self {
            AlertType::Distress => "verbal or visible distress detected",
            AlertType::Fall => "patient appears to have fallen, immediate check required",
            AlertType::Choking => "possible choking observed, immediate check required",
            AlertType::BedExit => "patient left bed without assistance",
            AlertType::Wandering => "patient wandering outside designated safe area",
            AlertType::Inactivity => "no significant movement for an extended period",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AlertType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertType::from_label(s).ok_or_else(|| anyhow::anyhow!("unknown alert type: {}", s))
    }
}

/// How urgently staff should react. Derived from the alert type in exactly
/// one place so the voice and vision paths can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
}

impl Severity {
    pub fn for_alert(alert_type: AlertType) -> Self {
        match alert_type {
            AlertType::Fall | AlertType::Choking => Severity::Critical,
            _ => Severity::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which sensing path produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Voice,
    Vision,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::Voice => "voice",
            DetectionSource::Vision => "vision",
        }
    }
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw signal that crossed its acceptance threshold. Flows one way through
/// the decision layer: matcher or normalizer, then deduplicator, then
/// dispatcher. Never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEvent {
    pub subject: Subject,
    pub alert_type: AlertType,
    pub confidence: f64,
    pub source: DetectionSource,
    pub severity: Severity,
    pub description: String,
    pub transcript: Option<String>,
}

impl DetectionEvent {
    /// Event for a keyword hit in a transcribed utterance.
    pub fn voice(
        subject: Subject,
        alert_type: AlertType,
        description: String,
        transcript: String,
    ) -> Self {
        DetectionEvent {
            severity: Severity::for_alert(alert_type),
            subject,
            alert_type,
            confidence: VOICE_CONFIDENCE,
            source: DetectionSource::Voice,
            description,
            transcript: Some(transcript),
        }
    }

    /// Event for a vision detection that cleared its threshold.
    pub fn vision(
        subject: Subject,
        alert_type: AlertType,
        confidence: f64,
        description: String,
    ) -> Self {
        DetectionEvent {
            severity: Severity::for_alert(alert_type),
            subject,
            alert_type,
            confidence,
            source: DetectionSource::Vision,
            description,
            transcript: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_critical_only_for_fall_and_choking() {
        assert_eq!(Severity::for_alert(AlertType::Fall), Severity::Critical);
        assert_eq!(Severity::for_alert(AlertType::Choking), Severity::Critical);
        assert_eq!(Severity::for_alert(AlertType::Distress), Severity::High);
        assert_eq!(Severity::for_alert(AlertType::BedExit), Severity::High);
        assert_eq!(Severity::for_alert(AlertType::Wandering), Severity::High);
        assert_eq!(Severity::for_alert(AlertType::Inactivity), Severity::High);
    }

    #[test]
    fn alert_types_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&AlertType::BedExit).unwrap(),
            "\"bed_exit\""
        );
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&DetectionSource::Vision).unwrap(),
            "\"vision\""
        );
    }

    #[test]
    fn event_label_is_uppercased() {
        assert_eq!(AlertType::Fall.event_label(), "FALL");
        assert_eq!(AlertType::BedExit.event_label(), "BED_EXIT");
    }

    #[test]
    fn labels_round_trip_case_insensitively() {
        assert_eq!(AlertType::from_label("Fall"), Some(AlertType::Fall));
        assert_eq!(AlertType::from_label("BED_EXIT"), Some(AlertType::BedExit));
        assert_eq!(AlertType::from_label("none"), None);
        assert_eq!(AlertType::from_label("smoke"), None);
    }

    #[test]
    fn voice_events_carry_the_fixed_confidence() {
        let event = DetectionEvent::voice(
            Subject::new("room-2"),
            AlertType::Distress,
            "distress keyword \"help\" detected in speech".to_string(),
            "help me".to_string(),
        );
        assert_eq!(event.confidence, VOICE_CONFIDENCE);
        assert_eq!(event.source, DetectionSource::Voice);
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.transcript.as_deref(), Some("help me"));
    }
}

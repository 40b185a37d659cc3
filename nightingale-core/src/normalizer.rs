use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::types::{AlertType, DetectionEvent, Subject};

/// Detections below this confidence are discarded before per-type thresholds
/// are even consulted.
pub const CONFIDENCE_FLOOR: f64 = 0.5;

/// Fallback for alert types without an explicit threshold entry.
const DEFAULT_THRESHOLD: f64 = 0.85;

const DEFAULT_THRESHOLDS: &[(AlertType, f64)] = &[
    (AlertType::Fall, 0.80),
    (AlertType::Choking, 0.80),
    (AlertType::BedExit, 0.85),
    (AlertType::Wandering, 0.85),
    (AlertType::Inactivity, 0.85),
    (AlertType::Distress, 0.90),
];

/// Confidence each alert type must reach before a vision detection becomes
/// an event. A detection at exactly the threshold is accepted.
#[derive(Debug, Clone)]
pub struct ConfidenceThresholds {
    thresholds: HashMap<AlertType, f64>,
}

impl ConfidenceThresholds {
    pub fn threshold(&self, alert_type: AlertType) -> f64 {
        self.thresholds
            .get(&alert_type)
            .copied()
            .unwrap_or(DEFAULT_THRESHOLD)
    }

    pub fn set(&mut self, alert_type: AlertType, threshold: f64) {
        self.thresholds.insert(alert_type, threshold);
    }

    /// Applies an override in `type=threshold` form, e.g. `fall=0.8`.
    pub fn apply_override(&mut self, spec: &str) -> anyhow::Result<()> {
        let (name, value) = spec
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected type=threshold, got {:?}", spec))?;
        let alert_type: AlertType = name.trim().parse()?;
        let threshold: f64 = value.trim().parse()?;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!(
                "threshold for {} must be within [0, 1], got {}",
                alert_type,
                threshold
            );
        }
        self.set(alert_type, threshold);
        Ok(())
    }
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        ConfidenceThresholds {
            thresholds: DEFAULT_THRESHOLDS.iter().copied().collect(),
        }
    }
}

/// Confidence as the third-party analyzer reports it: a bare number, an
/// object with optional `confidence` and `explanation` fields, or something
/// else entirely. Anything without a usable number counts as no detection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawConfidence {
    Score(f64),
    Detailed {
        #[serde(default)]
        confidence: Option<f64>,
        #[serde(default)]
        explanation: Option<String>,
    },
    Other(serde_json::Value),
}

impl RawConfidence {
    pub fn confidence(&self) -> Option<f64> {
        match self {
            RawConfidence::Score(c) => Some(*c),
            RawConfidence::Detailed { confidence, .. } => *confidence,
            RawConfidence::Other(_) => None,
        }
    }

    pub fn explanation(&self) -> Option<&str> {
        match self {
            RawConfidence::Detailed { explanation, .. } => explanation.as_deref(),
            _ => None,
        }
    }
}

/// One analyzer response: `(label, confidence)` pairs in the order the
/// payload listed them. A plain JSON map would lose that ordering, so this
/// deserializes through a map visitor into a `Vec`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetections {
    entries: Vec<(String, RawConfidence)>,
}

impl RawDetections {
    pub fn push(&mut self, label: impl Into<String>, raw: RawConfidence) {
        self.entries.push((label.into(), raw));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, RawConfidence)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, RawConfidence)> for RawDetections {
    fn from_iter<I: IntoIterator<Item = (String, RawConfidence)>>(iter: I) -> Self {
        RawDetections {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'de> Deserialize<'de> for RawDetections {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DetectionsVisitor;

        impl<'de> Visitor<'de> for DetectionsVisitor {
            type Value = RawDetections;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of detection labels to confidences")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((label, raw)) = access.next_entry::<String, RawConfidence>()? {
                    entries.push((label, raw));
                }
                Ok(RawDetections { entries })
            }
        }

        deserializer.deserialize_map(DetectionsVisitor)
    }
}

/// Turns a raw analyzer payload into zero or more detection events. All
/// duck-typing stops here; everything downstream is strongly typed.
#[derive(Debug, Clone, Default)]
pub struct VisionNormalizer {
    thresholds: ConfidenceThresholds,
}

impl VisionNormalizer {
    pub fn new(thresholds: ConfidenceThresholds) -> Self {
        VisionNormalizer { thresholds }
    }

    /// Walks the payload in order and keeps every detection that has a
    /// usable confidence at or above the floor, a known label, and a
    /// confidence at or above its per-type threshold. Dropping a detection
    /// is a no-alert decision, not an error.
    pub fn normalize(&self, subject: &Subject, raw: &RawDetections) -> Vec<DetectionEvent> {
        let mut events = Vec::new();
        for (label, raw_confidence) in raw.iter() {
            let confidence = match raw_confidence.confidence() {
                Some(c) => c,
                None => continue,
            };
            if confidence < CONFIDENCE_FLOOR {
                continue;
            }
            let alert_type = match AlertType::from_label(label) {
                Some(t) => t,
                None => {
                    debug!("skipping unknown detection type {:?}", label);
                    continue;
                }
            };
            let threshold = self.thresholds.threshold(alert_type);
            if confidence < threshold {
                debug!(
                    "dropping {} at {:.2}, below threshold {:.2}",
                    alert_type, confidence, threshold
                );
                continue;
            }
            let description = match raw_confidence.explanation() {
                Some(explanation) => explanation.to_string(),
                None => alert_type.default_description().to_string(),
            };
            events.push(DetectionEvent::vision(
                subject.clone(),
                alert_type,
                confidence,
                description,
            ));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectionSource, Severity};

    fn subject() -> Subject {
        Subject::new("room-12")
    }

    fn detections(entries: &[(&str, RawConfidence)]) -> RawDetections {
        entries
            .iter()
            .map(|(label, raw)| (label.to_string(), raw.clone()))
            .collect()
    }

    #[test]
    fn high_confidence_fall_is_kept_and_low_inactivity_dropped() {
        let normalizer = VisionNormalizer::default();
        let raw = detections(&[
            ("fall", RawConfidence::Score(0.92)),
            ("inactivity", RawConfidence::Score(0.40)),
        ]);

        let events = normalizer.normalize(&subject(), &raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].alert_type, AlertType::Fall);
        assert_eq!(events[0].severity, Severity::Critical);
        assert_eq!(events[0].source, DetectionSource::Vision);
        assert_eq!(events[0].confidence, 0.92);
    }

    #[test]
    fn confidence_exactly_at_threshold_is_accepted() {
        let normalizer = VisionNormalizer::default();
        let raw = detections(&[("fall", RawConfidence::Score(0.80))]);
        assert_eq!(normalizer.normalize(&subject(), &raw).len(), 1);
    }

    #[test]
    fn confidence_just_below_threshold_is_dropped() {
        let normalizer = VisionNormalizer::default();
        let raw = detections(&[("fall", RawConfidence::Score(0.79))]);
        assert!(normalizer.normalize(&subject(), &raw).is_empty());
    }

    #[test]
    fn floor_applies_even_when_type_threshold_is_lower() {
        let mut thresholds = ConfidenceThresholds::default();
        thresholds.set(AlertType::Fall, 0.30);
        let normalizer = VisionNormalizer::new(thresholds);
        let raw = detections(&[("fall", RawConfidence::Score(0.45))]);
        assert!(normalizer.normalize(&subject(), &raw).is_empty());
    }

    #[test]
    fn missing_or_unusable_confidence_is_dropped() {
        let normalizer = VisionNormalizer::default();
        let raw = detections(&[
            (
                "fall",
                RawConfidence::Detailed {
                    confidence: None,
                    explanation: Some("camera glare".to_string()),
                },
            ),
            (
                "bed_exit",
                RawConfidence::Other(serde_json::Value::String("high".to_string())),
            ),
        ]);
        assert!(normalizer.normalize(&subject(), &raw).is_empty());
    }

    #[test]
    fn unknown_labels_are_dropped() {
        let normalizer = VisionNormalizer::default();
        let raw = detections(&[("none", RawConfidence::Score(0.91))]);
        assert!(normalizer.normalize(&subject(), &raw).is_empty());
    }

    #[test]
    fn payload_order_is_preserved_in_events() {
        let normalizer = VisionNormalizer::default();
        let raw = detections(&[
            ("inactivity", RawConfidence::Score(0.90)),
            ("fall", RawConfidence::Score(0.95)),
        ]);
        let events = normalizer.normalize(&subject(), &raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].alert_type, AlertType::Inactivity);
        assert_eq!(events[1].alert_type, AlertType::Fall);
    }

    #[test]
    fn explanations_become_descriptions() {
        let normalizer = VisionNormalizer::default();
        let raw = detections(&[
            (
                "bed_exit",
                RawConfidence::Detailed {
                    confidence: Some(0.89),
                    explanation: Some("patient left bed area".to_string()),
                },
            ),
            ("fall", RawConfidence::Score(0.94)),
        ]);
        let events = normalizer.normalize(&subject(), &raw);
        assert_eq!(events[0].description, "patient left bed area");
        assert_eq!(
            events[1].description,
            AlertType::Fall.default_description()
        );
    }

    #[test]
    fn json_payloads_parse_with_order_and_mixed_shapes() {
        let raw: RawDetections = serde_json::from_str(
            r#"{
                "wandering": 0.87,
                "bed_exit": {"confidence": 0.91, "explanation": "left bed"},
                "fall": {"confidence": null},
                "inactivity": "unsure"
            }"#,
        )
        .unwrap();

        let labels: Vec<&str> = raw.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, vec!["wandering", "bed_exit", "fall", "inactivity"]);
        assert_eq!(raw.iter().next().unwrap().1.confidence(), Some(0.87));

        let entries: Vec<_> = raw.iter().collect();
        assert_eq!(entries[1].1.confidence(), Some(0.91));
        assert_eq!(entries[1].1.explanation(), Some("left bed"));
        assert_eq!(entries[2].1.confidence(), None);
        assert_eq!(entries[3].1.confidence(), None);
    }

    #[test]
    fn threshold_overrides_parse_and_validate() {
        let mut thresholds = ConfidenceThresholds::default();
        thresholds.apply_override("fall=0.65").unwrap();
        assert_eq!(thresholds.threshold(AlertType::Fall), 0.65);

        assert!(thresholds.apply_override("fall").is_err());
        assert!(thresholds.apply_override("smoke=0.5").is_err());
        assert!(thresholds.apply_override("fall=1.5").is_err());
        assert!(thresholds.apply_override("fall=abc").is_err());
    }
}

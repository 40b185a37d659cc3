use std::collections::VecDeque;

use nightingale_core::{RawConfidence, RawDetections};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Canned analyzer results used when no real camera or model is wired up.
/// Labels and confidences mirror what the remote analyzer typically reports,
/// including the `none` label for normal activity.
static CANNED_DETECTIONS: Lazy<Vec<(&'static str, f64, &'static str)>> = Lazy::new(|| {
    vec![
        (
            "fall",
            0.94,
            "sudden vertical drop followed by no movement on floor",
        ),
        (
            "bed_exit",
            0.89,
            "patient moved from lying to standing and left bed area",
        ),
        (
            "wandering",
            0.87,
            "patient moving aimlessly outside designated safe zone",
        ),
        (
            "inactivity",
            0.82,
            "no significant movement detected for more than 35 seconds",
        ),
        ("none", 0.91, "normal activity observed"),
    ]
});

/// Stand-in analyzer: replays a scripted sequence when given one (tests and
/// the simulator), otherwise picks a random canned detection per frame.
pub struct MockVision {
    scripted: Mutex<Option<VecDeque<RawDetections>>>,
}

impl MockVision {
    pub fn new() -> Self {
        MockVision {
            scripted: Mutex::new(None),
        }
    }

    /// Replays `sequence` one response per analyzed frame, then reports
    /// nothing once exhausted.
    pub fn with_sequence(sequence: Vec<RawDetections>) -> Self {
        MockVision {
            scripted: Mutex::new(Some(sequence.into_iter().collect())),
        }
    }

    pub fn analyze(&self, _frame: &[u8]) -> RawDetections {
        if let Some(queue) = self.scripted.lock().as_mut() {
            return queue.pop_front().unwrap_or_default();
        }
        let (label, confidence, explanation) =
            CANNED_DETECTIONS[fastrand::usize(..CANNED_DETECTIONS.len())];
        let mut detections = RawDetections::default();
        detections.push(
            label,
            RawConfidence::Detailed {
                confidence: Some(confidence),
                explanation: Some(explanation.to_string()),
            },
        );
        detections
    }
}

impl Default for MockVision {
    fn default() -> Self {
        MockVision::new()
    }
}

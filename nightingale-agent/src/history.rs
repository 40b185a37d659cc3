use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use nightingale_core::{AlertType, DetectionEvent, DetectionSource, Severity, Subject};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

/// How many emitted alerts are kept for operator review.
pub const MAX_ALERT_HISTORY: usize = 200;

/// One emitted alert as the operator sees it.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub id: String,
    pub subject: Subject,
    pub alert_type: AlertType,
    pub source: DetectionSource,
    pub severity: Severity,
    pub confidence: f64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// In-memory ring of emitted alerts. Oldest entries fall off past the
/// capacity; nothing survives a restart.
pub struct AlertHistory {
    capacity: usize,
    entries: Mutex<VecDeque<AlertRecord>>,
}

impl AlertHistory {
    pub fn new(capacity: usize) -> Self {
        AlertHistory {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Stores a record for an emitted event and returns its id. Recorded at
    /// emission time, before the delivery outcome is known.
    pub fn record(&self, event: &DetectionEvent) -> String {
        let record = AlertRecord {
            id: Uuid::new_v4().to_string(),
            subject: event.subject.clone(),
            alert_type: event.alert_type,
            source: event.source,
            severity: event.severity,
            confidence: event.confidence,
            description: event.description.clone(),
            transcript: event.transcript.clone(),
            timestamp: Utc::now(),
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
        };
        let id = record.id.clone();
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
        id
    }

    /// Newest-first slice of the ring.
    pub fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        let entries = self.entries.lock();
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Marks an alert acknowledged. Returns false for unknown ids.
    pub fn acknowledge(&self, id: &str, by: impl Into<String>) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.acknowledged = true;
                record.acknowledged_by = Some(by.into());
                record.acknowledged_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for AlertHistory {
    fn default() -> Self {
        AlertHistory::new(MAX_ALERT_HISTORY)
    }
}

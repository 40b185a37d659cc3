pub mod dedup;
pub mod keywords;
pub mod normalizer;
pub mod types;

pub use dedup::{AlertDeduplicator, DEFAULT_COOLDOWN_SECONDS};
pub use keywords::{KeywordMatch, KeywordMatcher, DISTRESS_PHRASES};
pub use normalizer::{
    ConfidenceThresholds, RawConfidence, RawDetections, VisionNormalizer, CONFIDENCE_FLOOR,
};
pub use types::{
    AlertType, DetectionEvent, DetectionSource, Severity, Subject, VOICE_CONFIDENCE,
};

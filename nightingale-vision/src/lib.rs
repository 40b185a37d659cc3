pub mod engine;
pub mod mock;

pub use engine::{HttpVision, VisionEngine, MONITOR_PROMPT, VISION_REQUEST_TIMEOUT};
pub use mock::MockVision;

pub mod cli;
pub mod dispatch;
pub mod history;
pub mod session;

pub use dispatch::{AlertDispatcher, AlertPayload, DispatchResult, MotionPayload, DISPATCH_TIMEOUT};
pub use history::{AlertHistory, AlertRecord, MAX_ALERT_HISTORY};
pub use session::{
    MonitorContext, MonitorManager, MonitorSession, SessionEvent, SessionState, SessionStats,
    DEFAULT_FRAME_SKIP,
};

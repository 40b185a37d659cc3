use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use nightingale_core::{
    AlertDeduplicator, ConfidenceThresholds, DetectionEvent, KeywordMatcher, Subject,
    VisionNormalizer,
};
use nightingale_vision::VisionEngine;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatch::AlertDispatcher;
use crate::history::AlertHistory;

/// Default frame sampling: analyze every Nth frame.
pub const DEFAULT_FRAME_SKIP: u64 = 3;

const SESSION_CHANNEL_CAPACITY: usize = 256;
const SESSION_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Inputs a transport feeds into a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// One transcribed utterance from the audio stream.
    Utterance { text: String },
    /// One encoded video frame.
    Frame(Vec<u8>),
}

/// Session lifecycle. Closing the input channel is the termination signal;
/// there is no pause state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Listening,
    Terminated,
}

/// Counters a session returns when it ends.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub utterances: u64,
    pub keyword_matches: u64,
    pub frames_seen: u64,
    pub frames_analyzed: u64,
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
}

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct MonitorContext {
    pub dedup: Arc<AlertDeduplicator>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub vision: Arc<VisionEngine>,
    pub history: Arc<AlertHistory>,
    pub thresholds: ConfidenceThresholds,
    pub frame_skip: u64,
}

impl MonitorContext {
    pub fn new(
        dedup: Arc<AlertDeduplicator>,
        dispatcher: Arc<AlertDispatcher>,
        vision: Arc<VisionEngine>,
        history: Arc<AlertHistory>,
        thresholds: ConfidenceThresholds,
        frame_skip: u64,
    ) -> Self {
        MonitorContext {
            dedup,
            dispatcher,
            vision,
            history,
            thresholds,
            // a skip of 0 would stall the modulo below, clamp to every frame
            frame_skip: frame_skip.max(1),
        }
    }
}

/// One monitored subject: consumes utterances and frames, emits alerts
/// through the deduplicator and dispatcher. Runs on a single task, so the
/// check-dispatch-record sequence is serialized per subject.
pub struct MonitorSession {
    subject: Subject,
    state: SessionState,
    matcher: KeywordMatcher,
    normalizer: VisionNormalizer,
    ctx: MonitorContext,
    stats: SessionStats,
}

impl MonitorSession {
    pub fn new(subject: Subject, ctx: MonitorContext) -> Self {
        MonitorSession {
            subject,
            state: SessionState::Listening,
            matcher: KeywordMatcher::default(),
            normalizer: VisionNormalizer::new(ctx.thresholds.clone()),
            ctx,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drains the event stream until every sender is dropped, then returns
    /// the session counters. Per-item failures are logged and never abort
    /// the loop.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> SessionStats {
        info!("monitoring session started for {}", self.subject);
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Utterance { text } => self.handle_utterance(&text).await,
                SessionEvent::Frame(frame) => self.handle_frame(&frame).await,
            }
        }
        self.state = SessionState::Terminated;
        info!(
            "monitoring session for {} terminated: {} utterances, {} frames, {} alerts emitted, {} suppressed",
            self.subject,
            self.stats.utterances,
            self.stats.frames_seen,
            self.stats.alerts_emitted,
            self.stats.alerts_suppressed
        );
        self.stats
    }

    async fn handle_utterance(&mut self, text: &str) {
        self.stats.utterances += 1;
        debug!("[{}] heard: {}", self.subject, text);
        let matched = match self.matcher.match_utterance(text) {
            Some(m) => m,
            None => return,
        };
        self.stats.keyword_matches += 1;
        info!(
            "[{}] distress keyword {:?} in utterance",
            self.subject, matched.phrase
        );
        let event = DetectionEvent::voice(
            self.subject.clone(),
            matched.alert_type,
            format!("distress keyword {:?} detected in speech", matched.phrase),
            text.to_string(),
        );
        self.route(event).await;
    }

    async fn handle_frame(&mut self, frame: &[u8]) {
        self.stats.frames_seen += 1;
        if self.stats.frames_seen % self.ctx.frame_skip != 0 {
            return;
        }
        self.stats.frames_analyzed += 1;
        let detections = match self.ctx.vision.analyze(frame).await {
            Ok(d) => d,
            Err(e) => {
                // analyzer trouble means no detections this cycle, nothing more
                warn!("[{}] vision analysis failed: {:#}", self.subject, e);
                return;
            }
        };
        for event in self.normalizer.normalize(&self.subject, &detections) {
            self.route(event).await;
        }
    }

    /// Deduplicate, dispatch, record. Recording happens once the dispatch
    /// attempt is spawned, so a failed delivery still starts the cooldown
    /// window.
    async fn route(&mut self, event: DetectionEvent) {
        let now = Utc::now();
        if !self
            .ctx
            .dedup
            .should_emit(&event.subject, event.alert_type, now)
        {
            debug!(
                "[{}] suppressing repeat {} alert inside cooldown window",
                event.subject, event.alert_type
            );
            self.stats.alerts_suppressed += 1;
            return;
        }
        info!(
            "[{}] emitting {} alert ({}, confidence {:.2})",
            event.subject, event.alert_type, event.severity, event.confidence
        );
        let subject = event.subject.clone();
        let alert_type = event.alert_type;
        self.ctx.history.record(&event);
        self.ctx.dispatcher.dispatch_detached(event);
        self.ctx.dedup.record_emission(&subject, alert_type, now);
        self.stats.alerts_emitted += 1;
    }
}

struct SessionHandle {
    sender: mpsc::Sender<SessionEvent>,
    task: JoinHandle<SessionStats>,
}

/// Starts and stops monitoring sessions, one spawned task per subject.
pub struct MonitorManager {
    ctx: MonitorContext,
    sessions: RwLock<HashMap<Subject, SessionHandle>>,
}

impl MonitorManager {
    pub fn new(ctx: MonitorContext) -> Self {
        MonitorManager {
            ctx,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    /// Spawns a session for the subject and returns the sender the
    /// transport feeds. Fails when the subject is already monitored.
    pub async fn start_session(
        &self,
        subject: Subject,
    ) -> anyhow::Result<mpsc::Sender<SessionEvent>> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&subject) {
            anyhow::bail!("session already active for {}", subject);
        }
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let session = MonitorSession::new(subject.clone(), self.ctx.clone());
        let task = tokio::spawn(session.run(receiver));
        sessions.insert(
            subject,
            SessionHandle {
                sender: sender.clone(),
                task,
            },
        );
        Ok(sender)
    }

    /// Ends the subject's session and returns its counters once the loop
    /// drains. The loop only drains after the transport has dropped its
    /// sender too; stragglers are aborted after a grace period.
    pub async fn end_session(&self, subject: &Subject) -> Option<SessionStats> {
        let handle = self.sessions.write().await.remove(subject)?;
        Self::join_session(subject, handle).await
    }

    pub async fn active_subjects(&self) -> Vec<Subject> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn is_active(&self, subject: &Subject) -> bool {
        self.sessions.read().await.contains_key(subject)
    }

    /// Ends every session and waits for the loops to drain.
    pub async fn shutdown(&self) {
        let handles: Vec<(Subject, SessionHandle)> =
            self.sessions.write().await.drain().collect();
        join_all(
            handles
                .into_iter()
                .map(|(subject, handle)| async move {
                    Self::join_session(&subject, handle).await;
                }),
        )
        .await;
    }

    async fn join_session(subject: &Subject, handle: SessionHandle) -> Option<SessionStats> {
        drop(handle.sender);
        let mut task = handle.task;
        match tokio::time::timeout(SESSION_SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                error!("session task for {} failed: {}", subject, e);
                None
            }
            Err(_) => {
                warn!(
                    "session for {} did not drain within {:?}, aborting",
                    subject, SESSION_SHUTDOWN_GRACE
                );
                task.abort();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_frame_skip(frame_skip: u64) -> MonitorContext {
        MonitorContext::new(
            Arc::new(AlertDeduplicator::default()),
            Arc::new(AlertDispatcher::new("http://127.0.0.1:1")),
            Arc::new(VisionEngine::Disabled),
            Arc::new(AlertHistory::default()),
            ConfidenceThresholds::default(),
            frame_skip,
        )
    }

    #[test]
    fn frame_skip_zero_is_clamped_to_every_frame() {
        assert_eq!(context_with_frame_skip(0).frame_skip, 1);
        assert_eq!(context_with_frame_skip(4).frame_skip, 4);
    }

    #[tokio::test]
    async fn session_terminates_when_all_senders_drop() {
        let ctx = context_with_frame_skip(1);
        let (sender, receiver) = mpsc::channel(8);
        let session = MonitorSession::new(Subject::new("room-1"), ctx);
        assert_eq!(session.state(), SessionState::Listening);

        let task = tokio::spawn(session.run(receiver));
        sender
            .send(SessionEvent::Utterance {
                text: "all quiet".to_string(),
            })
            .await
            .unwrap();
        drop(sender);

        let stats = task.await.unwrap();
        assert_eq!(stats.utterances, 1);
        assert_eq!(stats.keyword_matches, 0);
        assert_eq!(stats.alerts_emitted, 0);
    }

    #[tokio::test]
    async fn disabled_vision_still_counts_sampled_frames() {
        let ctx = context_with_frame_skip(3);
        let (sender, receiver) = mpsc::channel(8);
        let task = tokio::spawn(MonitorSession::new(Subject::new("room-1"), ctx).run(receiver));

        for _ in 0..6 {
            sender.send(SessionEvent::Frame(vec![0u8; 4])).await.unwrap();
        }
        drop(sender);

        let stats = task.await.unwrap();
        assert_eq!(stats.frames_seen, 6);
        assert_eq!(stats.frames_analyzed, 2);
        assert_eq!(stats.alerts_emitted, 0);
    }
}

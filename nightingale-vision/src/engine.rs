use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use nightingale_core::RawDetections;
use tracing::{debug, warn};

use crate::mock::MockVision;

/// Hard cap on one analyzer round trip. No retries behind it.
pub const VISION_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Instruction sent with every frame to the remote analyzer.
pub const MONITOR_PROMPT: &str = "You are monitoring an elderly care facility camera. \
Detect and classify in real-time: fall, bed exit without assistance, wandering outside \
safe area, prolonged inactivity (>30s no movement). Be very concise.";

/// The vision capability behind the monitoring loop. `Disabled` stands in
/// when no api key is configured and always reports nothing.
pub enum VisionEngine {
    Http(HttpVision),
    Mock(MockVision),
    Disabled,
}

impl VisionEngine {
    /// Picks an engine from configuration: mock when asked for, HTTP when a
    /// key is present, disabled otherwise.
    pub fn from_config(api_url: &str, api_key: Option<&str>, use_mock: bool) -> Self {
        if use_mock {
            return VisionEngine::Mock(MockVision::new());
        }
        match api_key {
            Some(key) if !key.trim().is_empty() => {
                VisionEngine::Http(HttpVision::new(api_url, key))
            }
            _ => {
                warn!("no vision api key configured, vision analysis disabled");
                VisionEngine::Disabled
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VisionEngine::Http(_) => "http",
            VisionEngine::Mock(_) => "mock",
            VisionEngine::Disabled => "disabled",
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, VisionEngine::Disabled)
    }

    /// Analyzes one encoded frame. `Disabled` reports an empty mapping;
    /// HTTP engine errors bubble up for the caller to log.
    pub async fn analyze(&self, frame: &[u8]) -> Result<RawDetections> {
        match self {
            VisionEngine::Http(client) => client.analyze(frame).await,
            VisionEngine::Mock(mock) => Ok(mock.analyze(frame)),
            VisionEngine::Disabled => Ok(RawDetections::default()),
        }
    }
}

/// Client for the remote frame analyzer.
pub struct HttpVision {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpVision {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpVision {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub async fn analyze(&self, frame: &[u8]) -> Result<RawDetections> {
        let body = serde_json::json!({
            "image": general_purpose::STANDARD.encode(frame),
            "prompt": MONITOR_PROMPT,
        });
        let response = self
            .client
            .post(format!("{}/analyze", self.api_url))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .timeout(VISION_REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "vision api returned status {}",
                response.status()
            ));
        }
        let detections = response.json::<RawDetections>().await?;
        debug!("vision api returned {} detection entries", detections.len());
        Ok(detections)
    }
}

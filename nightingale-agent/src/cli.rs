use clap::{Parser, Subcommand};
use nightingale_core::DEFAULT_COOLDOWN_SECONDS;

use crate::session::DEFAULT_FRAME_SKIP;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "nightingale: bedside monitoring assistant",
    long_about = "Watches a patient session for verbal distress cues and visual anomalies, \
deduplicates repeated detections, and forwards alerts to the care backend."
)]
pub struct Cli {
    /// Subject identifier for this monitoring session (room or patient id)
    #[arg(short, long, default_value = "room-1", env = "NIGHTINGALE_SUBJECT")]
    pub subject: String,

    /// Base URL of the alert backend
    #[arg(
        long,
        default_value = "http://127.0.0.1:8000",
        env = "NIGHTINGALE_BACKEND_URL"
    )]
    pub backend_url: String,

    /// Vision analyzer endpoint
    #[arg(
        long,
        default_value = "https://cluster1.overshoot.ai/api/v0.2",
        env = "NIGHTINGALE_VISION_URL"
    )]
    pub vision_url: String,

    /// Vision analyzer api key; vision analysis is disabled when unset
    #[arg(long, env = "NIGHTINGALE_VISION_API_KEY")]
    pub vision_api_key: Option<String>,

    /// Use the built-in mock analyzer instead of the remote vision api
    #[arg(long)]
    pub mock_vision: bool,

    /// Seconds to suppress repeats of the same alert for the same subject
    #[arg(
        long,
        default_value_t = DEFAULT_COOLDOWN_SECONDS,
        env = "NIGHTINGALE_COOLDOWN_SECONDS"
    )]
    pub cooldown_seconds: u64,

    /// Analyze every nth video frame
    #[arg(
        long,
        default_value_t = DEFAULT_FRAME_SKIP,
        env = "NIGHTINGALE_FRAME_SKIP"
    )]
    pub frame_skip: u64,

    /// Per-type confidence threshold override, repeatable, e.g. fall=0.8
    #[arg(long = "vision-threshold", value_name = "TYPE=THRESHOLD")]
    pub vision_thresholds: Vec<String>,

    /// Directory for logs and runtime data, defaults to ~/.nightingale
    #[arg(long, env = "NIGHTINGALE_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a scripted bedside scenario through the mock analyzer
    Simulate {
        /// Subject used for the scripted scenario
        #[arg(long, default_value = "room-7")]
        subject: String,
    },
}

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use clap::Parser;
use colored::Colorize;
use dirs::home_dir;
use nightingale_agent::cli::{Cli, Command};
use nightingale_agent::{
    AlertDispatcher, AlertHistory, MonitorContext, MonitorManager, SessionEvent, SessionStats,
};
use nightingale_core::{
    AlertDeduplicator, ConfidenceThresholds, RawConfidence, RawDetections, Severity, Subject,
};
use nightingale_vision::{MockVision, VisionEngine};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn get_base_dir(custom_path: &Option<String>) -> Result<PathBuf> {
    let default_path = home_dir()
        .ok_or_else(|| anyhow::anyhow!("failed to get home directory"))?
        .join(".nightingale");

    let base_dir = custom_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or(default_path);

    fs::create_dir_all(&base_dir)?;
    Ok(base_dir)
}

fn setup_logging(base_dir: &PathBuf, cli: &Cli) -> Result<WorkerGuard> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("nightingale")
        .filename_suffix("log")
        .max_log_files(5)
        .build(base_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("info".parse().unwrap())
        .add_directive("hyper=error".parse().unwrap())
        .add_directive("reqwest=error".parse().unwrap());

    let env_filter = env::var("NIGHTINGALE_LOG")
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .fold(
            env_filter,
            |filter, module_directive| match module_directive.parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(e) => {
                    eprintln!(
                        "warning: invalid log directive '{}': {}",
                        module_directive, e
                    );
                    filter
                }
            },
        );

    let env_filter = if cli.debug {
        env_filter
            .add_directive("nightingale=debug".parse().unwrap())
            .add_directive("nightingale_core=debug".parse().unwrap())
            .add_directive("nightingale_vision=debug".parse().unwrap())
            .add_directive("nightingale_agent=debug".parse().unwrap())
    } else {
        env_filter
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_dir = get_base_dir(&cli.data_dir)?;
    let _log_guard = setup_logging(&base_dir, &cli)?;

    let mut thresholds = ConfidenceThresholds::default();
    for spec in &cli.vision_thresholds {
        thresholds.apply_override(spec)?;
    }

    match cli.command {
        Some(Command::Simulate { ref subject }) => {
            let subject = subject.clone();
            run_simulation(&cli, subject, thresholds).await
        }
        None => run_agent(&cli, thresholds).await,
    }
}

async fn run_agent(cli: &Cli, thresholds: ConfidenceThresholds) -> Result<()> {
    let vision = VisionEngine::from_config(
        &cli.vision_url,
        cli.vision_api_key.as_deref(),
        cli.mock_vision,
    );
    print_banner(cli, &vision);

    let ctx = MonitorContext::new(
        Arc::new(AlertDeduplicator::with_window_seconds(cli.cooldown_seconds)),
        Arc::new(AlertDispatcher::new(cli.backend_url.as_str())),
        Arc::new(vision),
        Arc::new(AlertHistory::default()),
        thresholds,
        cli.frame_skip,
    );
    let manager = MonitorManager::new(ctx);

    let subject = Subject::new(cli.subject.clone());
    let sender = manager.start_session(subject.clone()).await?;

    info!("reading session events from stdin, ndjson or plain text");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_transport_line(&line) {
                            if sender.send(event).await.is_err() {
                                warn!("session channel closed, stopping input");
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        info!("input stream ended");
                        break;
                    }
                    Err(e) => {
                        error!("failed to read input: {}", e);
                        break;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("received interrupt, shutting down");
                break;
            }
        }
    }
    drop(sender);

    if let Some(stats) = manager.end_session(&subject).await {
        print_session_summary(&subject, &stats, &manager);
    }
    manager.shutdown().await;
    Ok(())
}

/// One stdin line from the transport. Frames arrive base64-encoded.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TransportLine {
    Utterance { text: String },
    Frame { image: String },
}

/// Parses one stdin line: NDJSON when it looks like JSON, otherwise the
/// whole line is treated as an utterance so the agent can be driven by hand.
fn parse_transport_line(line: &str) -> Option<SessionEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        match serde_json::from_str::<TransportLine>(trimmed) {
            Ok(TransportLine::Utterance { text }) => {
                return Some(SessionEvent::Utterance { text })
            }
            Ok(TransportLine::Frame { image }) => {
                return match general_purpose::STANDARD.decode(image.as_bytes()) {
                    Ok(bytes) => Some(SessionEvent::Frame(bytes)),
                    Err(e) => {
                        warn!("discarding frame with invalid base64: {}", e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("unparseable input line, treating it as an utterance: {}", e);
            }
        }
    }
    Some(SessionEvent::Utterance {
        text: trimmed.to_string(),
    })
}

fn print_banner(cli: &Cli, vision: &VisionEngine) {
    println!(
        "\n{}\n",
        "nightingale | bedside monitoring assistant"
            .bright_green()
            .bold()
    );
    println!("subject:     {}", cli.subject.bright_yellow());
    println!("alert sink:  {}", cli.backend_url.bright_yellow());
    println!("vision:      {}", vision.name().bright_yellow());
    println!(
        "cooldown:    {}",
        format!("{}s", cli.cooldown_seconds).bright_yellow()
    );
    println!(
        "sampling:    {}",
        format!("every {} frames", cli.frame_skip.max(1)).bright_yellow()
    );
    println!();
}

fn print_session_summary(subject: &Subject, stats: &SessionStats, manager: &MonitorManager) {
    println!(
        "\n{}",
        format!("session summary for {}", subject)
            .bright_green()
            .bold()
    );
    println!("  utterances:        {}", stats.utterances);
    println!("  keyword matches:   {}", stats.keyword_matches);
    println!("  frames seen:       {}", stats.frames_seen);
    println!("  frames analyzed:   {}", stats.frames_analyzed);
    println!("  alerts emitted:    {}", stats.alerts_emitted);
    println!("  alerts suppressed: {}", stats.alerts_suppressed);

    let recent = manager.context().history.recent(10);
    if recent.is_empty() {
        return;
    }
    println!("\n{}", "recent alerts".bright_green().bold());
    for record in recent {
        let severity = match record.severity {
            Severity::Critical => record.severity.to_string().bright_red().bold(),
            Severity::High => record.severity.to_string().bright_yellow(),
        };
        println!(
            "  {} [{}] {} {} ({:.2}) {}",
            record.timestamp.format("%H:%M:%S"),
            severity,
            record.subject,
            record.alert_type,
            record.confidence,
            record.description
        );
    }
}

fn scripted_frames() -> Vec<RawDetections> {
    let mut quiet = RawDetections::default();
    quiet.push(
        "none",
        RawConfidence::Detailed {
            confidence: Some(0.91),
            explanation: Some("normal activity observed".to_string()),
        },
    );

    let mut fall = RawDetections::default();
    fall.push(
        "fall",
        RawConfidence::Detailed {
            confidence: Some(0.94),
            explanation: Some("sudden vertical drop followed by no movement on floor".to_string()),
        },
    );

    let mut faint_inactivity = RawDetections::default();
    faint_inactivity.push("inactivity", RawConfidence::Score(0.40));

    vec![quiet, fall, faint_inactivity]
}

async fn run_simulation(
    cli: &Cli,
    subject: String,
    thresholds: ConfidenceThresholds,
) -> Result<()> {
    println!(
        "\n{}",
        "running scripted bedside scenario".bright_green().bold()
    );
    println!(
        "{}\n",
        format!(
            "alerts POST to {}, failures are logged and dropped",
            cli.backend_url
        )
        .dimmed()
    );

    let ctx = MonitorContext::new(
        Arc::new(AlertDeduplicator::with_window_seconds(cli.cooldown_seconds)),
        Arc::new(AlertDispatcher::new(cli.backend_url.as_str())),
        Arc::new(VisionEngine::Mock(MockVision::with_sequence(
            scripted_frames(),
        ))),
        Arc::new(AlertHistory::default()),
        thresholds,
        // analyze every frame so the script stays deterministic
        1,
    );
    let manager = MonitorManager::new(ctx);
    let subject = Subject::new(subject);
    let sender = manager.start_session(subject.clone()).await?;

    let utterances: &[&str] = &[
        "good evening, just checking in",
        "I can't breathe",
        // inside the cooldown window, gets suppressed
        "help, I can't breathe",
        "feeling a little better now",
    ];
    for text in utterances {
        sender
            .send(SessionEvent::Utterance {
                text: text.to_string(),
            })
            .await?;
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    // one quiet frame, one fall, one inactivity below the floor
    for _ in 0..3 {
        sender.send(SessionEvent::Frame(Vec::new())).await?;
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    drop(sender);

    if let Some(stats) = manager.end_session(&subject).await {
        print_session_summary(&subject, &stats, &manager);
    }
    Ok(())
}

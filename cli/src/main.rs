//! MonoChat CLI: listen to a chat stream from the terminal.
//!
//! # Commands
//! ```text
//! monochat listen    --platform chzzk --url <URL> --replay <transcript.jsonl>
//! monochat platforms
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use monochat_core::{MonoChat, MonoChatError, Platform, SessionConfig, StreamSession};
use monochat_engine::{LocalEngine, ReplaySource};
use monochat_observability::{init_tracing, LogConfig};
use serde::Deserialize;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "monochat",
    about = "MonoChat CLI: listen to Chzzk / Soop chat streams",
    long_about = "
MonoChat CLI: connect to a chat stream and print every chat and donation
event as it arrives. Press Ctrl+C to stop.

This build ships no platform protocol sources; use --replay to play back
a recorded JSON-lines transcript through the full session pipeline. The
session stays open after the transcript ends, like a live stream with no
new chat; use --max to stop after a fixed number of messages.
",
    version
)]
struct Cli {
    /// JSON config file: { \"session\": {...}, \"log\": {...} }
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print messages until the stream closes
    Listen {
        /// Platform: chzzk or soop
        #[arg(short, long, value_parser = parse_platform)]
        platform: Platform,
        /// Platform-specific chat URL
        #[arg(short, long)]
        url: String,
        /// JSON-lines transcript to replay as the platform feed
        #[arg(long)]
        replay: PathBuf,
        /// Delay between replayed messages, in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
        /// Stop after this many messages
        #[arg(long)]
        max: Option<usize>,
        /// Pump backoff when the engine has nothing ready, in milliseconds
        #[arg(long)]
        poll_backoff_ms: Option<u64>,
        /// Print messages as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List supported platforms
    Platforms,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    log: LogConfig,
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse::<Platform>().map_err(|e| e.to_string())
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if cli.json_logs {
        config.log.json = true;
    }
    init_tracing(&config.log);

    match cli.command {
        Commands::Listen {
            platform,
            url,
            replay,
            interval_ms,
            max,
            poll_backoff_ms,
            json,
        } => {
            if let Some(ms) = poll_backoff_ms {
                config.session.poll_backoff_ms = ms;
            }
            let source = ReplaySource::new(replay).with_interval(Duration::from_millis(interval_ms));
            let engine = Arc::new(LocalEngine::new().with_source(platform, Arc::new(source)));
            cmd_listen(engine, config.session, platform, &url, max, json).await
        }
        Commands::Platforms => {
            cmd_platforms();
            Ok(())
        }
    }
}

async fn cmd_listen(
    engine: Arc<LocalEngine>,
    session_config: SessionConfig,
    platform: Platform,
    url: &str,
    max: Option<usize>,
    json: bool,
) -> Result<()> {
    let client = MonoChat::with_config(engine, session_config)?;

    info!(platform = %platform, url, "connecting");
    let Some(session) = client.connect(platform, url)? else {
        anyhow::bail!("failed to connect to {platform} stream");
    };
    info!(session = %session.handle(), "connected, listening for messages");
    eprintln!("Press Ctrl+C to stop");

    let result = print_messages(&session, max, json).await;

    session.close().await;
    let stats = session.stats();
    info!(
        received = stats.received,
        printed = stats.delivered,
        dropped = stats.dropped_on_close,
        "stream closed"
    );
    result
}

async fn print_messages(session: &StreamSession, max: Option<usize>, json: bool) -> Result<()> {
    let interrupted = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    tokio::pin!(interrupted);

    let mut printed = 0usize;
    while max.map_or(true, |m| printed < m) {
        let message = match session.take_until(&mut interrupted).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(MonoChatError::Cancelled) => {
                info!("interrupted, stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot = message.to_message()?;
        message.free();
        if json {
            println!("{}", serde_json::to_string(&snapshot)?);
        } else {
            println!(
                "{} : {} ({})",
                snapshot.sender,
                snapshot.content.as_deref().unwrap_or(""),
                snapshot.donated.unwrap_or(0)
            );
        }
        printed += 1;
    }
    Ok(())
}

fn cmd_platforms() {
    println!("Supported platforms:\n");
    println!("  chzzk   Naver Chzzk");
    println!("          URL: https://api.chzzk.naver.com/manage/v1/chats/sources/<uuid>");
    println!("          or   https://api.chzzk.naver.com/polling/v3.1/channels/<uuid>/live-status");
    println!();
    println!("  soop    SOOP (AfreecaTV)");
    println!("          URL: https://aqua.sooplive.co.kr/component.php?szKey=<key>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_listen_arguments() {
        let cli = Cli::try_parse_from([
            "monochat", "listen", "--platform", "SOOP", "--url", "https://x", "--replay", "t.jsonl",
            "--max", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Listen { platform, max, json, .. } => {
                assert_eq!(platform, Platform::Soop);
                assert_eq!(max, Some(3));
                assert!(!json);
            }
            Commands::Platforms => panic!("expected listen"),
        }
    }

    #[test]
    fn rejects_unknown_platform() {
        let err = Cli::try_parse_from([
            "monochat", "listen", "--platform", "twitch", "--url", "https://x", "--replay", "t.jsonl",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn config_file_sections_are_optional() {
        let config: FileConfig = serde_json::from_str(r#"{"session":{"poll_backoff_ms":3}}"#).unwrap();
        assert_eq!(config.session.poll_backoff_ms, 3);
        assert_eq!(config.log, LogConfig::default());
    }
}

//! Replay of recorded chat transcripts.
//!
//! A transcript is a JSON-lines file with one [`Message`] per line:
//!
//! ```text
//! {"sender":"alice","content":"hello"}
//! {"sender":"bob","donated":5000}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use monochat_core::Message;

use crate::source::{ChatSource, MessageFeed, SourceError};

/// Plays back a transcript file on every `open`, ignoring the URL.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
    interval: Duration,
    hold_open: bool,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: Duration::ZERO,
            hold_open: false,
        }
    }

    /// Delay between consecutive messages.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Keep the feed open after the transcript ends.
    pub fn hold_open(mut self, hold: bool) -> Self {
        self.hold_open = hold;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse a JSON-lines transcript.
pub fn parse_transcript(text: &str) -> Result<Vec<Message>, SourceError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| SourceError::Parse { line: i + 1, source })
        })
        .collect()
}

#[async_trait]
impl ChatSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    async fn open(&self, _url: &str) -> Result<MessageFeed, SourceError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let messages = parse_transcript(&text)?;
        tracing::debug!(path = %self.path.display(), count = messages.len(), "transcript loaded");

        let interval = self.interval;
        let paced = stream::iter(messages).then(move |message| async move {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            message
        });

        if self.hold_open {
            Ok(paced.chain(stream::pending()).boxed())
        } else {
            Ok(paced.boxed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_blank_and_comment_lines() {
        let text = "# recorded\n{\"sender\":\"alice\",\"content\":\"hello\"}\n\n{\"sender\":\"bob\",\"donated\":5000}\n";
        let messages = parse_transcript(text).unwrap();
        assert_eq!(
            messages,
            vec![
                Message::chat("alice", "hello"),
                Message::donation("bob", 5000, None),
            ]
        );
    }

    #[test]
    fn parse_reports_line_number() {
        let text = "{\"sender\":\"alice\"}\nnot json\n";
        match parse_transcript(text) {
            Err(SourceError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let source = ReplaySource::new("/definitely/not/here.jsonl");
        assert!(matches!(source.open("x").await, Err(SourceError::Io(_))));
    }
}

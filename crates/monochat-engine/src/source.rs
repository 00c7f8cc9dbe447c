//! `ChatSource` trait: abstraction over per-platform message feeds.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use monochat_core::Message;
use thiserror::Error;

/// A live feed of decoded messages. The feed ending means the stream ended.
pub type MessageFeed = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Errors raised while opening a feed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Other(String),
}

/// Opens message feeds for one platform.
#[async_trait]
pub trait ChatSource: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Connect to `url` and start streaming messages.
    async fn open(&self, url: &str) -> Result<MessageFeed, SourceError>;
}

/// Serves a fixed list of messages on every `open`.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    messages: Vec<Message>,
    hold_open: bool,
}

impl StaticSource {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, hold_open: false }
    }

    /// Keep the feed open after the last message instead of ending it.
    pub fn hold_open(mut self, hold: bool) -> Self {
        self.hold_open = hold;
        self
    }
}

#[async_trait]
impl ChatSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn open(&self, _url: &str) -> Result<MessageFeed, SourceError> {
        let items = stream::iter(self.messages.clone());
        if self.hold_open {
            Ok(items.chain(stream::pending()).boxed())
        } else {
            Ok(items.boxed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_replays_in_order() {
        let source = StaticSource::new(vec![Message::chat("a", "1"), Message::chat("b", "2")]);
        let feed = source.open("ignored").await.unwrap();
        let senders: Vec<_> = feed.map(|m| m.sender).collect().await;
        assert_eq!(senders, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn held_open_feed_does_not_end() {
        let source = StaticSource::new(vec![Message::chat("a", "1")]).hold_open(true);
        let mut feed = source.open("ignored").await.unwrap();
        assert!(feed.next().await.is_some());
        let next = tokio::time::timeout(std::time::Duration::from_millis(20), feed.next()).await;
        assert!(next.is_err());
    }
}
